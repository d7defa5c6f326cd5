use crate::id::Address;
use crate::task::TaskType;
use crate::Wei;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A worker's advertised ability to perform services at given prices.
/// Offers are pure snapshots refreshed by the capability index; nothing
/// holds one across an await expecting it to stay current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOffer {
    pub address: Address,
    pub endpoint: String,
    /// Registry reputation score, 0..=100.
    pub reputation: u8,
    pub capabilities: BTreeSet<String>,
    pub pricing: HashMap<TaskType, Wei>,
    pub is_active: bool,
}

impl WorkerOffer {
    pub fn price_for(&self, task_type: TaskType) -> Option<Wei> {
        self.pricing.get(&task_type).copied()
    }

    pub fn offers_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// True when the offer covers every label in `required`.
    pub fn covers(&self, required: &BTreeSet<String>) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer_with(capabilities: &[&str]) -> WorkerOffer {
        WorkerOffer {
            address: Address::from_bytes([1u8; 20]),
            endpoint: "http://worker.test:4021".to_string(),
            reputation: 80,
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
            pricing: HashMap::from([(TaskType::Writer, Wei::from_wei(1_000))]),
            is_active: true,
        }
    }

    #[test]
    fn test_covers_requires_superset() {
        let offer = offer_with(&["writer", "researcher"]);
        let mut required = BTreeSet::new();
        required.insert("writer".to_string());
        assert!(offer.covers(&required));

        required.insert("image-generation".to_string());
        assert!(!offer.covers(&required));
    }

    #[test]
    fn test_price_lookup() {
        let offer = offer_with(&["writer"]);
        assert_eq!(offer.price_for(TaskType::Writer), Some(Wei::from_wei(1_000)));
        assert_eq!(offer.price_for(TaskType::Researcher), None);
    }
}

//! Worker sidecar manifest wire types (`GET /manifest`).

use econos_types::{Address, TaskType, Wei, WorkerOffer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A worker the master knows about: registry address plus sidecar base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownWorker {
    pub address: Address,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerManifest {
    pub worker: ManifestIdentity,
    pub services: Vec<ManifestService>,
    pub protocol: ManifestProtocol,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestIdentity {
    pub address: Address,
    pub chain_id: u64,
    pub rpc_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestService {
    /// Service id doubles as the capability label (`summary-generation`, ...).
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_wei: Wei,
    pub endpoint: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestProtocol {
    pub payment_header: String,
}

impl WorkerManifest {
    /// Collapse a manifest into an offer snapshot. Service ids outside the
    /// closed task-type set still count as capabilities but carry no price.
    pub fn to_offer(&self, endpoint: &str, reputation: u8, is_active: bool) -> WorkerOffer {
        let mut capabilities = BTreeSet::new();
        let mut pricing = HashMap::new();

        for service in &self.services {
            capabilities.insert(service.id.clone());
            if let Ok(task_type) = TaskType::from_label(&service.id) {
                pricing.insert(task_type, service.price_wei);
            }
        }

        WorkerOffer {
            address: self.worker.address,
            endpoint: endpoint.to_string(),
            reputation,
            capabilities,
            pricing,
            is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_json_shape() {
        let json = r#"{
            "worker": {"address": "0x00112233445566778899aabbccddeeff00112233", "chainId": 240, "rpcUrl": "http://rpc.test"},
            "services": [{
                "id": "summary-generation",
                "name": "Summaries",
                "description": "Text summarization",
                "priceWei": "2000000000000000",
                "endpoint": "http://worker.test:4021",
                "version": "1.2.0"
            }],
            "protocol": {"paymentHeader": "X-Payment"},
            "timestamp": 1753980000
        }"#;

        let manifest: WorkerManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.worker.chain_id, 240);
        assert_eq!(manifest.services[0].price_wei, Wei::from_wei(2_000_000_000_000_000));
        assert_eq!(manifest.protocol.payment_header, "X-Payment");
    }

    #[test]
    fn test_to_offer_maps_known_services() {
        let manifest = WorkerManifest {
            worker: ManifestIdentity {
                address: Address::from_bytes([1u8; 20]),
                chain_id: 240,
                rpc_url: "http://rpc.test".to_string(),
            },
            services: vec![
                ManifestService {
                    id: "writer".to_string(),
                    name: "Writer".to_string(),
                    description: "Long-form writing".to_string(),
                    price_wei: Wei::from_wei(1_000),
                    endpoint: "http://worker.test".to_string(),
                    version: "1.0.0".to_string(),
                },
                ManifestService {
                    id: "haiku-carving".to_string(),
                    name: "Haiku".to_string(),
                    description: "Not in the closed set".to_string(),
                    price_wei: Wei::from_wei(5),
                    endpoint: "http://worker.test".to_string(),
                    version: "1.0.0".to_string(),
                },
            ],
            protocol: ManifestProtocol {
                payment_header: "X-Payment".to_string(),
            },
            timestamp: 0,
        };

        let offer = manifest.to_offer("http://worker.test", 70, true);
        assert!(offer.offers_capability("writer"));
        assert!(offer.offers_capability("haiku-carving"));
        assert_eq!(offer.price_for(TaskType::Writer), Some(Wei::from_wei(1_000)));
        assert_eq!(offer.pricing.len(), 1);
    }
}

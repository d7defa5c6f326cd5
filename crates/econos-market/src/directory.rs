//! Worker directory: filter + rank offers for a concrete task.

use crate::capability_index::CapabilityIndex;
use crate::error::Result;
use econos_chain::ChainGateway;
use econos_types::{Address, Task, Wei, WorkerOffer};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// Highest reputation; ties broken by lower price, then address.
    Reputation,
    /// Lowest price; ties broken by higher reputation, then address.
    Cheapest,
    /// Rotate through eligible workers per group key (task type when
    /// unset). Counters are process-local.
    RoundRobin { group_key: Option<String> },
    /// Exact address match only.
    Direct,
    /// Blend of normalized reputation and price attractiveness.
    Weighted {
        reputation_weight: f64,
        price_weight: f64,
    },
}

impl SelectionStrategy {
    pub fn weighted_default() -> Self {
        SelectionStrategy::Weighted {
            reputation_weight: 0.7,
            price_weight: 0.3,
        }
    }
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        SelectionStrategy::Reputation
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Offers below this registry reputation never qualify.
    pub min_reputation: u8,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { min_reputation: 50 }
    }
}

/// Resolves the concrete worker for a task: filter the current offer
/// snapshots, then apply the requested strategy to the survivors.
pub struct WorkerDirectory {
    index: Arc<CapabilityIndex>,
    chain: Arc<dyn ChainGateway>,
    config: DirectoryConfig,
    round_robin: Mutex<HashMap<String, usize>>,
}

impl WorkerDirectory {
    pub fn new(
        index: Arc<CapabilityIndex>,
        chain: Arc<dyn ChainGateway>,
        config: DirectoryConfig,
    ) -> Self {
        Self {
            index,
            chain,
            config,
            round_robin: Mutex::new(HashMap::new()),
        }
    }

    /// `Ok(None)` means no eligible worker survived the filters; callers
    /// surface that as `NoEligibleWorker`.
    pub async fn select_worker(
        &self,
        task: &Task,
        strategy: &SelectionStrategy,
        direct_address: Option<Address>,
    ) -> Result<Option<WorkerOffer>> {
        let survivors = self.eligible_offers(task).await?;
        if survivors.is_empty() {
            debug!(
                task_id = task.task_id.short(),
                task_type = %task.task_type,
                "No offers survived the eligibility filters"
            );
            return Ok(None);
        }

        let selected = match strategy {
            SelectionStrategy::Reputation => pick_by_reputation(task, survivors),
            SelectionStrategy::Cheapest => pick_cheapest(task, survivors),
            SelectionStrategy::RoundRobin { group_key } => {
                let key = group_key
                    .clone()
                    .unwrap_or_else(|| task.task_type.label().to_string());
                self.pick_round_robin(&key, survivors).await
            }
            SelectionStrategy::Direct => {
                direct_address.and_then(|addr| survivors.into_iter().find(|o| o.address == addr))
            }
            SelectionStrategy::Weighted {
                reputation_weight,
                price_weight,
            } => pick_weighted(task, survivors, *reputation_weight, *price_weight),
        };

        Ok(selected)
    }

    /// The filter chain: active on chain, reputation at or above the
    /// floor, capabilities covering the task's requirements, priced within
    /// budget.
    async fn eligible_offers(&self, task: &Task) -> Result<Vec<WorkerOffer>> {
        let mut required = task.required_capabilities.clone();
        required.insert(task.task_type.label().to_string());

        let mut survivors = Vec::new();
        for offer in self.index.offers().await {
            if !offer.is_active || !self.chain.is_worker_active(offer.address).await? {
                continue;
            }
            if offer.reputation < self.config.min_reputation {
                continue;
            }
            if !offer.covers(&required) {
                continue;
            }
            match offer.price_for(task.task_type) {
                Some(price) if price <= task.budget => survivors.push(offer),
                _ => {}
            }
        }
        Ok(survivors)
    }

    async fn pick_round_robin(&self, key: &str, mut survivors: Vec<WorkerOffer>) -> Option<WorkerOffer> {
        // Stable rotation order regardless of cache iteration order.
        survivors.sort_by_key(|o| o.address);

        let mut counters = self.round_robin.lock().await;
        let counter = counters.entry(key.to_string()).or_insert(0);
        let picked = survivors.get(*counter % survivors.len()).cloned();
        *counter = counter.wrapping_add(1);
        picked
    }
}

fn pick_by_reputation(task: &Task, mut survivors: Vec<WorkerOffer>) -> Option<WorkerOffer> {
    survivors.sort_by_key(|o| {
        (
            Reverse(o.reputation),
            o.price_for(task.task_type).unwrap_or(Wei::ZERO),
            o.address,
        )
    });
    survivors.into_iter().next()
}

fn pick_cheapest(task: &Task, mut survivors: Vec<WorkerOffer>) -> Option<WorkerOffer> {
    survivors.sort_by_key(|o| {
        (
            o.price_for(task.task_type).unwrap_or(Wei::ZERO),
            Reverse(o.reputation),
            o.address,
        )
    });
    survivors.into_iter().next()
}

fn pick_weighted(
    task: &Task,
    survivors: Vec<WorkerOffer>,
    reputation_weight: f64,
    price_weight: f64,
) -> Option<WorkerOffer> {
    let prices: Vec<u128> = survivors
        .iter()
        .filter_map(|o| o.price_for(task.task_type))
        .map(|w| w.as_u128())
        .collect();
    let min_price = *prices.iter().min()?;
    let max_price = *prices.iter().max()?;

    let mut best: Option<(f64, WorkerOffer)> = None;
    for offer in survivors {
        let price = offer.price_for(task.task_type)?.as_u128();
        let rep_score = offer.reputation as f64 / 100.0;
        let price_score = if max_price == min_price {
            1.0
        } else {
            (max_price - price) as f64 / (max_price - min_price) as f64
        };
        let score = reputation_weight * rep_score + price_weight * price_score;

        best = match best {
            Some((best_score, best_offer))
                if score < best_score
                    || (score == best_score && best_offer.address < offer.address) =>
            {
                Some((best_score, best_offer))
            }
            _ => Some((score, offer)),
        };
    }
    best.map(|(_, offer)| offer)
}

//! Capability index: polls worker manifests and aggregates offers.

use crate::error::Result;
use crate::manifest::{KnownWorker, WorkerManifest};
use chrono::{DateTime, Utc};
use econos_chain::ChainGateway;
use econos_types::{Address, TaskType, Wei, WorkerOffer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct CapabilityIndexConfig {
    /// Manifest refresh interval.
    pub refresh_interval_secs: u64,
    pub manifest_timeout_secs: u64,
}

impl Default for CapabilityIndexConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            manifest_timeout_secs: 10,
        }
    }
}

/// Per-service aggregate over the cached offers.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub offers: Vec<WorkerOffer>,
    pub cheapest: Wei,
    pub price_min: Wei,
    pub price_max: Wei,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilitySummary {
    pub services: HashMap<TaskType, ServiceStats>,
    pub worker_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl CapabilitySummary {
    pub fn available_services(&self) -> Vec<TaskType> {
        let mut services: Vec<TaskType> = self.services.keys().copied().collect();
        services.sort();
        services
    }
}

/// Snapshot cache of worker offers, refreshed by polling each known
/// worker's `GET /manifest`. Workers that stop answering drop out of the
/// cache transparently on the next refresh.
pub struct CapabilityIndex {
    http: reqwest::Client,
    chain: Arc<dyn ChainGateway>,
    known_workers: RwLock<Vec<KnownWorker>>,
    cache: RwLock<HashMap<Address, WorkerOffer>>,
    config: CapabilityIndexConfig,
}

impl CapabilityIndex {
    pub fn new(
        chain: Arc<dyn ChainGateway>,
        known_workers: Vec<KnownWorker>,
        config: CapabilityIndexConfig,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            chain,
            known_workers: RwLock::new(known_workers),
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub async fn add_known_worker(&self, worker: KnownWorker) {
        self.known_workers.write().await.push(worker);
    }

    /// Spawn the refresh loop.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let index = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(index.config.refresh_interval_secs));
            loop {
                ticker.tick().await;
                index.refresh().await;
            }
        })
    }

    /// Poll every known worker once. Unreachable workers are evicted.
    pub async fn refresh(&self) {
        let workers = self.known_workers.read().await.clone();
        let mut reachable = 0usize;

        for worker in &workers {
            match self.fetch_offer(worker).await {
                Ok(offer) => {
                    self.cache.write().await.insert(worker.address, offer);
                    reachable += 1;
                }
                Err(e) => {
                    debug!(
                        worker = %worker.address,
                        endpoint = %worker.endpoint,
                        error = %e,
                        "Worker dropped from capability cache"
                    );
                    self.cache.write().await.remove(&worker.address);
                }
            }
        }

        info!(
            known = workers.len(),
            reachable,
            "🔍 Capability cache refreshed"
        );
    }

    async fn fetch_offer(&self, worker: &KnownWorker) -> Result<WorkerOffer> {
        let url = format!("{}/manifest", worker.endpoint.trim_end_matches('/'));
        let manifest: WorkerManifest = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(self.config.manifest_timeout_secs))
            .send()
            .await
            .map_err(|e| crate::MarketError::ManifestUnavailable {
                endpoint: worker.endpoint.clone(),
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| crate::MarketError::ManifestUnavailable {
                endpoint: worker.endpoint.clone(),
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| crate::MarketError::ManifestUnavailable {
                endpoint: worker.endpoint.clone(),
                reason: e.to_string(),
            })?;

        let reputation = self.chain.worker_reputation(worker.address).await?;
        let is_active = self.chain.is_worker_active(worker.address).await?;
        Ok(manifest.to_offer(&worker.endpoint, reputation, is_active))
    }

    /// Insert an offer snapshot directly, bypassing the manifest fetch.
    pub async fn insert_offer(&self, offer: WorkerOffer) {
        self.cache.write().await.insert(offer.address, offer);
    }

    /// Current offer snapshots.
    pub async fn offers(&self) -> Vec<WorkerOffer> {
        self.cache.read().await.values().cloned().collect()
    }

    /// Aggregate the cache by service type.
    pub async fn discover(&self) -> CapabilitySummary {
        let cache = self.cache.read().await;
        let mut services: HashMap<TaskType, ServiceStats> = HashMap::new();

        for offer in cache.values() {
            if !offer.is_active {
                continue;
            }
            for (task_type, price) in &offer.pricing {
                let stats = services.entry(*task_type).or_insert_with(|| ServiceStats {
                    offers: Vec::new(),
                    cheapest: *price,
                    price_min: *price,
                    price_max: *price,
                });
                stats.cheapest = stats.cheapest.min(*price);
                stats.price_min = stats.price_min.min(*price);
                stats.price_max = stats.price_max.max(*price);
                stats.offers.push(offer.clone());
            }
        }

        CapabilitySummary {
            worker_count: cache.len(),
            services,
            generated_at: Utc::now(),
        }
    }

    /// Cheapest active offer for a service, ties broken by higher
    /// reputation then lexicographic address.
    pub async fn find_cheapest(&self, task_type: TaskType) -> Option<WorkerOffer> {
        let cache = self.cache.read().await;
        cache
            .values()
            .filter(|o| o.is_active)
            .filter_map(|o| o.price_for(task_type).map(|p| (o, p)))
            .min_by(|(a, pa), (b, pb)| {
                pa.cmp(pb)
                    .then(b.reputation.cmp(&a.reputation))
                    .then(a.address.cmp(&b.address))
            })
            .map(|(o, _)| o.clone())
    }

    pub async fn is_service_available(&self, task_type: TaskType) -> bool {
        self.find_cheapest(task_type).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use econos_chain::test_helpers::MockChainGateway;
    use std::collections::BTreeSet;

    fn offer(addr: u8, price: u128, reputation: u8, active: bool) -> WorkerOffer {
        WorkerOffer {
            address: Address::from_bytes([addr; 20]),
            endpoint: format!("http://worker-{}.test", addr),
            reputation,
            capabilities: BTreeSet::from(["summary-generation".to_string()]),
            pricing: HashMap::from([(TaskType::SummaryGeneration, Wei::from_wei(price))]),
            is_active: active,
        }
    }

    fn index() -> CapabilityIndex {
        CapabilityIndex::new(
            Arc::new(MockChainGateway::new()),
            Vec::new(),
            CapabilityIndexConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_find_cheapest_prefers_price_then_reputation() {
        let index = index();
        index.insert_offer(offer(1, 500, 60, true)).await;
        index.insert_offer(offer(2, 300, 60, true)).await;
        index.insert_offer(offer(3, 300, 90, true)).await;

        let best = index.find_cheapest(TaskType::SummaryGeneration).await.unwrap();
        assert_eq!(best.address, Address::from_bytes([3; 20]));
    }

    #[tokio::test]
    async fn test_inactive_offers_are_invisible() {
        let index = index();
        index.insert_offer(offer(1, 100, 90, false)).await;

        assert!(!index.is_service_available(TaskType::SummaryGeneration).await);
        assert!(index.find_cheapest(TaskType::SummaryGeneration).await.is_none());
    }

    #[tokio::test]
    async fn test_discover_aggregates_price_range() {
        let index = index();
        index.insert_offer(offer(1, 200, 60, true)).await;
        index.insert_offer(offer(2, 800, 70, true)).await;

        let summary = index.discover().await;
        let stats = &summary.services[&TaskType::SummaryGeneration];
        assert_eq!(stats.offers.len(), 2);
        assert_eq!(stats.cheapest, Wei::from_wei(200));
        assert_eq!(stats.price_min, Wei::from_wei(200));
        assert_eq!(stats.price_max, Wei::from_wei(800));
    }
}

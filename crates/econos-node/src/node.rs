//! Node assembly: construct every collaborator once and wire them
//! together by injection.

use crate::api::{self, AppState};
use crate::config::EconosConfig;
use anyhow::{Context, Result};
use econos_chain::{ChainGateway, RpcChainGateway, RpcGatewayConfig};
use econos_crypto::{AuthorizationSigner, Eip712Domain, SignerConfig};
use econos_market::{
    CapabilityIndex, CapabilityIndexConfig, DirectoryConfig, SelectionStrategy, WorkerDirectory,
};
use econos_pipeline::{
    HttpWorkerClient, KeywordAnalyzer, LifecycleMonitor, MonitorConfig, Orchestrator,
    OrchestratorConfig, PipelinePlanner,
};
use econos_tasks::{MemoryTaskStore, TaskManager, TaskManagerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

pub struct EconosNode {
    pub config: EconosConfig,
    pub chain: Arc<RpcChainGateway>,
    pub index: Arc<CapabilityIndex>,
    pub tasks: Arc<TaskManager>,
    pub signer: Arc<AuthorizationSigner>,
    pub monitor: Arc<LifecycleMonitor>,
    pub planner: Arc<PipelinePlanner>,
    pub orchestrator: Arc<Orchestrator>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl EconosNode {
    pub fn new(config: EconosConfig) -> Result<Self> {
        config.validate().context("configuration incomplete")?;
        let master_key = config
            .chain
            .master_private_key
            .clone()
            .context("master private key missing after validation")?;

        let chain = Arc::new(
            RpcChainGateway::new(
                &master_key,
                RpcGatewayConfig {
                    rpc_url: config.chain.rpc_url.clone(),
                    chain_id: config.chain.chain_id,
                    escrow_address: config.chain.escrow_address,
                    registry_address: config.chain.registry_address,
                    block_confirmations: config.chain.block_confirmations,
                    gas_limit: config.chain.gas_limit,
                    event_poll_interval_secs: config.chain.event_poll_interval_secs,
                },
            )
            .context("chain gateway")?,
        );
        let chain_dyn: Arc<dyn ChainGateway> = chain.clone();

        let index = Arc::new(CapabilityIndex::new(
            chain_dyn.clone(),
            config.market.workers.clone(),
            CapabilityIndexConfig {
                refresh_interval_secs: config.market.capability_cache_secs,
                ..CapabilityIndexConfig::default()
            },
        ));

        let directory = Arc::new(WorkerDirectory::new(
            index.clone(),
            chain_dyn.clone(),
            DirectoryConfig {
                min_reputation: config.market.min_reputation,
            },
        ));

        let tasks = Arc::new(TaskManager::new(
            Arc::new(MemoryTaskStore::new()),
            TaskManagerConfig::default(),
        ));

        let signer = Arc::new(
            AuthorizationSigner::new(
                &master_key,
                Eip712Domain::econos_master(
                    config.chain.chain_id,
                    Some(config.chain.escrow_address),
                ),
                SignerConfig {
                    default_validity_secs: config.lifecycle.authorization_validity_secs,
                    nonce_retention_secs: config.lifecycle.nonce_retention_secs,
                },
            )
            .context("authorization signer")?,
        );

        let monitor = Arc::new(LifecycleMonitor::new(
            chain_dyn.clone(),
            tasks.clone(),
            MonitorConfig {
                expiration_check_interval_secs: config.lifecycle.expiration_check_interval_secs,
            },
        ));

        let planner = Arc::new(PipelinePlanner::new(index.clone(), Arc::new(KeywordAnalyzer)));

        let orchestrator = Arc::new(Orchestrator::new(
            chain_dyn,
            directory,
            signer.clone(),
            tasks.clone(),
            Arc::new(HttpWorkerClient::new()),
            monitor.clone(),
            OrchestratorConfig {
                authorization_validity_secs: config.lifecycle.authorization_validity_secs,
                task_duration_secs: config.lifecycle.task_duration_secs,
                selection_strategy: SelectionStrategy::Reputation,
                ..OrchestratorConfig::default()
            },
        ));

        Ok(Self {
            config,
            chain,
            index,
            tasks,
            signer,
            monitor,
            planner,
            orchestrator,
            background: Mutex::new(Vec::new()),
        })
    }

    /// Start background activities: chain event stream (resumed from the
    /// persisted block cursor), capability polling, the lifecycle monitor,
    /// and periodic nonce pruning.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let resume_block = self.monitor.resume_block().await.unwrap_or(0);
        let mut background = self.background.lock().await;

        background.push(self.chain.start_event_stream(resume_block));

        self.index.refresh().await;
        background.push(self.index.start());

        self.monitor.start().await;

        let signer = self.signer.clone();
        background.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(3_600));
            loop {
                ticker.tick().await;
                signer.prune_nonces_older_than(None).await;
            }
        }));

        info!(
            master = %self.chain.master_address(),
            chain_id = self.config.chain.chain_id,
            escrow = %self.config.chain.escrow_address,
            known_workers = self.config.market.workers.len(),
            resume_block,
            "✨ Econos master node started"
        );
        Ok(())
    }

    /// Serve the HTTP surface until ctrl-c, then stop cleanly.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.start().await?;

        if !self.config.api.enabled {
            tokio::signal::ctrl_c().await.context("signal handler")?;
            self.shutdown().await;
            return Ok(());
        }

        let state = Arc::new(AppState {
            planner: self.planner.clone(),
            orchestrator: self.orchestrator.clone(),
            tasks: self.tasks.clone(),
            index: self.index.clone(),
        });
        let app = api::router(state);

        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {}", addr))?;
        info!(%addr, "📡 API listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
            .context("api server")?;

        self.shutdown().await;
        Ok(())
    }

    /// Stop the monitor (draining in-flight work) and abort pollers.
    pub async fn shutdown(&self) {
        info!("🛑 Shutting down");
        self.monitor.stop().await;
        let mut background = self.background.lock().await;
        for handle in background.drain(..) {
            handle.abort();
        }
    }
}

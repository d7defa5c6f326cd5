//! End-to-end pipeline scenarios against the in-memory chain gateway and
//! an in-memory worker sidecar.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use econos_chain::test_helpers::MockChainGateway;
use econos_chain::ChainGateway;
use econos_crypto::{AuthorizationSigner, Eip712Domain, SignedAuthorization, SignerConfig};
use econos_market::{
    CapabilityIndex, CapabilityIndexConfig, DirectoryConfig, SelectionStrategy, WorkerDirectory,
};
use econos_pipeline::{
    KeywordAnalyzer, LifecycleMonitor, MonitorConfig, Orchestrator, OrchestratorConfig,
    PipelineError, PipelinePlanner, PlanOptions, Result as PipelineResult, WorkerProof,
    WorkerTransport,
};
use econos_tasks::store::chain_id_of;
use econos_tasks::{MemoryTaskStore, TaskManager, TaskManagerConfig, TaskStore};
use econos_types::{Address, Bytes32, TaskId, TaskStatus, TaskType, Wei, WorkerOffer};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MASTER_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// In-memory worker sidecar: accepts authorizations and, when configured,
/// submits the completion on chain shortly afterwards.
struct MockWorker {
    chain: Arc<MockChainGateway>,
    result_hash: Bytes32,
    result_data: Value,
    auto_complete: bool,
    reject_with: Option<u16>,
    authorize_calls: AtomicU64,
}

impl MockWorker {
    fn completing(chain: Arc<MockChainGateway>, result_hash: Bytes32, result_data: Value) -> Self {
        Self {
            chain,
            result_hash,
            result_data,
            auto_complete: true,
            reject_with: None,
            authorize_calls: AtomicU64::new(0),
        }
    }

    fn silent(chain: Arc<MockChainGateway>) -> Self {
        Self {
            chain,
            result_hash: Bytes32::ZERO,
            result_data: Value::Null,
            auto_complete: false,
            reject_with: None,
            authorize_calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl WorkerTransport for MockWorker {
    async fn authorize(
        &self,
        _endpoint: &str,
        task_id: &TaskId,
        _params: &Value,
        _authorization: &SignedAuthorization,
        _timeout: Duration,
    ) -> PipelineResult<()> {
        if let Some(status) = self.reject_with {
            return Err(PipelineError::DispatchFailed(status));
        }
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);

        if self.auto_complete {
            let chain = Arc::clone(&self.chain);
            let chain_id = chain_id_of(task_id);
            let result_hash = self.result_hash;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                chain.complete_task(chain_id, result_hash).await;
            });
        }
        Ok(())
    }

    async fn fetch_proof(
        &self,
        _endpoint: &str,
        _task_id: &TaskId,
        _timeout: Duration,
    ) -> PipelineResult<Option<WorkerProof>> {
        Ok(None)
    }

    async fn fetch_result(
        &self,
        _endpoint: &str,
        _task_id: &TaskId,
        _timeout: Duration,
    ) -> PipelineResult<Value> {
        Ok(self.result_data.clone())
    }
}

struct Harness {
    chain: Arc<MockChainGateway>,
    tasks: Arc<TaskManager>,
    monitor: Arc<LifecycleMonitor>,
    planner: PipelinePlanner,
    orchestrator: Orchestrator,
}

/// Build the full stack around one mock chain. `make_worker` receives that
/// chain so a completing worker can submit results to it.
async fn harness<F>(make_worker: F, offers: Vec<WorkerOffer>) -> Harness
where
    F: FnOnce(Arc<MockChainGateway>) -> Arc<dyn WorkerTransport>,
{
    let chain_mock = Arc::new(MockChainGateway::new());
    let worker = make_worker(chain_mock.clone());
    for offer in &offers {
        chain_mock
            .register_worker(offer.address, offer.is_active, offer.reputation)
            .await;
    }
    let chain: Arc<dyn ChainGateway> = chain_mock.clone();

    let index = Arc::new(CapabilityIndex::new(
        chain.clone(),
        Vec::new(),
        CapabilityIndexConfig::default(),
    ));
    for offer in offers {
        index.insert_offer(offer).await;
    }

    let directory = Arc::new(WorkerDirectory::new(
        index.clone(),
        chain.clone(),
        DirectoryConfig::default(),
    ));
    let tasks = Arc::new(TaskManager::new(
        Arc::new(MemoryTaskStore::new()),
        TaskManagerConfig::default(),
    ));
    let signer = Arc::new(
        AuthorizationSigner::new(
            MASTER_KEY,
            Eip712Domain::econos_master(240, Some(Address::from_bytes([0xec; 20]))),
            SignerConfig::default(),
        )
        .unwrap(),
    );
    let monitor = Arc::new(LifecycleMonitor::new(
        chain.clone(),
        tasks.clone(),
        MonitorConfig {
            expiration_check_interval_secs: 3_600,
        },
    ));
    monitor.start().await;

    let planner = PipelinePlanner::new(index.clone(), Arc::new(KeywordAnalyzer));
    let orchestrator = Orchestrator::new(
        chain,
        directory,
        signer,
        tasks.clone(),
        worker,
        monitor.clone(),
        OrchestratorConfig {
            proof_poll_interval_secs: 1,
            selection_strategy: SelectionStrategy::Reputation,
            ..OrchestratorConfig::default()
        },
    );

    Harness {
        chain: chain_mock,
        tasks,
        monitor,
        planner,
        orchestrator,
    }
}

fn summary_offer(addr: u8, price_ether: f64, reputation: u8) -> WorkerOffer {
    WorkerOffer {
        address: Address::from_bytes([addr; 20]),
        endpoint: format!("http://worker-{}.test", addr),
        reputation,
        capabilities: BTreeSet::from(["summary-generation".to_string()]),
        pricing: HashMap::from([(TaskType::SummaryGeneration, Wei::from_ether(price_ether))]),
        is_active: true,
    }
}

#[tokio::test]
async fn test_happy_path_single_step_summary() {
    let result_hash = Bytes32::from_bytes([0xab; 32]);
    let result_data = json!({"summary": "Three sentences about the article."});

    let mut worker_handle: Option<Arc<MockWorker>> = None;
    let h = harness(
        |chain| {
            let worker = Arc::new(MockWorker::completing(chain, result_hash, result_data.clone()));
            worker_handle = Some(worker.clone());
            worker
        },
        vec![summary_offer(1, 0.002, 80)],
    )
    .await;
    let worker = worker_handle.unwrap();

    let plan = h
        .planner
        .plan_direct(
            TaskType::SummaryGeneration,
            json!({"text": "A long article body to be condensed.", "maxSentences": 3}),
            &PlanOptions {
                max_budget: Some(Wei::from_ether(0.01)),
                duration_secs: Some(10_800),
            },
        )
        .await
        .unwrap();
    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.estimated_budget, Wei::from_ether(0.002));

    let outcome = h.orchestrator.execute(&plan).await;
    assert!(outcome.success, "plan failed: {:?}", outcome.steps);
    assert_eq!(outcome.steps.len(), 1);
    assert_eq!(outcome.steps[0].result_hash, Some(result_hash));
    assert_eq!(outcome.final_result, Some(result_data));

    let task_id = outcome.steps[0].task_id.unwrap();
    let task = h.tasks.get(&task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result_hash, Some(result_hash));
    assert!(task.escrow_tx_hash.is_some());
    // The hire's requested escrow duration, not the orchestrator default.
    assert_eq!((task.deadline - task.created_at).num_seconds(), 10_800);
    assert_eq!(h.chain.deposit_count(), 1);
    assert_eq!(worker.authorize_calls.load(Ordering::SeqCst), 1);

    h.monitor.stop().await;
}

#[tokio::test]
async fn test_low_reputation_worker_yields_no_eligible_worker_without_chain_calls() {
    let h = harness(
        |chain| Arc::new(MockWorker::silent(chain)),
        vec![summary_offer(1, 0.002, 40)],
    )
    .await;

    let plan = h
        .planner
        .plan_direct(
            TaskType::SummaryGeneration,
            json!({"text": "body", "maxSentences": 3}),
            &PlanOptions::default(),
        )
        .await
        .unwrap();

    let outcome = h.orchestrator.execute(&plan).await;
    assert!(!outcome.success);
    let error = outcome.steps[0].error.as_deref().unwrap();
    assert!(error.contains("No eligible worker"), "got: {}", error);

    // Selection failed synchronously, before any chain interaction.
    assert_eq!(h.chain.deposit_count(), 0);

    h.monitor.stop().await;
}

#[tokio::test]
async fn test_deadline_expiry_sweeps_refund_and_slash() {
    let h = harness(
        |chain| Arc::new(MockWorker::silent(chain)),
        vec![summary_offer(1, 0.002, 80)],
    )
    .await;
    let worker = Address::from_bytes([1; 20]);

    // Deposit escrow for a task, then age it past its deadline.
    let task = h
        .tasks
        .create(econos_tasks::NewTask {
            task_type: TaskType::SummaryGeneration,
            input_parameters: json!({"text": "body"}),
            required_capabilities: None,
            budget: Wei::from_ether(0.002),
            duration_secs: 7_200,
        })
        .await
        .unwrap();
    let chain_id = chain_id_of(&task.task_id);
    let receipt = h
        .chain
        .deposit_task(chain_id, worker, 7_200, Wei::from_ether(0.002))
        .await
        .unwrap();
    h.tasks
        .record_escrow_deposit(&task.task_id, receipt.tx_hash, worker)
        .await
        .unwrap();

    let mut aged = h.tasks.get(&task.task_id).await.unwrap();
    aged.deadline = Utc::now() - ChronoDuration::seconds(60);
    h.tasks.store().put(aged).await.unwrap();

    h.monitor.sweep_once().await;
    assert_eq!(h.chain.refund_count(), 1);

    // The refund event drives the terminal transition.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let task = h.tasks.get(&task.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Refunded);

    // A second sweep over the now-terminal task is a no-op.
    h.monitor.sweep_once().await;
    assert_eq!(h.chain.refund_count(), 1);

    h.monitor.stop().await;
}

#[tokio::test]
async fn test_refund_failure_fails_the_task() {
    let h = harness(
        |chain| Arc::new(MockWorker::silent(chain)),
        vec![summary_offer(1, 0.002, 80)],
    )
    .await;
    let worker = Address::from_bytes([1; 20]);

    let task = h
        .tasks
        .create(econos_tasks::NewTask {
            task_type: TaskType::SummaryGeneration,
            input_parameters: json!({"text": "body"}),
            required_capabilities: None,
            budget: Wei::from_ether(0.002),
            duration_secs: 7_200,
        })
        .await
        .unwrap();
    let receipt = h
        .chain
        .deposit_task(chain_id_of(&task.task_id), worker, 7_200, Wei::from_ether(0.002))
        .await
        .unwrap();
    h.tasks
        .record_escrow_deposit(&task.task_id, receipt.tx_hash, worker)
        .await
        .unwrap();

    let mut aged = h.tasks.get(&task.task_id).await.unwrap();
    aged.deadline = Utc::now() - ChronoDuration::seconds(60);
    h.tasks.store().put(aged).await.unwrap();

    h.chain.set_fail_refunds(true);
    h.monitor.sweep_once().await;

    let task = h.tasks.get(&task.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);

    h.monitor.stop().await;
}

#[tokio::test]
async fn test_monitor_start_and_stop_are_idempotent() {
    let h = harness(|chain| Arc::new(MockWorker::silent(chain)), vec![]).await;

    // Second start and double stop must be harmless.
    h.monitor.start().await;
    h.monitor.stop().await;
    h.monitor.stop().await;
}

#[tokio::test]
async fn test_created_event_advances_pending_task() {
    let h = harness(|chain| Arc::new(MockWorker::silent(chain)), vec![]).await;
    let worker = Address::from_bytes([5; 20]);

    let task = h
        .tasks
        .create(econos_tasks::NewTask {
            task_type: TaskType::Researcher,
            input_parameters: json!({"topic": "rollups"}),
            required_capabilities: None,
            budget: Wei::from_ether(0.001),
            duration_secs: 7_200,
        })
        .await
        .unwrap();

    // Chain-side deposit observed before the local escrow record lands.
    h.chain
        .deposit_task(chain_id_of(&task.task_id), worker, 7_200, Wei::from_ether(0.001))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let task = h.tasks.get(&task.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Created);

    // The monitor persisted the processed block for resumable streams.
    let cursor = h.tasks.store().load_block_cursor().await.unwrap();
    assert!(cursor.is_some());

    h.monitor.stop().await;
}

//! Top-level controller: drive a plan's steps through select → deposit →
//! authorize → dispatch → await → aggregate.

use crate::error::{PipelineError, Result};
use crate::monitor::{LifecycleEvent, LifecycleMonitor};
use crate::types::{
    ExecutionPlan, InputMapping, PipelineExecutionResult, PlanStep, StepResult, StepStatus,
};
use crate::worker_client::WorkerTransport;
use chrono::Utc;
use econos_chain::ChainGateway;
use econos_crypto::AuthorizationSigner;
use econos_market::{SelectionStrategy, WorkerDirectory};
use econos_tasks::store::chain_id_of;
use econos_tasks::{NewTask, TaskManager};
use econos_types::{Bytes32, Task, TaskStatus, WorkerOffer};
use rand::Rng;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Ceiling on authorization validity; the task deadline clamps further.
    pub authorization_validity_secs: u64,
    /// Escrow duration requested per step task.
    pub task_duration_secs: u64,
    /// Fallback proof probe cadence while awaiting completion.
    pub proof_poll_interval_secs: u64,
    pub dispatch_timeout_secs: u64,
    pub selection_strategy: SelectionStrategy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            authorization_validity_secs: 3_600,
            task_duration_secs: 7_200,
            proof_poll_interval_secs: 5,
            dispatch_timeout_secs: 30,
            selection_strategy: SelectionStrategy::Reputation,
        }
    }
}

pub struct Orchestrator {
    chain: Arc<dyn ChainGateway>,
    directory: Arc<WorkerDirectory>,
    signer: Arc<AuthorizationSigner>,
    tasks: Arc<TaskManager>,
    worker: Arc<dyn WorkerTransport>,
    monitor: Arc<LifecycleMonitor>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        chain: Arc<dyn ChainGateway>,
        directory: Arc<WorkerDirectory>,
        signer: Arc<AuthorizationSigner>,
        tasks: Arc<TaskManager>,
        worker: Arc<dyn WorkerTransport>,
        monitor: Arc<LifecycleMonitor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            chain,
            directory,
            signer,
            tasks,
            worker,
            monitor,
            config,
        }
    }

    /// Execute a plan's steps in topological order. The first step failure
    /// fails the plan; escrow already deposited for an unfinished step is
    /// left to the lifecycle monitor's sweeper to reclaim.
    pub async fn execute(&self, plan: &ExecutionPlan) -> PipelineExecutionResult {
        let mut ordered = plan.steps.clone();
        ordered.sort_by_key(|s| s.order);

        let mut step_results: Vec<StepResult> = Vec::with_capacity(ordered.len());
        let mut prior_results: HashMap<String, Value> = HashMap::new();
        let mut last_result: Option<Value> = None;
        let mut success = true;

        info!(plan_id = %plan.plan_id, steps = ordered.len(), "🚀 Plan execution started");

        for step in &ordered {
            match self.run_step(step, &prior_results, last_result.as_ref()).await {
                Ok(result) => {
                    if let Some(data) = &result.result {
                        prior_results.insert(step.step_id.clone(), data.clone());
                        last_result = Some(data.clone());
                    }
                    step_results.push(result);
                }
                Err(e) => {
                    warn!(
                        plan_id = %plan.plan_id,
                        step_id = %step.step_id,
                        error = %e,
                        "❌ Step failed, failing plan"
                    );
                    step_results.push(StepResult {
                        step_id: step.step_id.clone(),
                        task_id: None,
                        status: StepStatus::Failed,
                        result: None,
                        result_hash: None,
                        error: Some(e.to_string()),
                    });
                    success = false;
                    break;
                }
            }
        }

        let final_result = if success { last_result } else { None };
        info!(plan_id = %plan.plan_id, success, "🏁 Plan execution finished");

        PipelineExecutionResult {
            plan_id: plan.plan_id.clone(),
            success,
            steps: step_results,
            final_result,
        }
    }

    async fn run_step(
        &self,
        step: &PlanStep,
        prior_results: &HashMap<String, Value>,
        last_result: Option<&Value>,
    ) -> Result<StepResult> {
        let params = resolve_input(&step.input_mapping, prior_results, last_result)?;
        let duration_secs = step.duration_secs.unwrap_or(self.config.task_duration_secs);

        let task = self
            .tasks
            .create(NewTask {
                task_type: step.service_type,
                input_parameters: params.clone(),
                required_capabilities: None,
                budget: step.price,
                duration_secs,
            })
            .await?;

        let offer = self.bind_worker(&task, step).await?;
        let price = offer
            .price_for(step.service_type)
            .ok_or(PipelineError::NoEligibleWorker)?;

        // Subscribe before touching the chain so the completion event
        // cannot slip between deposit and await.
        let lifecycle = self.monitor.subscribe();

        let chain_id = chain_id_of(&task.task_id);
        let receipt = self
            .chain
            .deposit_task(chain_id, offer.address, duration_secs, price)
            .await?;
        self.tasks
            .record_escrow_deposit(&task.task_id, receipt.tx_hash, offer.address)
            .await?;

        let validity = task
            .remaining_secs(Utc::now())
            .min(self.config.authorization_validity_secs);
        let authorization = self
            .signer
            .create_signed_authorization(task.task_id, offer.address, validity, Some(task.deadline))
            .await?;
        self.tasks
            .record_authorization(&task.task_id, authorization.to_record())
            .await?;

        self.worker
            .authorize(
                &offer.endpoint,
                &task.task_id,
                &params,
                &authorization,
                Duration::from_secs(self.config.dispatch_timeout_secs),
            )
            .await?;
        self.tasks
            .update_status(&task.task_id, TaskStatus::Authorized)
            .await?;

        // The completion event may race this transition through Running;
        // only a genuinely illegal state is an error.
        if let Err(e) = self.tasks.update_status(&task.task_id, TaskStatus::Running).await {
            let current = self.tasks.get(&task.task_id).await?;
            if current.status != TaskStatus::Completed {
                return Err(e.into());
            }
        }

        let result_hash = self
            .await_completion(&task, &offer.endpoint, lifecycle)
            .await?;

        let data = self
            .worker
            .fetch_result(
                &offer.endpoint,
                &task.task_id,
                Duration::from_secs(self.config.dispatch_timeout_secs),
            )
            .await?;

        info!(
            task_id = task.task_id.short(),
            step_id = %step.step_id,
            result_hash = result_hash.short(),
            "✅ Step completed"
        );

        Ok(StepResult {
            step_id: step.step_id.clone(),
            task_id: Some(task.task_id),
            status: StepStatus::Completed,
            result: Some(data),
            result_hash: Some(result_hash),
            error: None,
        })
    }

    /// Prefer the plan's binding when it is still eligible; otherwise
    /// re-select under the configured strategy.
    async fn bind_worker(&self, task: &Task, step: &PlanStep) -> Result<WorkerOffer> {
        if let Some(planned) = step.assigned_worker {
            if let Some(offer) = self
                .directory
                .select_worker(task, &SelectionStrategy::Direct, Some(planned))
                .await?
            {
                return Ok(offer);
            }
            debug!(
                step_id = %step.step_id,
                planned = %planned,
                "Planned worker no longer eligible, re-selecting"
            );
        }

        self.directory
            .select_worker(task, &self.config.selection_strategy, None)
            .await?
            .ok_or(PipelineError::NoEligibleWorker)
    }

    /// Wait for the lifecycle monitor to observe on-chain completion.
    /// Primary signal is the event stream; a jittered proof probe and a
    /// status re-read cover missed events. Bounded by the task deadline.
    async fn await_completion(
        &self,
        task: &Task,
        endpoint: &str,
        mut lifecycle: broadcast::Receiver<LifecycleEvent>,
    ) -> Result<Bytes32> {
        let budget = task.remaining_secs(Utc::now()).max(1);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(budget);
        let mut events_open = true;

        loop {
            let poll_in = self.next_probe_delay();

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(PipelineError::ProofTimeout(task.task_id.to_hex()));
                }
                event = lifecycle.recv(), if events_open => match event {
                    Ok(event) if event.task_id() == task.task_id => match event {
                        LifecycleEvent::Completed { result_hash, .. } => return Ok(result_hash),
                        LifecycleEvent::Refunded { .. } => {
                            return Err(PipelineError::DeadlineExceeded(task.task_id.to_hex()));
                        }
                        LifecycleEvent::Failed { reason, .. } => {
                            return Err(PipelineError::DeadlineExceeded(reason));
                        }
                        LifecycleEvent::Created { .. } => {}
                    },
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "Lifecycle stream lagged, relying on status probe");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        events_open = false;
                    }
                },
                _ = tokio::time::sleep(poll_in) => {
                    let current = self.tasks.get(&task.task_id).await?;
                    match current.status {
                        TaskStatus::Completed => {
                            return Ok(current.result_hash.unwrap_or(Bytes32::ZERO));
                        }
                        TaskStatus::Refunded | TaskStatus::Failed => {
                            return Err(PipelineError::DeadlineExceeded(task.task_id.to_hex()));
                        }
                        _ => {
                            // Fallback probe only; completion still arrives
                            // through the chain, not this response.
                            match self
                                .worker
                                .fetch_proof(endpoint, &task.task_id, Duration::from_secs(10))
                                .await
                            {
                                Ok(Some(proof)) => debug!(
                                    task_id = task.task_id.short(),
                                    result_hash = proof.result_hash.short(),
                                    "Worker proof observed, awaiting on-chain completion"
                                ),
                                Ok(None) => {}
                                Err(e) => debug!(
                                    task_id = task.task_id.short(),
                                    error = %e,
                                    "Proof probe failed"
                                ),
                            }
                        }
                    }
                }
            }
        }
    }

    fn next_probe_delay(&self) -> Duration {
        let base_ms = self.config.proof_poll_interval_secs * 1_000;
        let jitter = rand::thread_rng().gen_range(0..=base_ms / 2);
        Duration::from_millis(base_ms + jitter)
    }
}

/// Resolve a step's effective input parameters from earlier step results.
fn resolve_input(
    mapping: &InputMapping,
    prior_results: &HashMap<String, Value>,
    last_result: Option<&Value>,
) -> Result<Value> {
    match mapping {
        InputMapping::Direct { literal } => Ok(literal.clone()),

        InputMapping::FromPrevious {
            source_step_id,
            field,
        } => {
            let source = prior_results.get(source_step_id).ok_or_else(|| {
                PipelineError::InvalidPlan(format!("no result for step {}", source_step_id))
            })?;
            Ok(match field {
                Some(field) => source.get(field).cloned().unwrap_or_else(|| source.clone()),
                None => source.clone(),
            })
        }

        // The worker applies the instruction to the prior output.
        InputMapping::Transform { instruction } => Ok(json!({
            "instruction": instruction,
            "input": last_result.cloned().unwrap_or(Value::Null),
        })),

        InputMapping::Merge { sources } => {
            let mut merged = Map::new();
            for source in sources {
                let value = prior_results.get(&source.step_id).ok_or_else(|| {
                    PipelineError::InvalidPlan(format!("no result for step {}", source.step_id))
                })?;
                match &source.field {
                    Some(field) => {
                        if let Some(picked) = value.get(field) {
                            merged.insert(field.clone(), picked.clone());
                        }
                    }
                    None => {
                        if let Some(obj) = value.as_object() {
                            for (k, v) in obj {
                                merged.insert(k.clone(), v.clone());
                            }
                        } else {
                            merged.insert(source.step_id.clone(), value.clone());
                        }
                    }
                }
            }
            Ok(Value::Object(merged))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MergeSource;

    #[test]
    fn test_resolve_direct() {
        let literal = json!({"text": "hello"});
        let resolved = resolve_input(
            &InputMapping::Direct { literal: literal.clone() },
            &HashMap::new(),
            None,
        )
        .unwrap();
        assert_eq!(resolved, literal);
    }

    #[test]
    fn test_resolve_from_previous_field_projection() {
        let mut prior = HashMap::new();
        prior.insert("step-1".to_string(), json!({"summary": "short", "words": 120}));

        let resolved = resolve_input(
            &InputMapping::FromPrevious {
                source_step_id: "step-1".to_string(),
                field: Some("summary".to_string()),
            },
            &prior,
            None,
        )
        .unwrap();
        assert_eq!(resolved, json!("short"));

        // Missing field falls back to the whole result.
        let resolved = resolve_input(
            &InputMapping::FromPrevious {
                source_step_id: "step-1".to_string(),
                field: Some("absent".to_string()),
            },
            &prior,
            None,
        )
        .unwrap();
        assert_eq!(resolved, json!({"summary": "short", "words": 120}));
    }

    #[test]
    fn test_resolve_from_previous_missing_step_is_plan_error() {
        let err = resolve_input(
            &InputMapping::FromPrevious {
                source_step_id: "step-9".to_string(),
                field: None,
            },
            &HashMap::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPlan(_)));
    }

    #[test]
    fn test_resolve_transform_wraps_last_result() {
        let last = json!({"text": "raw"});
        let resolved = resolve_input(
            &InputMapping::Transform {
                instruction: "translate to French".to_string(),
            },
            &HashMap::new(),
            Some(&last),
        )
        .unwrap();
        assert_eq!(resolved["instruction"], "translate to French");
        assert_eq!(resolved["input"], last);
    }

    #[test]
    fn test_resolve_merge_is_shallow() {
        let mut prior = HashMap::new();
        prior.insert("step-1".to_string(), json!({"title": "T", "body": "B"}));
        prior.insert("step-2".to_string(), json!({"image_url": "http://img.test/1.png"}));

        let resolved = resolve_input(
            &InputMapping::Merge {
                sources: vec![
                    MergeSource { step_id: "step-1".to_string(), field: None },
                    MergeSource {
                        step_id: "step-2".to_string(),
                        field: Some("image_url".to_string()),
                    },
                ],
            },
            &prior,
            None,
        )
        .unwrap();

        assert_eq!(resolved["title"], "T");
        assert_eq!(resolved["body"], "B");
        assert_eq!(resolved["image_url"], "http://img.test/1.png");
    }
}

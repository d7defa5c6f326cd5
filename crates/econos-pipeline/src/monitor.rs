//! Lifecycle monitor: chain event demultiplexer plus deadline sweeper.
//!
//! Runs independently of any in-flight `Orchestrator::execute`. Failures
//! never propagate out of the monitor; they become state transitions and
//! lifecycle events.

use crate::error::Result;
use econos_chain::{ChainEvent, ChainGateway};
use econos_tasks::store::chain_id_of;
use econos_tasks::{TaskManager, TaskStore};
use econos_types::{Bytes32, TaskId, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const LIFECYCLE_CHANNEL_CAPACITY: usize = 256;

/// Typed lifecycle notifications fanned out to subscribers (orchestrator,
/// API layer).
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Created { task_id: TaskId },
    Completed { task_id: TaskId, result_hash: Bytes32 },
    Refunded { task_id: TaskId },
    Failed { task_id: TaskId, reason: String },
}

impl LifecycleEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            LifecycleEvent::Created { task_id }
            | LifecycleEvent::Completed { task_id, .. }
            | LifecycleEvent::Refunded { task_id }
            | LifecycleEvent::Failed { task_id, .. } => *task_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Deadline sweep cadence.
    pub expiration_check_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            expiration_check_interval_secs: 60,
        }
    }
}

struct MonitorHandles {
    shutdown_tx: watch::Sender<bool>,
    event_loop: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

pub struct LifecycleMonitor {
    chain: Arc<dyn ChainGateway>,
    tasks: Arc<TaskManager>,
    config: MonitorConfig,
    events_tx: broadcast::Sender<LifecycleEvent>,
    running: Mutex<Option<MonitorHandles>>,
}

impl LifecycleMonitor {
    pub fn new(chain: Arc<dyn ChainGateway>, tasks: Arc<TaskManager>, config: MonitorConfig) -> Self {
        let (events_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        Self {
            chain,
            tasks,
            config,
            events_tx,
            running: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events_tx.subscribe()
    }

    /// Start both loops. Idempotent: a second start while running is a
    /// no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Lifecycle monitor already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let event_loop = {
            let monitor = Arc::clone(self);
            let mut shutdown = shutdown_rx.clone();
            let mut chain_events = self.chain.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        received = chain_events.recv() => match received {
                            Ok(event) => monitor.handle_chain_event(event).await,
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                warn!(missed, "⚠️ Chain event stream lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            })
        };

        let sweeper = {
            let monitor = Arc::clone(self);
            let mut shutdown = shutdown_rx;
            let interval = Duration::from_secs(self.config.expiration_check_interval_secs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => monitor.sweep_once().await,
                    }
                }
            })
        };

        *running = Some(MonitorHandles {
            shutdown_tx,
            event_loop,
            sweeper,
        });
        info!(
            sweep_interval_secs = self.config.expiration_check_interval_secs,
            "👁️ Lifecycle monitor started"
        );
    }

    /// Stop both loops, draining in-flight handling before returning.
    /// Idempotent: stopping a stopped monitor is a no-op.
    pub async fn stop(&self) {
        let handles = self.running.lock().await.take();
        if let Some(handles) = handles {
            let _ = handles.shutdown_tx.send(true);
            let _ = handles.event_loop.await;
            let _ = handles.sweeper.await;
            info!("🛑 Lifecycle monitor stopped");
        }
    }

    async fn handle_chain_event(&self, event: ChainEvent) {
        let chain_id = event.task_id();
        let task = match self.tasks.find_by_chain_id(&chain_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!(chain_id = chain_id.short(), "Event for unknown task skipped");
                return;
            }
            Err(e) => {
                warn!(chain_id = chain_id.short(), error = %e, "⚠️ Task lookup failed");
                return;
            }
        };
        let task_id = task.task_id;

        match event {
            ChainEvent::TaskCreated { block_number, .. } => {
                if task.status == TaskStatus::Pending {
                    match self.tasks.update_status(&task_id, TaskStatus::Created).await {
                        Ok(_) => {
                            let _ = self.events_tx.send(LifecycleEvent::Created { task_id });
                        }
                        Err(e) => debug!(task_id = task_id.short(), error = %e, "Created transition skipped"),
                    }
                }
                self.persist_cursor(block_number).await;
            }
            ChainEvent::TaskCompleted {
                result_hash,
                block_number,
                ..
            } => {
                match self.tasks.record_completion(&task_id, result_hash).await {
                    Ok(_) => {
                        let _ = self
                            .events_tx
                            .send(LifecycleEvent::Completed { task_id, result_hash });
                    }
                    Err(e) => {
                        warn!(task_id = task_id.short(), error = %e, "⚠️ Completion not recordable")
                    }
                }
                self.persist_cursor(block_number).await;
            }
            ChainEvent::TaskRefunded { block_number, .. } => {
                if task.status.can_refund() {
                    match self.tasks.update_status(&task_id, TaskStatus::Refunded).await {
                        Ok(_) => {
                            let _ = self.events_tx.send(LifecycleEvent::Refunded { task_id });
                            info!(task_id = task_id.short(), "🔄 Task refunded");
                        }
                        Err(e) => {
                            debug!(task_id = task_id.short(), error = %e, "Refund transition skipped")
                        }
                    }
                }
                self.persist_cursor(block_number).await;
            }
        }
    }

    /// One sweep over expired escrow-holding tasks. Refund attempts that
    /// fail on chain push the task to `Failed` instead of propagating.
    pub async fn sweep_once(&self) {
        let expired = match self.tasks.get_expired_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "⚠️ Expired-task query failed");
                return;
            }
        };

        for task in expired {
            if !task.status.can_refund() {
                continue;
            }
            let task_id = task.task_id;
            let chain_id = chain_id_of(&task_id);

            match self.chain.refund_and_slash(chain_id).await {
                Ok(receipt) => {
                    info!(
                        task_id = task_id.short(),
                        tx_hash = receipt.tx_hash.short(),
                        "🧹 Expired task refund submitted"
                    );
                    // The Refunded transition lands when the chain event
                    // arrives; the sweep only initiates.
                }
                Err(e) => {
                    warn!(task_id = task_id.short(), error = %e, "⚠️ Refund failed, failing task");
                    match self.tasks.update_status(&task_id, TaskStatus::Failed).await {
                        Ok(_) => {
                            let _ = self.events_tx.send(LifecycleEvent::Failed {
                                task_id,
                                reason: e.to_string(),
                            });
                        }
                        Err(transition_err) => {
                            debug!(task_id = task_id.short(), error = %transition_err, "Fail transition skipped")
                        }
                    }
                }
            }
        }
    }

    async fn persist_cursor(&self, block_number: u64) {
        if let Err(e) = self.tasks.store().save_block_cursor(block_number).await {
            warn!(block_number, error = %e, "⚠️ Block cursor persist failed");
        }
    }

    /// Block to resume the chain event stream from after a restart.
    pub async fn resume_block(&self) -> Result<u64> {
        Ok(self
            .tasks
            .store()
            .load_block_cursor()
            .await
            .map_err(crate::PipelineError::Task)?
            .map(|b| b + 1)
            .unwrap_or(0))
    }
}

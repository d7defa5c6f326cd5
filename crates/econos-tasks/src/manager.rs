//! Task manager: creates, validates, and mutates canonical tasks.

use crate::error::{Result, TaskError};
use crate::schema::validate_input;
use crate::store::TaskStore;
use chrono::{Duration, Utc};
use econos_types::{
    Address, AuthorizationRecord, Bytes32, Task, TaskId, TaskStatus, TaskType, Wei,
};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Escrow duration bounds, inclusive.
    pub min_duration_secs: u64,
    pub max_duration_secs: u64,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 3_600,
            max_duration_secs: 604_800,
        }
    }
}

/// Creation request for a canonical task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_type: TaskType,
    pub input_parameters: Value,
    pub required_capabilities: Option<BTreeSet<String>>,
    pub budget: Wei,
    pub duration_secs: u64,
}

/// Exclusive owner of task mutation. Reads are lock-free snapshots;
/// writes for one task serialize behind its entry in the lock table.
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    locks: Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
    used_tx_hashes: Mutex<HashSet<Bytes32>>,
    config: TaskManagerConfig,
}

impl TaskManager {
    pub fn new(store: Arc<dyn TaskStore>, config: TaskManagerConfig) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            used_tx_hashes: Mutex::new(HashSet::new()),
            config,
        }
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    /// Validate and persist a new task. All validation errors surface here,
    /// before any side effect.
    pub async fn create(&self, new: NewTask) -> Result<Task> {
        if new.budget.is_zero() {
            return Err(TaskError::InvalidBudget);
        }
        if new.duration_secs < self.config.min_duration_secs
            || new.duration_secs > self.config.max_duration_secs
        {
            return Err(TaskError::DurationOutOfRange {
                secs: new.duration_secs,
                min: self.config.min_duration_secs,
                max: self.config.max_duration_secs,
            });
        }
        validate_input(new.task_type, &new.input_parameters)?;

        let now = Utc::now();
        let mut required = new.required_capabilities.unwrap_or_default();
        required.insert(new.task_type.label().to_string());

        let task = Task {
            task_id: TaskId::random(),
            task_type: new.task_type,
            input_parameters: new.input_parameters,
            required_capabilities: required,
            deadline: now + Duration::seconds(new.duration_secs as i64),
            budget: new.budget,
            status: TaskStatus::Pending,
            assigned_worker: None,
            escrow_tx_hash: None,
            result_hash: None,
            authorization: None,
            created_at: now,
            updated_at: now,
        };

        self.store.put(task.clone()).await?;
        info!(
            task_id = task.task_id.short(),
            task_type = %task.task_type,
            budget_wei = %task.budget,
            deadline = %task.deadline,
            "📋 Task created"
        );
        Ok(task)
    }

    pub async fn get(&self, task_id: &TaskId) -> Result<Task> {
        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| TaskError::TaskNotFound(task_id.to_hex()))
    }

    /// Advance the status through the transition table. Illegal moves,
    /// including any move out of a terminal state, are rejected.
    pub async fn update_status(&self, task_id: &TaskId, to: TaskStatus) -> Result<Task> {
        let _guard = self.task_guard(*task_id).await;
        let mut task = self.get(task_id).await?;

        if !task.status.can_transition_to(to) {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to,
            });
        }

        let from = task.status;
        task.status = to;
        task.updated_at = Utc::now();
        self.store.put(task.clone()).await?;

        info!(
            task_id = task_id.short(),
            from = %from,
            to = %to,
            "🔄 Task status advanced"
        );
        Ok(task)
    }

    pub async fn assign_worker(&self, task_id: &TaskId, worker: Address) -> Result<Task> {
        let _guard = self.task_guard(*task_id).await;
        let mut task = self.get(task_id).await?;
        if task.status.is_terminal() {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to: task.status,
            });
        }

        task.assigned_worker = Some(worker);
        task.updated_at = Utc::now();
        self.store.put(task.clone()).await?;
        Ok(task)
    }

    /// Record the escrow deposit. The tx hash replay set guarantees one
    /// deposit backs at most one task; the status advances Pending→Created
    /// here so the record satisfies its invariants the moment it is
    /// readable as Created.
    pub async fn record_escrow_deposit(
        &self,
        task_id: &TaskId,
        tx_hash: Bytes32,
        worker: Address,
    ) -> Result<Task> {
        let _guard = self.task_guard(*task_id).await;
        let mut task = self.get(task_id).await?;

        // Claim the tx hash only once the task is known to exist, and
        // release the claim if persisting fails, so a failed call never
        // burns the hash for the legitimate task.
        {
            let mut used = self.used_tx_hashes.lock().await;
            if !used.insert(tx_hash) {
                return Err(TaskError::PaymentReplay(tx_hash.to_hex()));
            }
        }

        task.escrow_tx_hash = Some(tx_hash);
        task.assigned_worker = Some(worker);
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::Created;
        }
        task.updated_at = Utc::now();
        if let Err(e) = self.store.put(task.clone()).await {
            self.used_tx_hashes.lock().await.remove(&tx_hash);
            return Err(e);
        }

        debug!(
            task_id = task_id.short(),
            tx_hash = tx_hash.short(),
            "Escrow deposit recorded"
        );
        Ok(task)
    }

    /// Attach the signed authorization triple. Requires escrow to be
    /// recorded first so `Authorized` implies both escrow and authorization.
    pub async fn record_authorization(
        &self,
        task_id: &TaskId,
        authorization: AuthorizationRecord,
    ) -> Result<Task> {
        let _guard = self.task_guard(*task_id).await;
        let mut task = self.get(task_id).await?;

        if task.escrow_tx_hash.is_none() {
            return Err(TaskError::EscrowNotRecorded(task_id.to_hex()));
        }

        task.authorization = Some(authorization);
        task.updated_at = Utc::now();
        self.store.put(task.clone()).await?;
        Ok(task)
    }

    /// Record completion with the on-chain result hash. A completion
    /// observed while the task is still `Authorized` walks through
    /// `Running` first so every reader sees a legal path. Re-delivery of
    /// the same completion is a no-op.
    pub async fn record_completion(&self, task_id: &TaskId, result_hash: Bytes32) -> Result<Task> {
        let _guard = self.task_guard(*task_id).await;
        let mut task = self.get(task_id).await?;

        if task.status == TaskStatus::Completed {
            return Ok(task);
        }
        if task.status == TaskStatus::Authorized {
            task.status = TaskStatus::Running;
        }
        if !task.status.can_transition_to(TaskStatus::Completed) {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Completed,
            });
        }

        task.status = TaskStatus::Completed;
        task.result_hash = Some(result_hash);
        task.updated_at = Utc::now();
        self.store.put(task.clone()).await?;

        info!(
            task_id = task_id.short(),
            result_hash = result_hash.short(),
            "✅ Task completed"
        );
        Ok(task)
    }

    pub async fn get_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.store.get_by_status(status).await
    }

    /// Tasks past their deadline that still hold escrow.
    pub async fn get_expired_tasks(&self) -> Result<Vec<Task>> {
        self.store.get_expired(Utc::now()).await
    }

    /// Resolve a local task from the 32-byte id the chain indexes by.
    pub async fn find_by_chain_id(&self, chain_id: &Bytes32) -> Result<Option<Task>> {
        self.store.get_by_chain_id(chain_id).await
    }

    async fn task_guard(&self, task_id: TaskId) -> OwnedTaskGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(
                locks
                    .entry(task_id)
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        OwnedTaskGuard::acquire(lock).await
    }
}

/// Holds a per-task mutex for the duration of one mutation.
struct OwnedTaskGuard {
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl OwnedTaskGuard {
    async fn acquire(lock: Arc<Mutex<()>>) -> Self {
        Self {
            _permit: lock.lock_owned().await,
        }
    }
}

//! Task persistence interface and the in-memory reference implementation.

use crate::error::{Result, TaskError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use econos_crypto::keccak256;
use econos_types::{Bytes32, Task, TaskId, TaskStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// The keccak of the local task id, i.e. the 32-byte id the escrow
/// contract indexes by. Stored alongside the row so event demultiplexing
/// is an index lookup rather than a scan.
pub fn chain_id_of(task_id: &TaskId) -> Bytes32 {
    Bytes32::from_bytes(keccak256(task_id.as_bytes()))
}

/// Persistence seam for canonical task records. Rows are keyed by
/// `task_id` and indexed on status, deadline, and the keccak chain id.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn put(&self, task: Task) -> Result<()>;

    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>>;

    async fn get_by_chain_id(&self, chain_id: &Bytes32) -> Result<Option<Task>>;

    async fn get_by_status(&self, status: TaskStatus) -> Result<Vec<Task>>;

    /// Tasks with `deadline < now` still holding escrow
    /// (status in {Created, Authorized, Running}).
    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Task>>;

    async fn all(&self) -> Result<Vec<Task>>;

    /// Last chain block the lifecycle monitor fully processed.
    async fn load_block_cursor(&self) -> Result<Option<u64>>;

    async fn save_block_cursor(&self, block: u64) -> Result<()>;
}

/// In-memory store backing tests and single-process deployments.
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    chain_index: RwLock<HashMap<Bytes32, TaskId>>,
    block_cursor: RwLock<Option<u64>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            chain_index: RwLock::new(HashMap::new()),
            block_cursor: RwLock::new(None),
        }
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn put(&self, task: Task) -> Result<()> {
        let chain_id = chain_id_of(&task.task_id);
        self.chain_index.write().await.insert(chain_id, task.task_id);
        self.tasks.write().await.insert(task.task_id, task);
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn get_by_chain_id(&self, chain_id: &Bytes32) -> Result<Option<Task>> {
        let task_id = match self.chain_index.read().await.get(chain_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.tasks
            .read()
            .await
            .get(&task_id)
            .cloned()
            .map(Some)
            .ok_or_else(|| TaskError::Persistence("chain index points at missing row".to_string()))
    }

    async fn get_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.deadline < now && t.status.can_refund())
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn load_block_cursor(&self) -> Result<Option<u64>> {
        Ok(*self.block_cursor.read().await)
    }

    async fn save_block_cursor(&self, block: u64) -> Result<()> {
        *self.block_cursor.write().await = Some(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use econos_types::{TaskType, Wei};
    use std::collections::BTreeSet;

    fn task_with_status(id: u8, status: TaskStatus, deadline_offset_secs: i64) -> Task {
        let now = Utc::now();
        Task {
            task_id: TaskId::from_bytes([id; 32]),
            task_type: TaskType::SummaryGeneration,
            input_parameters: serde_json::json!({"text": "t"}),
            required_capabilities: BTreeSet::new(),
            deadline: now + Duration::seconds(deadline_offset_secs),
            budget: Wei::from_wei(1_000),
            status,
            assigned_worker: None,
            escrow_tx_hash: None,
            result_hash: None,
            authorization: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_chain_id_lookup() {
        let store = MemoryTaskStore::new();
        let task = task_with_status(1, TaskStatus::Pending, 3_600);
        let chain_id = chain_id_of(&task.task_id);
        store.put(task.clone()).await.unwrap();

        let found = store.get_by_chain_id(&chain_id).await.unwrap().unwrap();
        assert_eq!(found.task_id, task.task_id);

        let missing = store
            .get_by_chain_id(&Bytes32::from_bytes([0xff; 32]))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_expired_query_respects_status_set() {
        let store = MemoryTaskStore::new();
        // Expired and escrowed: must be returned.
        store.put(task_with_status(1, TaskStatus::Created, -60)).await.unwrap();
        store.put(task_with_status(2, TaskStatus::Running, -60)).await.unwrap();
        // Expired but pending or terminal: must not.
        store.put(task_with_status(3, TaskStatus::Pending, -60)).await.unwrap();
        store.put(task_with_status(4, TaskStatus::Refunded, -60)).await.unwrap();
        // Escrowed but not yet expired.
        store.put(task_with_status(5, TaskStatus::Authorized, 60)).await.unwrap();

        let expired = store.get_expired(Utc::now()).await.unwrap();
        let mut ids: Vec<u8> = expired.iter().map(|t| t.task_id.as_bytes()[0]).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_block_cursor_round_trip() {
        let store = MemoryTaskStore::new();
        assert_eq!(store.load_block_cursor().await.unwrap(), None);
        store.save_block_cursor(42).await.unwrap();
        assert_eq!(store.load_block_cursor().await.unwrap(), Some(42));
    }
}

//! In-memory chain gateway used by tests across the workspace.

use crate::error::{ChainError, Result};
use crate::events::ChainEvent;
use crate::gateway::{ChainGateway, OnChainTask, TxReceipt};
use async_trait::async_trait;
use econos_types::{Address, Bytes32, Wei};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};

/// Deterministic in-memory escrow + registry. Deposits and refunds mutate
/// the task map and emit the same events the real contract would.
pub struct MockChainGateway {
    master: Address,
    tasks: RwLock<HashMap<Bytes32, OnChainTask>>,
    workers: RwLock<HashMap<Address, (bool, u8)>>,
    events_tx: broadcast::Sender<ChainEvent>,
    block_height: AtomicU64,
    fail_refunds: AtomicBool,
    deposit_count: AtomicU64,
    refund_count: AtomicU64,
}

impl MockChainGateway {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            master: Address::from_bytes([0x4d; 20]),
            tasks: RwLock::new(HashMap::new()),
            workers: RwLock::new(HashMap::new()),
            events_tx,
            block_height: AtomicU64::new(1),
            fail_refunds: AtomicBool::new(false),
            deposit_count: AtomicU64::new(0),
            refund_count: AtomicU64::new(0),
        }
    }

    pub fn master_address(&self) -> Address {
        self.master
    }

    /// Seed a registry entry.
    pub async fn register_worker(&self, worker: Address, active: bool, reputation: u8) {
        self.workers.write().await.insert(worker, (active, reputation));
    }

    /// Make every subsequent refund fail with `ChainUnavailable`.
    pub fn set_fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    pub fn deposit_count(&self) -> u64 {
        self.deposit_count.load(Ordering::SeqCst)
    }

    pub fn refund_count(&self) -> u64 {
        self.refund_count.load(Ordering::SeqCst)
    }

    fn next_block(&self) -> u64 {
        self.block_height.fetch_add(1, Ordering::SeqCst)
    }

    /// Simulate the worker submitting its result on chain.
    pub async fn complete_task(&self, task_id: Bytes32, result_hash: Bytes32) {
        if let Some(task) = self.tasks.write().await.get_mut(&task_id) {
            task.status = 1;
        }
        let _ = self.events_tx.send(ChainEvent::TaskCompleted {
            task_id,
            result_hash,
            block_number: self.next_block(),
            log_index: 0,
        });
    }
}

impl Default for MockChainGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainGateway for MockChainGateway {
    async fn get_task(&self, task_id: Bytes32) -> Result<Option<OnChainTask>> {
        Ok(self.tasks.read().await.get(&task_id).cloned())
    }

    async fn deposit_task(
        &self,
        task_id: Bytes32,
        worker: Address,
        duration_secs: u64,
        amount: Wei,
    ) -> Result<TxReceipt> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task_id) {
            return Err(ChainError::TaskAlreadyDeposited(task_id.to_hex()));
        }

        let block_number = self.next_block();
        tasks.insert(
            task_id,
            OnChainTask {
                master: self.master,
                worker,
                amount,
                deadline: block_number + duration_secs,
                status: 0,
            },
        );
        drop(tasks);

        self.deposit_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.events_tx.send(ChainEvent::TaskCreated {
            task_id,
            master: self.master,
            worker,
            amount,
            block_number,
            log_index: 0,
        });

        Ok(TxReceipt {
            tx_hash: tx_hash_for(task_id, block_number),
            block_number,
            success: true,
            confirmations: 2,
        })
    }

    async fn refund_and_slash(&self, task_id: Bytes32) -> Result<TxReceipt> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(ChainError::ChainUnavailable("refund disabled".to_string()));
        }

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| ChainError::TxReverted(format!("unknown task {}", task_id)))?;
        task.status = 3;
        drop(tasks);

        self.refund_count.fetch_add(1, Ordering::SeqCst);
        let block_number = self.next_block();
        let _ = self.events_tx.send(ChainEvent::TaskRefunded {
            task_id,
            block_number,
            log_index: 0,
        });

        Ok(TxReceipt {
            tx_hash: tx_hash_for(task_id, block_number),
            block_number,
            success: true,
            confirmations: 2,
        })
    }

    async fn is_worker_active(&self, worker: Address) -> Result<bool> {
        Ok(self
            .workers
            .read()
            .await
            .get(&worker)
            .map(|(active, _)| *active)
            .unwrap_or(false))
    }

    async fn worker_reputation(&self, worker: Address) -> Result<u8> {
        Ok(self
            .workers
            .read()
            .await
            .get(&worker)
            .map(|(_, rep)| *rep)
            .unwrap_or(0))
    }

    fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events_tx.subscribe()
    }
}

fn tx_hash_for(task_id: Bytes32, block_number: u64) -> Bytes32 {
    let mut seed = Vec::with_capacity(40);
    seed.extend_from_slice(task_id.as_bytes());
    seed.extend_from_slice(&block_number.to_be_bytes());
    Bytes32::from_bytes(econos_crypto::keccak256(&seed))
}

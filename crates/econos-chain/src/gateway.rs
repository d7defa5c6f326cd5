use crate::error::Result;
use crate::events::ChainEvent;
use async_trait::async_trait;
use econos_types::{Address, Bytes32, Wei};
use tokio::sync::broadcast;

/// Escrow record as stored on chain. Status codes: 0 CREATED, 1 COMPLETED,
/// 2 DISPUTED, 3 REFUNDED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainTask {
    pub master: Address,
    pub worker: Address,
    pub amount: Wei,
    pub deadline: u64,
    pub status: u8,
}

/// Write receipt returned once the confirmation gate passes.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: Bytes32,
    pub block_number: u64,
    pub success: bool,
    pub confirmations: u64,
}

/// Typed access to the escrow and registry contracts. The production
/// implementation is `RpcChainGateway`; tests run against the in-memory
/// gateway in `test_helpers`.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Fetch the escrow record, `None` when no deposit exists.
    async fn get_task(&self, task_id: Bytes32) -> Result<Option<OnChainTask>>;

    /// Deposit `amount` for `(task_id, worker)` with the given duration.
    /// Fails fast when a record already exists for `task_id`.
    async fn deposit_task(
        &self,
        task_id: Bytes32,
        worker: Address,
        duration_secs: u64,
        amount: Wei,
    ) -> Result<TxReceipt>;

    /// Reclaim escrowed funds and slash the worker's registry reputation.
    async fn refund_and_slash(&self, task_id: Bytes32) -> Result<TxReceipt>;

    async fn is_worker_active(&self, worker: Address) -> Result<bool>;

    /// Registry reputation score clamped to 0..=100.
    async fn worker_reputation(&self, worker: Address) -> Result<u8>;

    /// Subscribe to the decoded escrow event stream. Events for a given
    /// task arrive in chain order.
    fn subscribe(&self) -> broadcast::Receiver<ChainEvent>;
}

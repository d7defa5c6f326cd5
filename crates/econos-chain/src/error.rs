use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),

    #[error("Transaction reverted: {0}")]
    TxReverted(String),

    #[error("Insufficient confirmations: required {required}, got {actual}")]
    InsufficientConfirmations { required: u64, actual: u64 },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("Task already deposited on chain: {0}")]
    TaskAlreadyDeposited(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
}

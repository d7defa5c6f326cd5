use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarketError>;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Manifest unavailable from {endpoint}: {reason}")]
    ManifestUnavailable { endpoint: String, reason: String },

    #[error("No worker currently offers service: {0}")]
    NoWorkerForService(String),

    #[error("Chain error: {0}")]
    Chain(#[from] econos_chain::ChainError),
}

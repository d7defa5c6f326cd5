use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Nonce already used for task {task_id}: {nonce}")]
    NonceReused { task_id: String, nonce: u64 },

    #[error("Authorization expired at {expires_at}")]
    AuthorizationExpired { expires_at: i64 },

    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Validity window is empty: task deadline already passed")]
    EmptyValidityWindow,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

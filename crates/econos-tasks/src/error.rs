use econos_types::TaskStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskError>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Unsupported task type: {0}")]
    UnsupportedTaskType(String),

    #[error("Schema violation on '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },

    #[error("Budget must be positive")]
    InvalidBudget,

    #[error("Duration {secs}s out of range {min}..={max}")]
    DurationOutOfRange { secs: u64, min: u64, max: u64 },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Escrow tx hash already backs another task: {0}")]
    PaymentReplay(String),

    #[error("Escrow must be recorded before authorization: {0}")]
    EscrowNotRecorded(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

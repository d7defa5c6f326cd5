use econos_types::Wei;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No worker currently offers service: {0}")]
    NoWorkerForService(String),

    #[error("Estimated budget {estimate} wei exceeds maximum {max} wei")]
    BudgetExceeded { estimate: Wei, max: Wei },

    #[error("No eligible worker for task")]
    NoEligibleWorker,

    #[error("Worker rejected dispatch with HTTP {0}")]
    DispatchFailed(u16),

    #[error("Result fetch failed: {0}")]
    ResultFetchFailed(String),

    #[error("Worker unreachable: {0}")]
    WorkerUnreachable(String),

    #[error("Proof never arrived before the task deadline: {0}")]
    ProofTimeout(String),

    #[error("Task deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Request analysis failed: {0}")]
    Analyzer(String),

    #[error(transparent)]
    Task(#[from] econos_tasks::TaskError),

    #[error(transparent)]
    Chain(#[from] econos_chain::ChainError),

    #[error(transparent)]
    Auth(#[from] econos_crypto::AuthError),

    #[error(transparent)]
    Market(#[from] econos_market::MarketError),
}

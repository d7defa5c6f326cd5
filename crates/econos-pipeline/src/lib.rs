//! Pipeline planning, lifecycle monitoring and orchestration.
//!
//! The planner turns a free-form request into a typed DAG of steps bound
//! to concrete worker offers. The orchestrator drives each step through
//! escrow, authorization, dispatch and completion. The lifecycle monitor
//! runs beside both, consuming the chain event stream and sweeping
//! expired deadlines.

pub mod analyzer;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod planner;
pub mod types;
pub mod worker_client;

pub use analyzer::{KeywordAnalyzer, RequestAnalyzer};
pub use error::{PipelineError, Result};
pub use monitor::{LifecycleEvent, LifecycleMonitor, MonitorConfig};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use planner::{PipelinePlanner, PlanOptions};
pub use types::{
    AnalyzedStep, ExecutionPlan, InputMapping, InputSource, MergeSource, PipelineExecutionResult,
    PlanStep, RequestAnalysis, StepResult, StepStatus,
};
pub use worker_client::{HttpWorkerClient, WorkerProof, WorkerTransport};

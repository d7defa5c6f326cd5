//! Plan, step and result shapes.

use econos_types::{Address, Bytes32, TaskId, TaskType, Wei};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a step's effective input parameters are derived at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InputMapping {
    /// Literal parameters, known at planning time.
    Direct { literal: Value },
    /// The (optionally projected) result of an earlier step.
    FromPrevious {
        source_step_id: String,
        field: Option<String>,
    },
    /// Prior result forwarded together with a transformation instruction
    /// the worker applies.
    Transform { instruction: String },
    /// Shallow merge of fields drawn from several earlier steps.
    Merge { sources: Vec<MergeSource> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSource {
    pub step_id: String,
    pub field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One node of the execution DAG, bound to a concrete worker offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_id: String,
    /// Topological position; strictly increasing within a plan.
    pub order: u32,
    pub service_type: TaskType,
    pub description: String,
    pub input_mapping: InputMapping,
    pub assigned_worker: Option<Address>,
    pub worker_endpoint: Option<String>,
    /// Offer price at planning time; summed into the estimate.
    pub price: Wei,
    /// Requested escrow duration; the orchestrator's default applies when
    /// unset.
    pub duration_secs: Option<u64>,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: String,
    pub steps: Vec<PlanStep>,
    pub estimated_budget: Wei,
    pub reasoning: String,
}

impl ExecutionPlan {
    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }
}

/// Where an analyzed step draws its input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputSource {
    User,
    Previous,
}

/// One step as proposed by the request analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedStep {
    pub order: u32,
    pub service_type: TaskType,
    pub description: String,
    pub input_source: InputSource,
    pub input_field: Option<String>,
}

/// Output contract of the pluggable request analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAnalysis {
    pub is_single_agent: bool,
    pub steps: Vec<AnalyzedStep>,
    pub reasoning: String,
    pub confidence: f64,
}

/// Per-step outcome of a pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub task_id: Option<TaskId>,
    pub status: StepStatus,
    pub result: Option<Value>,
    pub result_hash: Option<Bytes32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecutionResult {
    pub plan_id: String,
    pub success: bool,
    pub steps: Vec<StepResult>,
    /// The last completed step's result by default.
    pub final_result: Option<Value>,
}

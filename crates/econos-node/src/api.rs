//! Orchestrator HTTP surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use econos_market::CapabilityIndex;
use econos_pipeline::{Orchestrator, PipelineError, PipelinePlanner, PlanOptions};
use econos_tasks::{TaskManager, TaskStore};
use econos_types::{TaskId, TaskStatus, TaskType, Wei};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub struct AppState {
    pub planner: Arc<PipelinePlanner>,
    pub orchestrator: Arc<Orchestrator>,
    pub tasks: Arc<TaskManager>,
    pub index: Arc<CapabilityIndex>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/capabilities", get(capabilities))
        .route("/hire", post(hire))
        .route("/chat", post(chat))
        .route("/tasks", get(list_tasks))
        .route("/tasks/:task_id", get(get_task))
        .with_state(state)
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match &e {
            PipelineError::BudgetExceeded { .. }
            | PipelineError::InvalidPlan(_)
            | PipelineError::Task(_) => StatusCode::BAD_REQUEST,
            PipelineError::NoWorkerForService(_) | PipelineError::NoEligibleWorker => {
                StatusCode::CONFLICT
            }
            PipelineError::Chain(_)
            | PipelineError::DispatchFailed(_)
            | PipelineError::WorkerUnreachable(_)
            | PipelineError::ResultFetchFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now().timestamp() }))
}

async fn capabilities(State(state): State<Arc<AppState>>) -> Json<Value> {
    let summary = state.index.discover().await;
    Json(json!({ "success": true, "capabilities": summary }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HireRequest {
    task_type: String,
    params: Value,
    budget_ether: Option<f64>,
    duration_secs: Option<u64>,
}

/// `POST /hire`: explicit task type, planner builds a single-step plan.
async fn hire(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HireRequest>,
) -> Result<Json<Value>, ApiError> {
    let task_type = TaskType::from_label(&request.task_type)
        .map_err(|e| bad_request(e.to_string()))?;
    let options = PlanOptions {
        max_budget: request.budget_ether.map(Wei::from_ether),
        duration_secs: request.duration_secs,
    };

    info!(task_type = %task_type, "📡 Hire request received");
    let plan = state
        .planner
        .plan_direct(task_type, request.params, &options)
        .await?;
    let result = state.orchestrator.execute(&plan).await;

    Ok(Json(json!({ "success": result.success, "execution": result })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    max_budget_ether: Option<f64>,
}

/// `POST /chat`: free-form request, analyzer-driven multi-step plan.
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let options = PlanOptions {
        max_budget: request.max_budget_ether.map(Wei::from_ether),
        duration_secs: None,
    };

    info!("📡 Chat request received");
    let plan = state.planner.plan(&request.message, &options).await?;
    let result = state.orchestrator.execute(&plan).await;

    Ok(Json(json!({
        "success": result.success,
        "plan": plan,
        "execution": result,
    })))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task_id = TaskId::from_hex(&task_id).map_err(|e| bad_request(e.to_string()))?;
    match state.tasks.get(&task_id).await {
        Ok(task) => Ok(Json(json!({ "success": true, "task": task }))),
        Err(_) => Err(ApiError {
            status: StatusCode::NOT_FOUND,
            message: format!("task {} not found", task_id),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    status: Option<String>,
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Value>, ApiError> {
    let tasks = match query.status.as_deref() {
        Some(raw) => {
            let status = parse_status(raw).ok_or_else(|| bad_request("unknown status filter"))?;
            state
                .tasks
                .get_by_status(status)
                .await
                .map_err(|e| bad_request(e.to_string()))?
        }
        None => state
            .tasks
            .store()
            .all()
            .await
            .map_err(|e| bad_request(e.to_string()))?,
    };

    Ok(Json(json!({ "success": true, "count": tasks.len(), "tasks": tasks })))
}

fn parse_status(raw: &str) -> Option<TaskStatus> {
    match raw {
        "pending" => Some(TaskStatus::Pending),
        "created" => Some(TaskStatus::Created),
        "authorized" => Some(TaskStatus::Authorized),
        "running" => Some(TaskStatus::Running),
        "completed" => Some(TaskStatus::Completed),
        "refunded" => Some(TaskStatus::Refunded),
        "failed" => Some(TaskStatus::Failed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_round_trips_display() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Created,
            TaskStatus::Authorized,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Refunded,
            TaskStatus::Failed,
        ] {
            assert_eq!(parse_status(&status.to_string()), Some(status));
        }
        assert_eq!(parse_status("disputed"), None);
    }
}

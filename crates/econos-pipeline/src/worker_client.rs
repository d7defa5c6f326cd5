//! Worker sidecar HTTP client (`/authorize`, `/proof`, `/result`).

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use econos_crypto::SignedAuthorization;
use econos_types::{Bytes32, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Worker-signed execution proof, as returned by `GET /proof/:taskId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerProof {
    pub result_hash: Bytes32,
    /// Raw-message signature over `keccak(taskId || resultHash)`; a
    /// different signing context from typed-data authorizations.
    pub signature: String,
}

/// Transport seam to the worker sidecar. The HTTP implementation is the
/// production path; tests substitute an in-memory worker.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// `POST {endpoint}/authorize/{taskId}`. 2xx means the worker accepted
    /// the authorization and will execute.
    async fn authorize(
        &self,
        endpoint: &str,
        task_id: &TaskId,
        params: &Value,
        authorization: &SignedAuthorization,
        timeout: Duration,
    ) -> Result<()>;

    /// `GET {endpoint}/proof/{taskId}`. `None` while the worker is still
    /// executing.
    async fn fetch_proof(
        &self,
        endpoint: &str,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<Option<WorkerProof>>;

    /// `GET {endpoint}/result/{taskId}`.
    async fn fetch_result(
        &self,
        endpoint: &str,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<Value>;
}

pub struct HttpWorkerClient {
    http: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpWorkerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ProofResponse {
    success: bool,
    proof: Option<WorkerProof>,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    success: bool,
    data: Option<Value>,
}

#[async_trait]
impl WorkerTransport for HttpWorkerClient {
    async fn authorize(
        &self,
        endpoint: &str,
        task_id: &TaskId,
        params: &Value,
        authorization: &SignedAuthorization,
        timeout: Duration,
    ) -> Result<()> {
        let url = format!("{}/authorize/{}", endpoint.trim_end_matches('/'), task_id.to_hex());
        let body = json!({
            "payload": { "params": params },
            "authorization": authorization,
        });

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::WorkerUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::DispatchFailed(status.as_u16()));
        }
        debug!(task_id = task_id.short(), %url, "Worker accepted authorization");
        Ok(())
    }

    async fn fetch_proof(
        &self,
        endpoint: &str,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<Option<WorkerProof>> {
        let url = format!("{}/proof/{}", endpoint.trim_end_matches('/'), task_id.to_hex());
        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PipelineError::WorkerUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }
        let parsed: ProofResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::WorkerUnreachable(e.to_string()))?;

        Ok(if parsed.success { parsed.proof } else { None })
    }

    async fn fetch_result(
        &self,
        endpoint: &str,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<Value> {
        let url = format!("{}/result/{}", endpoint.trim_end_matches('/'), task_id.to_hex());
        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PipelineError::ResultFetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::ResultFetchFailed(format!("HTTP {}", status)));
        }

        let parsed: ResultResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ResultFetchFailed(e.to_string()))?;

        match (parsed.success, parsed.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(PipelineError::ResultFetchFailed(
                "worker reported no result data".to_string(),
            )),
        }
    }
}

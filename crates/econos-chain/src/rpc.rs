//! JSON-RPC transport with bounded retry.
//!
//! Transient failures (connect errors, timeouts, HTTP 5xx, JSON-RPC server
//! errors) are retried with exponential backoff and jitter up to five
//! attempts; anything else surfaces immediately.

use crate::error::{ChainError, Result};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_MAX_MS: u64 = 8_000;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl JsonRpcClient {
    pub fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            next_id: AtomicU64::new(1),
            request_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let mut last_error = String::new();

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = backoff_with_jitter(attempt);
                debug!(method, attempt, backoff_ms = backoff.as_millis() as u64, "🔄 RPC retry");
                tokio::time::sleep(backoff).await;
            }

            match self.call_once(method, params.clone()).await {
                Ok(value) => {
                    return serde_json::from_value(value)
                        .map_err(|e| ChainError::Decode(format!("{}: {}", method, e)));
                }
                Err(Retryable::No(err)) => return Err(err),
                Err(Retryable::Yes(msg)) => {
                    warn!(method, attempt, error = %msg, "⚠️ Transient RPC failure");
                    last_error = msg;
                }
            }
        }

        Err(ChainError::ChainUnavailable(format!(
            "{} failed after {} attempts: {}",
            method, MAX_ATTEMPTS, last_error
        )))
    }

    async fn call_once(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, Retryable> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Retryable::Yes(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Retryable::Yes(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(Retryable::No(ChainError::Rpc(format!("HTTP {}", status))));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| Retryable::Yes(e.to_string()))?;

        if let Some(err) = parsed.error {
            // -32000..=-32099 are node-side transient conditions
            // (header not found, request limit, ...).
            if (-32099..=-32000).contains(&err.code) {
                return Err(Retryable::Yes(format!("{} ({})", err.message, err.code)));
            }
            return Err(Retryable::No(ChainError::Rpc(format!(
                "{} ({})",
                err.message, err.code
            ))));
        }

        // A JSON `null` result (e.g. a receipt that is not mined yet)
        // deserializes as None; surface it as Value::Null so typed
        // callers expecting Option<T> see a clean miss.
        Ok(parsed.result.unwrap_or(Value::Null))
    }
}

enum Retryable {
    Yes(String),
    No(ChainError),
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(6));
    let jitter = rand::thread_rng().gen_range(0..=base / 2);
    Duration::from_millis((base + jitter).min(BACKOFF_MAX_MS))
}

/// Parse a 0x-prefixed JSON-RPC quantity.
pub fn parse_quantity(s: &str) -> Result<u128> {
    u128::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity {}: {}", s, e)))
}

/// Parse 0x-prefixed JSON-RPC binary data.
pub fn parse_data(s: &str) -> Result<Vec<u8>> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| ChainError::Decode(format!("bad data: {}", e)))
}

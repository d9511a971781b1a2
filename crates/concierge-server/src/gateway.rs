use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use concierge_config::Config;
use concierge_contracts::{
    BookingCommitRequest, BookingCommitResponse, ErrorBody, ErrorResponse, IntentRequest,
    IntentResponse, SessionStatus,
};
use concierge_kernel::{classify_commit_rejection, classify_commit_response, CommitOutcome};
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("upstream returned http {status}")]
    Http { status: u16 },
    #[error("upstream rejected the call with http {status}")]
    Rejected {
        status: u16,
        error: Option<ErrorBody>,
    },
    #[error("contract error: {0}")]
    Contract(String),
    #[error("circuit open")]
    CircuitOpen,
}

impl GatewayError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            GatewayError::Transport(_) => "gateway_transport_error",
            GatewayError::Timeout => "gateway_timeout",
            GatewayError::Http { .. } => "gateway_http_error",
            GatewayError::Rejected { .. } => "gateway_rejected",
            GatewayError::Contract(_) => "gateway_contract_error",
            GatewayError::CircuitOpen => "gateway_circuit_open",
        }
    }
}

/// Single call contract for every external effect.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn invoke(&self, operation: &str, payload: Value) -> Result<Value, GatewayError>;
}

pub struct HttpGateway {
    endpoint: String,
    api_token: Option<String>,
    retry_max_attempts: usize,
    retry_backoff: Duration,
    circuit_breaker_failures: u64,
    circuit_breaker_open: Duration,
    failure_streak: Mutex<u64>,
    circuit_open_until: Mutex<Option<Instant>>,
    client: Client,
}

impl HttpGateway {
    pub fn new(cfg: &Config) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.gateway.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            endpoint: cfg.gateway.endpoint.trim_end_matches('/').to_string(),
            api_token: cfg
                .gateway
                .api_token
                .clone()
                .filter(|v| !v.trim().is_empty()),
            retry_max_attempts: cfg.gateway.retry_max_attempts.max(1),
            retry_backoff: Duration::from_millis(cfg.gateway.retry_backoff_ms),
            circuit_breaker_failures: cfg.gateway.circuit_breaker_failures.max(1),
            circuit_breaker_open: Duration::from_millis(cfg.gateway.circuit_breaker_open_ms.max(1)),
            failure_streak: Mutex::new(0),
            circuit_open_until: Mutex::new(None),
            client,
        })
    }

    async fn attempt(&self, url: &str, payload: &Value) -> Attempt {
        let mut request = self.client.post(url).json(payload);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        let response = match request.send().await {
            Ok(v) => v,
            Err(e) if e.is_timeout() => return Attempt::Retry(GatewayError::Timeout),
            Err(e) => return Attempt::Retry(GatewayError::Transport(e.to_string())),
        };

        let status = response.status();
        if status.is_server_error() {
            return Attempt::Retry(GatewayError::Http {
                status: status.as_u16(),
            });
        }
        if status.is_client_error() {
            let error = response.json::<ErrorResponse>().await.ok().map(|r| r.error);
            return Attempt::Rejected(GatewayError::Rejected {
                status: status.as_u16(),
                error,
            });
        }
        match response.json::<Value>().await {
            Ok(body) => Attempt::Done(unwrap_data_envelope(body)),
            Err(e) => Attempt::Fatal(GatewayError::Contract(e.to_string())),
        }
    }

    async fn record_failure(&self) {
        let mut streak = self.failure_streak.lock().await;
        *streak += 1;
        if *streak >= self.circuit_breaker_failures {
            let mut open_until = self.circuit_open_until.lock().await;
            *open_until = Some(Instant::now() + self.circuit_breaker_open);
            tracing::warn!(failures = *streak, "gateway circuit opened");
        }
    }

    async fn record_success(&self) {
        let mut streak = self.failure_streak.lock().await;
        *streak = 0;
        let mut open_until = self.circuit_open_until.lock().await;
        *open_until = None;
    }
}

enum Attempt {
    Done(Value),
    Retry(GatewayError),
    Rejected(GatewayError),
    Fatal(GatewayError),
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn invoke(&self, operation: &str, payload: Value) -> Result<Value, GatewayError> {
        {
            let open_until = self.circuit_open_until.lock().await;
            if let Some(until) = *open_until {
                if until > Instant::now() {
                    return Err(GatewayError::CircuitOpen);
                }
            }
        }

        let url = format!("{}/{}", self.endpoint, operation);
        let mut last_failure = GatewayError::Transport("no attempt made".to_string());
        for attempt in 0..self.retry_max_attempts {
            tracing::debug!(operation, attempt, "gateway dispatch");
            match self.attempt(&url, &payload).await {
                Attempt::Done(value) => {
                    self.record_success().await;
                    return Ok(value);
                }
                Attempt::Rejected(err) => {
                    self.record_success().await;
                    return Err(err);
                }
                Attempt::Fatal(err) => {
                    last_failure = err;
                    break;
                }
                Attempt::Retry(err) => {
                    tracing::warn!(operation, attempt, error = %err, "gateway attempt failed");
                    last_failure = err;
                    if attempt + 1 < self.retry_max_attempts && self.retry_backoff > Duration::ZERO
                    {
                        sleep(self.retry_backoff).await;
                    }
                }
            }
        }

        self.record_failure().await;
        Err(last_failure)
    }
}

/// Function hosts commonly answer `{"data": ...}`; a lone `data` key is
/// unwrapped, anything else is returned as is.
fn unwrap_data_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Typed operations over a [`Gateway`].
#[derive(Clone)]
pub struct BookingGateway {
    inner: Arc<dyn Gateway>,
    intent_operation: String,
    commit_operation: String,
    status_operation: String,
}

impl BookingGateway {
    pub fn new(inner: Arc<dyn Gateway>, cfg: &Config) -> Self {
        Self {
            inner,
            intent_operation: cfg.gateway.intent_operation.clone(),
            commit_operation: cfg.gateway.commit_operation.clone(),
            status_operation: cfg.gateway.status_operation.clone(),
        }
    }

    pub async fn resolve_intent(
        &self,
        request: &IntentRequest,
    ) -> Result<IntentResponse, GatewayError> {
        let payload =
            serde_json::to_value(request).map_err(|e| GatewayError::Contract(e.to_string()))?;
        let value = self.inner.invoke(&self.intent_operation, payload).await?;
        serde_json::from_value(value).map_err(|e| GatewayError::Contract(e.to_string()))
    }

    pub async fn commit_booking(&self, request: &BookingCommitRequest) -> CommitOutcome {
        let payload = match serde_json::to_value(request) {
            Ok(v) => v,
            Err(e) => {
                return CommitOutcome::Failed {
                    reason: format!("commit_serialize_error: {e}"),
                }
            }
        };
        match self.inner.invoke(&self.commit_operation, payload).await {
            Ok(value) => match serde_json::from_value::<BookingCommitResponse>(value) {
                Ok(response) => classify_commit_response(&response),
                Err(_) => CommitOutcome::Failed {
                    reason: "commit_contract_error".to_string(),
                },
            },
            Err(GatewayError::Rejected { status, error }) => {
                classify_commit_rejection(Some(status), error.as_ref())
            }
            Err(err) => CommitOutcome::Failed {
                reason: err.reason_code().to_string(),
            },
        }
    }

    pub async fn session_status(&self) -> Result<SessionStatus, GatewayError> {
        let value = self.inner.invoke(&self.status_operation, json!({})).await?;
        serde_json::from_value(value).map_err(|e| GatewayError::Contract(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lone_data_key_is_unwrapped() {
        assert_eq!(
            unwrap_data_envelope(json!({"data": {"step": "READY"}})),
            json!({"step": "READY"})
        );
        assert_eq!(
            unwrap_data_envelope(json!({"data": 1, "meta": 2})),
            json!({"data": 1, "meta": 2})
        );
    }
}

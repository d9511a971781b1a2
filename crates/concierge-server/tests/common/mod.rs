#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use concierge_config::{Assistant, Config, Gateway as GatewayConfig, Observability, Server, Sessions};
use concierge_server::{Gateway, GatewayError};
use serde_json::{json, Value};
use tokio::sync::Notify;

pub const INTENT_OP: &str = "aiBookingAssistant";
pub const COMMIT_OP: &str = "squareCreateBooking";
pub const STATUS_OP: &str = "sessionStatus";

pub fn test_config(endpoint: &str) -> Config {
    Config {
        server: Server {
            listen_addr: "127.0.0.1:0".to_string(),
        },
        gateway: GatewayConfig {
            endpoint: endpoint.to_string(),
            api_token: None,
            timeout_ms: 2_000,
            retry_max_attempts: 1,
            retry_backoff_ms: 0,
            circuit_breaker_failures: 5,
            circuit_breaker_open_ms: 30_000,
            intent_operation: INTENT_OP.to_string(),
            commit_operation: COMMIT_OP.to_string(),
            status_operation: STATUS_OP.to_string(),
            require_ready: true,
        },
        assistant: Assistant {
            greeting: "Hi! How can I help?".to_string(),
        },
        sessions: Sessions {
            max_sessions: 16,
            idle_ttl_ms: 3_600_000,
        },
        observability: Observability {
            log_level: "debug".to_string(),
        },
    }
}

/// Holds one operation open until released, so tests can observe the
/// conversation while a call is in flight.
#[derive(Clone, Default)]
pub struct Hold {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// In-process gateway answering from per-operation scripts and recording
/// every invocation in order.
#[derive(Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<String, VecDeque<Result<Value, GatewayError>>>>,
    calls: Mutex<Vec<(String, Value)>>,
    holds: Mutex<HashMap<String, Hold>>,
}

impl ScriptedGateway {
    pub fn ready() -> Arc<Self> {
        let gateway = Self::default();
        gateway.push(STATUS_OP, Ok(json!({"step": "READY"})));
        Arc::new(gateway)
    }

    pub fn push(&self, operation: &str, response: Result<Value, GatewayError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn hold(&self, operation: &str) -> Hold {
        let hold = Hold::default();
        self.holds
            .lock()
            .unwrap()
            .insert(operation.to_string(), hold.clone());
        hold
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, payload)| payload)
            .collect()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn invoke(&self, operation: &str, payload: Value) -> Result<Value, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), payload));

        let hold = self.holds.lock().unwrap().remove(operation);
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }

        self.scripts
            .lock()
            .unwrap()
            .get_mut(operation)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(GatewayError::Transport(format!("no script for {operation}"))))
    }
}

pub fn availability_response() -> Value {
    json!({
        "text": "I have 10:00 tomorrow with Mia. Want it?",
        "intent": "show_availability",
        "available_slots": [
            {"start_at": "2024-06-01T10:00:00Z", "date": "Sat, Jun 1", "time": "10:00 AM", "team_member": "Mia"}
        ],
        "needs_confirmation": true,
        "service_variation_id": "svc-haircut"
    })
}

pub fn chat_response(text: &str) -> Value {
    json!({"text": text, "intent": "general_question"})
}

pub fn offered_slot() -> Value {
    json!({"start_at": "2024-06-01T10:00:00Z", "date": "Sat, Jun 1", "time": "10:00 AM", "team_member": "Mia"})
}

pub fn ann() -> Value {
    json!({"name": "Ann", "phone": "555-0100"})
}

mod gateway;
mod session;

pub use gateway::{BookingGateway, Gateway, GatewayError, HttpGateway};
pub use session::{Session, SessionError, SessionRegistry, SessionView};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use concierge_config::{Config, Observability};
use concierge_contracts::{
    contracts_manifest_v1, ContractsManifest, ReadinessStep, SelectSlotRequest, SubmitMessageRequest,
};
use concierge_kernel::ConversationError;
use serde_json::{json, Value};

type ApiError = (StatusCode, Json<Value>);

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    tracing::info!(%addr, "concierge listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub fn build_app(cfg: Config) -> Result<Router, String> {
    let gateway = Arc::new(HttpGateway::new(&cfg)?);
    Ok(build_app_with_gateway(cfg, gateway))
}

pub fn build_app_with_gateway(cfg: Config, gateway: Arc<dyn Gateway>) -> Router {
    let state = AppState::new(cfg, gateway);
    Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/contracts", get(contracts))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/{id}", get(get_session).delete(delete_session))
        .route("/v1/sessions/{id}/messages", post(submit_message))
        .route("/v1/sessions/{id}/slot-selection", post(select_slot))
        .route("/v1/sessions/{id}/cancel", post(cancel_pending))
        .with_state(state)
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
pub fn init_tracing(observability: &Observability) {
    let fallback_level = match observability.log_level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[derive(Clone)]
struct AppState {
    cfg: Arc<Config>,
    gateway: BookingGateway,
    sessions: Arc<SessionRegistry>,
}

impl AppState {
    fn new(cfg: Config, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway: BookingGateway::new(gateway, &cfg),
            sessions: Arc::new(SessionRegistry::new(
                cfg.sessions.max_sessions,
                Duration::from_millis(cfg.sessions.idle_ttl_ms),
            )),
            cfg: Arc::new(cfg),
        }
    }

    /// Reads readiness once; a failed read leaves booking gated.
    async fn open_session(&self) -> Result<Arc<Session>, SessionError> {
        let readiness = match self.gateway.session_status().await {
            Ok(status) => status.step,
            Err(err) => {
                tracing::warn!(error = %err, "readiness read failed");
                ReadinessStep::unknown()
            }
        };
        let booking_enabled = !self.cfg.gateway.require_ready || readiness.is_ready();
        let id = format!("sess_{}", uuid::Uuid::new_v4().as_simple());
        let session = Session::new(
            id,
            readiness,
            booking_enabled,
            &self.cfg.assistant.greeting,
            self.gateway.clone(),
        );
        let session = self.sessions.insert(session).await?;
        tracing::info!(session_id = %session.id(), booking_enabled, "session opened");
        Ok(session)
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn contracts() -> Json<ContractsManifest> {
    Json(contracts_manifest_v1())
}

async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let session = state.open_session().await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(session.view())))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.sessions.get(&id).await.map_err(api_error)?;
    Ok(Json(session.view()))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.sessions.remove(&id).await.map_err(api_error)?;
    tracing::info!(session_id = %id, "session closed");
    Ok(StatusCode::NO_CONTENT)
}

async fn submit_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SubmitMessageRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.sessions.get(&id).await.map_err(api_error)?;
    session
        .submit_user_message(&input.text)
        .await
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(session.view()))
}

async fn select_slot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SelectSlotRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.sessions.get(&id).await.map_err(api_error)?;
    session
        .select_slot(&input.slot, input.booking_details.as_ref())
        .await
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(session.view()))
}

async fn cancel_pending(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.sessions.get(&id).await.map_err(api_error)?;
    session.cancel_pending().map_err(|e| api_error(e.into()))?;
    Ok(Json(session.view()))
}

fn api_error(err: SessionError) -> ApiError {
    let (status, code) = match &err {
        SessionError::NotFound => (StatusCode::NOT_FOUND, "session.not_found"),
        SessionError::Capacity => (StatusCode::SERVICE_UNAVAILABLE, "session.capacity"),
        SessionError::Conversation(ConversationError::EmptyMessage) => {
            (StatusCode::BAD_REQUEST, "validation.empty_message")
        }
        SessionError::Conversation(ConversationError::Busy(_)) => {
            (StatusCode::CONFLICT, "conversation.busy")
        }
    };
    let details = match &err {
        SessionError::Conversation(ConversationError::Busy(op)) => {
            Some(json!({"in_flight": op.to_string()}))
        }
        _ => None,
    };
    let mut body = json!({"error": {"code": code, "message": err.to_string()}});
    if let Some(details) = details {
        body["error"]["details"] = details;
    }
    (status, Json(body))
}

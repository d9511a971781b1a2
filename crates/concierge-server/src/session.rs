use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use concierge_contracts::{BookingDetails, ConversationPhase, ReadinessStep, Slot, Turn};
use concierge_kernel::{
    CommitOutcome, CommitStep, Conversation, ConversationError, Operation, PendingBooking,
};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::gateway::BookingGateway;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session capacity reached")]
    Capacity,
    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub readiness: ReadinessStep,
    pub booking_enabled: bool,
    pub phase: ConversationPhase,
    pub turns: Vec<Turn>,
    pub pending_booking: Option<PendingBooking>,
}

/// One conversation: the dialogue orchestrator and booking committer over a
/// session-owned [`Conversation`]. The conversation lock is never held
/// across a gateway call.
pub struct Session {
    id: String,
    readiness: ReadinessStep,
    gateway: BookingGateway,
    conversation: Mutex<Conversation>,
    last_active: Mutex<Instant>,
}

impl Session {
    pub fn new(
        id: String,
        readiness: ReadinessStep,
        booking_enabled: bool,
        greeting: &str,
        gateway: BookingGateway,
    ) -> Self {
        let conversation = Conversation::new(id.clone(), greeting, booking_enabled, Utc::now());
        Self {
            id,
            readiness,
            gateway,
            conversation: Mutex::new(conversation),
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs one intent resolution. The gateway call and its ledger update run
    /// on a task owned by the session, so a caller that goes away does not
    /// lose the reply.
    pub async fn submit_user_message(
        self: &Arc<Self>,
        text: &str,
    ) -> Result<(), ConversationError> {
        let request = self.with_conversation(|c| c.begin_intent(text, Utc::now()))?;
        let session = Arc::clone(self);
        let call = tokio::spawn(async move {
            match session.gateway.resolve_intent(&request).await {
                Ok(response) => {
                    let intent =
                        session.with_conversation(|c| c.complete_intent(response, Utc::now()));
                    tracing::info!(session_id = %session.id, %intent, "intent resolved");
                }
                Err(err) => {
                    tracing::warn!(session_id = %session.id, error = %err, "intent resolution failed");
                    session.with_conversation(|c| c.fail_intent(Utc::now()));
                }
            }
        });
        self.settle(call, Operation::IntentResolution).await;
        Ok(())
    }

    pub async fn select_slot(
        self: &Arc<Self>,
        slot: &Slot,
        supplied: Option<&BookingDetails>,
    ) -> Result<(), ConversationError> {
        let request =
            match self.with_conversation(|c| c.begin_commit(slot, supplied, Utc::now()))? {
                CommitStep::Dispatch(request) => request,
                CommitStep::Declined(notice) => {
                    tracing::info!(session_id = %self.id, ?notice, "slot selection declined");
                    return Ok(());
                }
            };

        let session = Arc::clone(self);
        let call = tokio::spawn(async move {
            let outcome = session.gateway.commit_booking(&request).await;
            match &outcome {
                CommitOutcome::Confirmed { booking_id } => {
                    tracing::info!(session_id = %session.id, %booking_id, start_at = %request.start_at, "booking committed");
                }
                CommitOutcome::Conflict { reason } | CommitOutcome::Failed { reason } => {
                    tracing::warn!(session_id = %session.id, %reason, start_at = %request.start_at, "booking commit failed");
                }
            }
            session.with_conversation(|c| c.complete_commit(&outcome, Utc::now()));
        });
        self.settle(call, Operation::BookingCommit).await;
        Ok(())
    }

    pub fn cancel_pending(&self) -> Result<bool, ConversationError> {
        self.with_conversation(|c| c.cancel_pending(Utc::now()))
    }

    pub fn view(&self) -> SessionView {
        self.with_conversation(|c| SessionView {
            session_id: self.id.clone(),
            readiness: self.readiness.clone(),
            booking_enabled: c.booking_enabled(),
            phase: c.phase(),
            turns: c.ledger().turns().to_vec(),
            pending_booking: c.pending().cloned(),
        })
    }

    /// Waits for an in-flight call task. Only a task that died without
    /// recording its result leaves the flight slot to release here.
    async fn settle(&self, call: JoinHandle<()>, op: Operation) {
        if let Err(err) = call.await {
            tracing::error!(session_id = %self.id, %op, error = %err, "in-flight call task failed");
            self.with_conversation(|c| c.abandon(op));
        }
    }

    fn is_idle_since(&self, cutoff: Instant) -> bool {
        let last_active = *self
            .last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let busy = self
            .conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight()
            .is_some();
        !busy && last_active < cutoff
    }

    fn with_conversation<R>(&self, f: impl FnOnce(&mut Conversation) -> R) -> R {
        *self
            .last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
        let mut conversation = self
            .conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut conversation)
    }
}

pub struct SessionRegistry {
    sessions: tokio::sync::Mutex<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: tokio::sync::Mutex::new(HashMap::new()),
            max_sessions,
            idle_ttl,
        }
    }

    pub async fn insert(&self, session: Session) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(cutoff) = Instant::now().checked_sub(self.idle_ttl) {
            let before = sessions.len();
            sessions.retain(|_, s| !s.is_idle_since(cutoff));
            if sessions.len() < before {
                tracing::debug!(evicted = before - sessions.len(), "idle sessions evicted");
            }
        }
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::Capacity);
        }
        let session = Arc::new(session);
        sessions.insert(session.id().to_string(), session.clone());
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        let sessions = self.sessions.lock().await;
        sessions.get(id).cloned().ok_or(SessionError::NotFound)
    }

    pub async fn remove(&self, id: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .remove(id)
            .map(|_| ())
            .ok_or(SessionError::NotFound)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use concierge_contracts::{
    BookingCommitRequest, BookingDetails, ConversationPhase, IntentRequest, IntentResponse, Notice,
    Role, Slot,
};
use thiserror::Error;

use crate::booking::{commit_request, details_are_actionable, merge_details, CommitOutcome};
use crate::{replies, BookingContext, Intent, Ledger, PendingBooking};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    IntentResolution,
    BookingCommit,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::IntentResolution => "intent_resolution",
            Operation::BookingCommit => "booking_commit",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("message text must not be empty")]
    EmptyMessage,
    #[error("conversation is busy: {0} in flight")]
    Busy(Operation),
}

/// What a slot selection turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStep {
    /// Send this request; the conversation now awaits the commit response.
    Dispatch(BookingCommitRequest),
    /// No commit was attempted; a clarifying turn tagged with the notice was
    /// appended instead.
    Declined(Notice),
}

/// Session-scoped conversation state: the ledger, the pending booking and
/// the single-flight slot. At most one network call is outstanding at a
/// time; every `begin_*` that succeeds must be followed by exactly one
/// matching `complete_*`/`fail_*`, or by `abandon`.
#[derive(Debug, Clone)]
pub struct Conversation {
    session_id: String,
    ledger: Ledger,
    booking: BookingContext,
    in_flight: Option<Operation>,
    last_error: Option<Notice>,
    booking_enabled: bool,
}

impl Conversation {
    pub fn new(
        session_id: impl Into<String>,
        greeting: &str,
        booking_enabled: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let mut ledger = Ledger::new();
        ledger.append(Role::Assistant, greeting, now, None, None);
        Self {
            session_id: session_id.into(),
            ledger,
            booking: BookingContext::default(),
            in_flight: None,
            last_error: None,
            booking_enabled,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn pending(&self) -> Option<&PendingBooking> {
        self.booking.pending()
    }

    pub fn in_flight(&self) -> Option<Operation> {
        self.in_flight
    }

    pub fn booking_enabled(&self) -> bool {
        self.booking_enabled
    }

    pub fn phase(&self) -> ConversationPhase {
        match (self.in_flight, self.booking.pending()) {
            (Some(Operation::IntentResolution), _) => ConversationPhase::AwaitingIntentResponse,
            (Some(Operation::BookingCommit), _) => ConversationPhase::AwaitingCommitResponse,
            (None, Some(_)) => ConversationPhase::AwaitingSlotSelection {
                last_error: self.last_error,
            },
            (None, None) => ConversationPhase::Idle,
        }
    }

    /// Appends the user turn and returns the intent request to send.
    pub fn begin_intent(
        &mut self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<IntentRequest, ConversationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }
        self.ensure_idle()?;

        let seq = self
            .ledger
            .append(Role::User, text, now, None, None)
            .seq;
        self.in_flight = Some(Operation::IntentResolution);
        Ok(IntentRequest {
            user_message: text.to_string(),
            conversation_history: self.ledger.history_before(seq),
        })
    }

    pub fn complete_intent(&mut self, response: IntentResponse, now: DateTime<Utc>) -> Intent {
        self.release(Operation::IntentResolution);
        let intent = Intent::parse(&response.intent);
        let seq = self.ledger.len() as u64;
        if intent.awaits_slot_selection() {
            self.booking.propose(&response, seq);
        } else {
            self.booking.clear();
        }
        self.last_error = None;
        let text = response.text.clone();
        self.ledger.append(Role::Assistant, text, now, Some(response), None);
        intent
    }

    /// Classification failed; the pending booking is left as it was.
    pub fn fail_intent(&mut self, now: DateTime<Utc>) {
        self.release(Operation::IntentResolution);
        self.push_notice(Notice::ClassificationFailure, now);
    }

    pub fn begin_commit(
        &mut self,
        slot: &Slot,
        supplied: Option<&BookingDetails>,
        now: DateTime<Utc>,
    ) -> Result<CommitStep, ConversationError> {
        self.ensure_idle()?;

        let step = match self.commit_precheck(slot, supplied) {
            Ok(request) => CommitStep::Dispatch(request),
            Err(notice) => CommitStep::Declined(notice),
        };
        match &step {
            CommitStep::Dispatch(_) => self.in_flight = Some(Operation::BookingCommit),
            CommitStep::Declined(notice) => {
                if self.booking.pending().is_some() {
                    self.last_error = Some(*notice);
                }
                self.push_notice(*notice, now);
            }
        }
        Ok(step)
    }

    /// Records the commit result. Success clears the pending booking; any
    /// failure keeps it so the user can retry.
    pub fn complete_commit(&mut self, outcome: &CommitOutcome, now: DateTime<Utc>) -> Notice {
        self.release(Operation::BookingCommit);
        let notice = match outcome {
            CommitOutcome::Confirmed { .. } => {
                self.booking.clear();
                self.last_error = None;
                Notice::BookingConfirmed
            }
            CommitOutcome::Conflict { .. } => Notice::CommitConflict,
            CommitOutcome::Failed { .. } => Notice::CommitFailure,
        };
        if notice != Notice::BookingConfirmed {
            self.last_error = Some(notice);
        }
        self.push_notice(notice, now);
        notice
    }

    /// Drops the pending booking on explicit user request. Returns whether
    /// anything was cleared.
    pub fn cancel_pending(&mut self, now: DateTime<Utc>) -> Result<bool, ConversationError> {
        self.ensure_idle()?;
        if self.booking.clear().is_none() {
            return Ok(false);
        }
        self.last_error = None;
        self.push_notice(Notice::BookingCancelled, now);
        Ok(true)
    }

    /// Releases the flight slot for an operation whose driver died before
    /// recording a response. Nothing is appended.
    pub fn abandon(&mut self, op: Operation) {
        self.release(op);
    }

    fn commit_precheck(
        &self,
        slot: &Slot,
        supplied: Option<&BookingDetails>,
    ) -> Result<BookingCommitRequest, Notice> {
        let pending = self.booking.pending().ok_or(Notice::NoPendingBooking)?;
        let chosen = pending.candidate(slot).ok_or(Notice::SlotNotOffered)?;
        if !self.booking_enabled {
            return Err(Notice::BookingUnavailable);
        }
        let details = merge_details(pending.booking_details.as_ref(), supplied)
            .filter(details_are_actionable)
            .ok_or(Notice::MissingBookingDetails)?;
        let service_id = pending
            .service_reference_id
            .as_deref()
            .ok_or(Notice::CommitFailure)?;
        commit_request(&self.session_id, pending, service_id, chosen, &details)
            .map_err(|_| Notice::CommitFailure)
    }

    fn ensure_idle(&self) -> Result<(), ConversationError> {
        match self.in_flight {
            Some(op) => Err(ConversationError::Busy(op)),
            None => Ok(()),
        }
    }

    fn release(&mut self, op: Operation) {
        if self.in_flight == Some(op) {
            self.in_flight = None;
        }
    }

    fn push_notice(&mut self, notice: Notice, now: DateTime<Utc>) {
        self.ledger.append(
            Role::Assistant,
            replies::for_notice(notice),
            now,
            None,
            Some(notice),
        );
    }
}

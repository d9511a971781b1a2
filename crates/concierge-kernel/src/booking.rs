use concierge_contracts::{
    BookingCommitRequest, BookingCommitResponse, BookingDetails, ErrorBody, IntentResponse, Slot,
};
use serde::Serialize;
use serde_json::json;

use crate::jcs_sha256_hex;

const CONFLICT_CODES: &[&str] = &[
    "slot_unavailable",
    "conflict",
    "already_booked",
    "booking_conflict",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingBooking {
    pub intent: String,
    pub service_reference_id: Option<String>,
    pub candidate_slots: Vec<Slot>,
    pub booking_details: Option<BookingDetails>,
    pub needs_confirmation: bool,
    pub proposed_in_turn: u64,
    pub generation: u64,
}

impl PendingBooking {
    /// The offered slot matching `slot`. Team members are compared only when
    /// both sides name one.
    pub fn candidate(&self, slot: &Slot) -> Option<&Slot> {
        self.candidate_slots.iter().find(|c| {
            c.start_at == slot.start_at
                && match (&c.team_member, &slot.team_member) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                }
        })
    }
}

/// Holds at most one pending booking. Every proposal bumps the generation so
/// a stale commit can be told apart from the current offer.
#[derive(Debug, Clone, Default)]
pub struct BookingContext {
    pending: Option<PendingBooking>,
    generation: u64,
}

impl BookingContext {
    pub fn pending(&self) -> Option<&PendingBooking> {
        self.pending.as_ref()
    }

    pub fn propose(&mut self, response: &IntentResponse, turn_seq: u64) -> &PendingBooking {
        self.generation += 1;
        self.pending.insert(PendingBooking {
            intent: response.intent.clone(),
            service_reference_id: response
                .service_variation_id
                .clone()
                .filter(|v| !v.trim().is_empty()),
            candidate_slots: response.available_slots.clone(),
            booking_details: response.booking_details.clone(),
            needs_confirmation: response.needs_confirmation,
            proposed_in_turn: turn_seq,
            generation: self.generation,
        })
    }

    pub fn clear(&mut self) -> Option<PendingBooking> {
        self.pending.take()
    }
}

pub fn details_are_actionable(details: &BookingDetails) -> bool {
    details
        .phone
        .as_deref()
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

/// Fields supplied with a slot selection override the proposal's.
pub fn merge_details(
    proposed: Option<&BookingDetails>,
    supplied: Option<&BookingDetails>,
) -> Option<BookingDetails> {
    fn pick(supplied: &Option<String>, proposed: &Option<String>) -> Option<String> {
        supplied
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| proposed.clone().filter(|v| !v.trim().is_empty()))
    }

    match (proposed, supplied) {
        (None, None) => None,
        (Some(p), None) => Some(p.clone()),
        (None, Some(s)) => Some(s.clone()),
        (Some(p), Some(s)) => Some(BookingDetails {
            name: pick(&s.name, &p.name),
            phone: pick(&s.phone, &p.phone),
            email: pick(&s.email, &p.email),
        }),
    }
}

pub fn commit_request(
    session_id: &str,
    pending: &PendingBooking,
    service_variation_id: &str,
    slot: &Slot,
    details: &BookingDetails,
) -> Result<BookingCommitRequest, String> {
    let customer_note = details
        .name
        .clone()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "AI Booking".to_string());
    let key_seed = json!({
        "session_id": session_id,
        "generation": pending.generation,
        "service_variation_id": service_variation_id,
        "start_at": slot.start_at,
        "customer_note": customer_note,
        "customer_phone": details.phone,
        "customer_email": details.email,
    });
    let digest = jcs_sha256_hex(&key_seed)?;

    Ok(BookingCommitRequest {
        service_variation_id: service_variation_id.to_string(),
        start_at: slot.start_at.clone(),
        customer_note,
        customer_phone: details.phone.clone(),
        customer_email: details.email.clone(),
        idempotency_key: format!("bk_{}", &digest[..32]),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Confirmed { booking_id: String },
    Conflict { reason: String },
    Failed { reason: String },
}

pub fn classify_commit_response(response: &BookingCommitResponse) -> CommitOutcome {
    if let Some(id) = response.booking_id() {
        return CommitOutcome::Confirmed {
            booking_id: id.to_string(),
        };
    }
    match &response.error {
        Some(error) => classify_commit_rejection(None, Some(error)),
        None => CommitOutcome::Failed {
            reason: "commit_missing_booking_id".to_string(),
        },
    }
}

pub fn classify_commit_rejection(status: Option<u16>, error: Option<&ErrorBody>) -> CommitOutcome {
    let code = error.map(|e| e.code.to_ascii_lowercase());
    let is_conflict = status == Some(409)
        || code
            .as_deref()
            .map(|c| CONFLICT_CODES.contains(&c))
            .unwrap_or(false);
    let reason = code.unwrap_or_else(|| match status {
        Some(s) => format!("http_{s}"),
        None => "commit_rejected".to_string(),
    });
    if is_conflict {
        CommitOutcome::Conflict { reason }
    } else {
        CommitOutcome::Failed { reason }
    }
}

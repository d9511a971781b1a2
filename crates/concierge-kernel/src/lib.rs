//! Pure conversation and booking state for the concierge. Nothing in this
//! crate performs I/O; callers drive it around their own network calls.

mod booking;
mod conversation;
mod intent;
mod ledger;
pub mod replies;

pub use booking::{
    classify_commit_rejection, classify_commit_response, commit_request, details_are_actionable,
    merge_details, BookingContext, CommitOutcome, PendingBooking,
};
pub use conversation::{CommitStep, Conversation, ConversationError, Operation};
pub use intent::Intent;
pub use ledger::Ledger;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|v| v.with_timezone(&Utc))
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn jcs_sha256_hex(value: &Value) -> Result<String, String> {
    let canonical = serde_jcs::to_string(value)
        .map_err(|err| format!("failed to canonicalize JSON via JCS: {err}"))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jcs_hash_is_order_independent() {
        let a = json!({"b":1,"a":2});
        let b = json!({"a":2,"b":1});
        assert_eq!(jcs_sha256_hex(&a).unwrap(), jcs_sha256_hex(&b).unwrap());
    }

    #[test]
    fn timestamps_round_trip_through_rfc3339() {
        let at = parse_rfc3339("2024-06-01T10:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(at), "2024-06-01T08:00:00.000Z");
        assert!(parse_rfc3339("tomorrow").is_none());
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const API_VERSION: &str = "0.3.0";

#[derive(Debug, Clone, Serialize)]
pub struct ContractSchemaManifest {
    pub name: &'static str,
    pub sha256: &'static str,
    #[serde(skip)]
    pub body: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractsManifest {
    pub api_version: &'static str,
    pub contracts_set_sha256: &'static str,
    pub generated_at: &'static str,
    pub schemas: Vec<ContractSchemaManifest>,
}

include!(concat!(env!("OUT_DIR"), "/generated_contracts.rs"));

pub fn contracts_manifest_v1() -> ContractsManifest {
    ContractsManifest {
        api_version: API_VERSION,
        contracts_set_sha256: GENERATED_CONTRACTS_SET_SHA256,
        generated_at: GENERATED_AT_RFC3339,
        schemas: GENERATED_CONTRACT_SCHEMAS
            .iter()
            .map(|(name, sha256, body)| ContractSchemaManifest { name, sha256, body })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Speaker label used by the intent-resolution collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Speaker {
    Client,
    Assistant,
}

impl From<Role> for Speaker {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Speaker::Client,
            Role::Assistant => Speaker::Assistant,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub user_message: String,
    pub conversation_history: Vec<HistoryEntry>,
}

/// A bookable time proposed by the scheduling backend. Opaque beyond the
/// display fields; `start_at` is what gets committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    #[serde(alias = "startAt")]
    pub start_at: String,
    #[serde(default, rename = "date", alias = "displayDate")]
    pub display_date: String,
    #[serde(default, rename = "time", alias = "displayTime")]
    pub display_time: String,
    #[serde(
        default,
        rename = "team_member",
        alias = "teamMemberLabel",
        skip_serializing_if = "Option::is_none"
    )]
    pub team_member: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingDetails {
    #[serde(default, alias = "client_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "client_phone", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, alias = "client_email", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Result of the intent-resolution call. The collaborator is loosely typed,
/// so unknown fields are tolerated and `intent` stays a raw string here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntentResponse {
    pub text: String,
    pub intent: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub available_slots: Vec<Slot>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub needs_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_details: Option<BookingDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_variation_id: Option<String>,
}

/// Treats an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingCommitRequest {
    pub service_variation_id: String,
    pub start_at: String,
    pub customer_note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingCommitResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl BookingCommitResponse {
    pub fn booking_id(&self) -> Option<&str> {
        self.booking_id
            .as_deref()
            .or_else(|| self.booking.as_ref().map(|b| b.id.as_str()))
            .filter(|id| !id.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Onboarding step reported by the session collaborator. Only `READY`
/// unlocks booking commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReadinessStep {
    ConnectSquare,
    Ready,
    Other(String),
}

impl ReadinessStep {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessStep::Ready)
    }

    pub fn unknown() -> Self {
        ReadinessStep::Other("UNKNOWN".to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReadinessStep::ConnectSquare => "CONNECT_SQUARE",
            ReadinessStep::Ready => "READY",
            ReadinessStep::Other(v) => v,
        }
    }
}

impl From<String> for ReadinessStep {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CONNECT_SQUARE" => ReadinessStep::ConnectSquare,
            "READY" => ReadinessStep::Ready,
            _ => ReadinessStep::Other(value),
        }
    }
}

impl From<ReadinessStep> for String {
    fn from(value: ReadinessStep) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStatus {
    pub step: ReadinessStep,
}

/// Tag for system-visible assistant turns so a renderer does not have to
/// parse text to style them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    ClassificationFailure,
    MissingBookingDetails,
    SlotNotOffered,
    NoPendingBooking,
    BookingUnavailable,
    CommitConflict,
    CommitFailure,
    BookingConfirmed,
    BookingCancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub seq: u64,
    pub role: Role,
    pub text: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_result: Option<IntentResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationPhase {
    Idle,
    AwaitingIntentResponse,
    AwaitingSlotSelection {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_error: Option<Notice>,
    },
    AwaitingCommitResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitMessageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectSlotRequest {
    pub slot: Slot,
    #[serde(default)]
    pub booking_details: Option<BookingDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sha2::{Digest, Sha256};
    use std::path::PathBuf;

    #[test]
    fn schema_files_are_valid_json_schema() {
        let entries = std::fs::read_dir(repo_path("contracts/v1")).unwrap();
        for entry in entries {
            let path = entry.unwrap().path();
            if !path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(".schema.json"))
                .unwrap_or(false)
            {
                continue;
            }
            let text = std::fs::read_to_string(&path).unwrap();
            let schema: Value = serde_json::from_str(&text).unwrap();
            let _validator = jsonschema::validator_for(&schema)
                .unwrap_or_else(|err| panic!("invalid schema {}: {err}", path.display()));
        }
    }

    #[test]
    fn manifest_digests_match_embedded_bodies() {
        let manifest = contracts_manifest_v1();
        assert!(!manifest.schemas.is_empty());
        assert_eq!(manifest.contracts_set_sha256.len(), 64);
        for schema in manifest.schemas {
            let digest: String = Sha256::digest(schema.body.as_bytes())
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect();
            assert_eq!(digest, schema.sha256, "digest mismatch for {}", schema.name);
        }
    }

    #[test]
    fn intent_request_matches_schema() {
        let request = IntentRequest {
            user_message: "book a haircut tomorrow".to_string(),
            conversation_history: vec![HistoryEntry {
                speaker: Role::Assistant.into(),
                text: "Hi!".to_string(),
            }],
        };
        let instance = serde_json::to_value(&request).unwrap();
        assert_eq!(instance["conversationHistory"][0]["speaker"], "Assistant");
        assert_valid("intent-request.schema.json", &instance);
    }

    #[test]
    fn commit_request_matches_schema() {
        let request = BookingCommitRequest {
            service_variation_id: "svc-1".to_string(),
            start_at: "2024-06-01T10:00:00Z".to_string(),
            customer_note: "Ann".to_string(),
            customer_phone: Some("555-0100".to_string()),
            customer_email: None,
            idempotency_key: "idem".to_string(),
        };
        assert_valid(
            "booking-commit-request.schema.json",
            &serde_json::to_value(&request).unwrap(),
        );
    }

    #[test]
    fn intent_response_tolerates_sparse_slots_and_legacy_detail_keys() {
        let response: IntentResponse = serde_json::from_value(json!({
            "text": "Here are some times",
            "intent": "show_availability",
            "available_slots": [{"startAt": "2024-06-01T10:00:00Z"}],
            "booking_details": {"client_name": "Ann", "client_phone": "555-0100"},
            "extra": {"ignored": true}
        }))
        .unwrap();
        assert_eq!(response.available_slots[0].start_at, "2024-06-01T10:00:00Z");
        assert_eq!(response.available_slots[0].display_date, "");
        let details = response.booking_details.unwrap();
        assert_eq!(details.name.as_deref(), Some("Ann"));
        assert_eq!(details.phone.as_deref(), Some("555-0100"));
        assert!(!response.needs_confirmation);
    }

    #[test]
    fn intent_response_treats_null_optionals_as_absent() {
        let payload = json!({
            "text": "We open at 9.",
            "intent": "general_question",
            "available_slots": null,
            "needs_confirmation": null,
            "booking_details": null,
            "service_variation_id": null
        });
        assert_valid("intent-response.schema.json", &payload);
        let response: IntentResponse = serde_json::from_value(payload).unwrap();
        assert!(response.available_slots.is_empty());
        assert!(!response.needs_confirmation);
        assert!(response.booking_details.is_none());
    }

    #[test]
    fn commit_response_reads_nested_booking_id() {
        let nested: BookingCommitResponse =
            serde_json::from_value(json!({"booking": {"id": "bk-1", "status": "ACCEPTED"}}))
                .unwrap();
        assert_eq!(nested.booking_id(), Some("bk-1"));

        let blank: BookingCommitResponse =
            serde_json::from_value(json!({"booking_id": "  "})).unwrap();
        assert_eq!(blank.booking_id(), None);
    }

    #[test]
    fn readiness_step_preserves_unknown_values() {
        let status: SessionStatus = serde_json::from_value(json!({"step": "ONBOARDING"})).unwrap();
        assert_eq!(status.step, ReadinessStep::Other("ONBOARDING".to_string()));
        assert!(!status.step.is_ready());
        let ready: SessionStatus = serde_json::from_value(json!({"step": "READY"})).unwrap();
        assert!(ready.step.is_ready());
        assert_eq!(serde_json::to_value(&ready).unwrap(), json!({"step": "READY"}));
    }

    fn assert_valid(schema_name: &str, instance: &Value) {
        let text = std::fs::read_to_string(repo_path("contracts/v1").join(schema_name)).unwrap();
        let schema: Value = serde_json::from_str(&text).unwrap();
        let validator = jsonschema::validator_for(&schema).unwrap();
        if let Err(err) = validator.validate(instance) {
            panic!("{schema_name} rejected {instance}: {err}");
        }
    }

    fn repo_path(relative: &str) -> PathBuf {
        let mut base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        base.push("../..");
        base.push(relative);
        base
    }
}

use std::fmt;

/// Intent reported by the classification collaborator. Only the two
/// availability intents carry actionable slot proposals; everything else is
/// kept verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    ShowAvailability,
    RescheduleAvailability,
    Unknown(String),
}

impl Intent {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "show_availability" => Intent::ShowAvailability,
            "reschedule_availability" => Intent::RescheduleAvailability,
            other => Intent::Unknown(other.to_string()),
        }
    }

    pub fn awaits_slot_selection(&self) -> bool {
        match self {
            Intent::ShowAvailability | Intent::RescheduleAvailability => true,
            Intent::Unknown(_) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Intent::ShowAvailability => "show_availability",
            Intent::RescheduleAvailability => "reschedule_availability",
            Intent::Unknown(v) => v,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

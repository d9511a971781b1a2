use chrono::{DateTime, Utc};
use concierge_contracts::{HistoryEntry, IntentResponse, Notice, Role, Turn};

use crate::format_timestamp;

/// Append-only conversation record. Append order is the canonical
/// conversation order and `seq` equals the turn's index.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    turns: Vec<Turn>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        role: Role,
        text: impl Into<String>,
        at: DateTime<Utc>,
        structured_result: Option<IntentResponse>,
        notice: Option<Notice>,
    ) -> &Turn {
        let index = self.turns.len();
        let seq = index as u64;
        self.turns.push(Turn {
            seq,
            role,
            text: text.into(),
            timestamp: format_timestamp(at),
            structured_result,
            notice,
        });
        &self.turns[index]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Speaker/text pairs for every turn strictly before `seq`.
    pub fn history_before(&self, seq: u64) -> Vec<HistoryEntry> {
        self.turns
            .iter()
            .take_while(|t| t.seq < seq)
            .map(|t| HistoryEntry {
                speaker: t.role.into(),
                text: t.text.clone(),
            })
            .collect()
    }
}

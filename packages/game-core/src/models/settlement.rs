use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

/// Balance and rating change for one player of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub player_id: String,
    pub result: GameResult,
    pub balance_delta: i64,
    pub rating_delta: i32,
}

/// Everything a settlement writes, computed up front from the terminal
/// session so that a retry recomputes exactly the same effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub session_id: String,
    pub entries: Vec<LedgerEntry>,
    pub platform_fee: i64,
}

impl SettlementPlan {
    pub fn entry_for(&self, player_id: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.player_id == player_id)
    }
}

/// Fee item, one per settled decisive session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformFee {
    pub session_id: String,
    pub amount: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Marks one session's entry as applied to one player's account. Written in
/// the same transaction as the account, so its presence means the entry
/// has already been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub player_id: String,
    pub session_id: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Applied(SettlementPlan),
    /// The session had already been settled; nothing was written.
    AlreadySettled,
    /// Abandoned without a result: no money or rating moves.
    Voided,
}

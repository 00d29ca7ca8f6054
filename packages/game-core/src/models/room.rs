use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    pub minutes: u32,
    /// Carried for display; not applied to the clocks.
    #[serde(default)]
    pub increment: u32,
}

impl TimeControl {
    pub fn base_seconds(&self) -> u32 {
        self.minutes * 60
    }
}

impl Default for TimeControl {
    fn default() -> Self {
        TimeControl {
            minutes: 10,
            increment: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    Waiting,
    Full,
    InGame,
}

/// Pre-game room. Owned by the lobby; the engine only reads it when a
/// session is started and then flips it to `InGame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub bet_amount: i64,
    #[serde(default)]
    pub time_control: TimeControl,
    pub state: RoomState,
    pub creator_id: String,
    #[serde(default)]
    pub opponent_id: Option<String>,
    #[serde(default)]
    pub creator_ready: bool,
    #[serde(default)]
    pub opponent_ready: bool,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(name: &str, creator_id: &str, bet_amount: i64, time_control: TimeControl) -> Self {
        Room {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            bet_amount,
            time_control,
            state: RoomState::Waiting,
            creator_id: creator_id.to_string(),
            opponent_id: None,
            creator_ready: false,
            opponent_ready: false,
            version: 0,
            created_at: Utc::now(),
        }
    }

    pub fn is_member(&self, player_id: &str) -> bool {
        self.creator_id == player_id || self.opponent_id.as_deref() == Some(player_id)
    }

    pub fn can_start(&self) -> bool {
        self.opponent_id.is_some() && self.creator_ready && self.opponent_ready
    }
}

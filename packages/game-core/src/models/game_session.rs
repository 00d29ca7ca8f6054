use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl PlayerColor {
    pub fn opponent(self) -> Self {
        match self {
            PlayerColor::White => PlayerColor::Black,
            PlayerColor::Black => PlayerColor::White,
        }
    }
}

impl fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerColor::White => write!(f, "white"),
            PlayerColor::Black => write!(f, "black"),
        }
    }
}

/// Lifecycle of a session. Only ever moves forward: `Active` to one of the
/// two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Completed,
    Abandoned,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, GameStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    White,
    Black,
    Draw,
}

impl GameOutcome {
    pub fn win_for(color: PlayerColor) -> Self {
        match color {
            PlayerColor::White => GameOutcome::White,
            PlayerColor::Black => GameOutcome::Black,
        }
    }

    pub fn winning_color(self) -> Option<PlayerColor> {
        match self {
            GameOutcome::White => Some(PlayerColor::White),
            GameOutcome::Black => Some(PlayerColor::Black),
            GameOutcome::Draw => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    Resignation,
    Timeout,
    Agreement,
    Abandoned,
}

/// The canonical game record. Field names follow the persisted item shape
/// shared with existing clients, so renames here are breaking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    pub room_id: String,
    pub white_player_id: String,
    pub black_player_id: String,
    pub current_player: PlayerColor,
    pub board_state: String,
    pub state: GameStatus,
    #[serde(default)]
    pub winner: Option<GameOutcome>,
    #[serde(default)]
    pub end_reason: Option<EndReason>,
    pub bet_amount: i64,
    /// Base time per player, seconds.
    pub time_control: u32,
    /// Remaining seconds, millisecond precision.
    pub white_time_left: f64,
    pub black_time_left: f64,
    #[serde(default)]
    pub last_move_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clock_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub move_count: u32,
    #[serde(default)]
    pub draw_offered_by: Option<PlayerColor>,
    #[serde(default)]
    pub settled: bool,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameSession {
    pub fn new(
        room_id: &str,
        white_player_id: &str,
        black_player_id: &str,
        bet_amount: i64,
        time_control_secs: u32,
        now: DateTime<Utc>,
    ) -> Self {
        GameSession {
            id: session_id_for_room(room_id),
            room_id: room_id.to_string(),
            white_player_id: white_player_id.to_string(),
            black_player_id: black_player_id.to_string(),
            current_player: PlayerColor::White,
            board_state: STARTING_FEN.to_string(),
            state: GameStatus::Active,
            winner: None,
            end_reason: None,
            bet_amount,
            time_control: time_control_secs,
            white_time_left: f64::from(time_control_secs),
            black_time_left: f64::from(time_control_secs),
            last_move_time: Some(now),
            clock_synced_at: None,
            move_count: 0,
            draw_offered_by: None,
            settled: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == GameStatus::Active
    }

    pub fn player_color(&self, player_id: &str) -> Option<PlayerColor> {
        if self.white_player_id == player_id {
            Some(PlayerColor::White)
        } else if self.black_player_id == player_id {
            Some(PlayerColor::Black)
        } else {
            None
        }
    }

    pub fn player_id(&self, color: PlayerColor) -> &str {
        match color {
            PlayerColor::White => &self.white_player_id,
            PlayerColor::Black => &self.black_player_id,
        }
    }

    pub fn time_left_ms(&self, color: PlayerColor) -> i64 {
        let secs = match color {
            PlayerColor::White => self.white_time_left,
            PlayerColor::Black => self.black_time_left,
        };
        (secs * 1000.0).round() as i64
    }

    pub fn set_time_left_ms(&mut self, color: PlayerColor, ms: i64) {
        let secs = ms.max(0) as f64 / 1000.0;
        match color {
            PlayerColor::White => self.white_time_left = secs,
            PlayerColor::Black => self.black_time_left = secs,
        }
    }

    /// Marks the session terminal. Callers check `is_active` first; the
    /// outcome of an already-terminal session is never overwritten.
    pub fn finish(
        &mut self,
        state: GameStatus,
        outcome: Option<GameOutcome>,
        reason: EndReason,
        now: DateTime<Utc>,
    ) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        self.winner = outcome;
        self.end_reason = Some(reason);
        self.draw_offered_by = None;
        self.updated_at = now;
    }
}

/// Session ids are derived from the room id so that a repeated start
/// request for the same room resolves to the same record.
pub fn session_id_for_room(room_id: &str) -> String {
    let hash = Sha256::digest(format!("game#{}", room_id).as_bytes());
    hex::encode(&hash[0..16])
}

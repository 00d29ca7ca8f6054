use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    #[serde(rename = "p")]
    Pawn,
    #[serde(rename = "n")]
    Knight,
    #[serde(rename = "b")]
    Bishop,
    #[serde(rename = "r")]
    Rook,
    #[serde(rename = "q")]
    Queen,
    #[serde(rename = "k")]
    King,
}

impl PieceKind {
    /// Standard material value; the king counts for nothing.
    pub fn value(self) -> i32 {
        match self {
            PieceKind::Pawn => 1,
            PieceKind::Knight | PieceKind::Bishop => 3,
            PieceKind::Rook => 5,
            PieceKind::Queen => 9,
            PieceKind::King => 0,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "p" => Some(PieceKind::Pawn),
            "n" => Some(PieceKind::Knight),
            "b" => Some(PieceKind::Bishop),
            "r" => Some(PieceKind::Rook),
            "q" => Some(PieceKind::Queen),
            "k" => Some(PieceKind::King),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            PieceKind::Pawn => "p",
            PieceKind::Knight => "n",
            PieceKind::Bishop => "b",
            PieceKind::Rook => "r",
            PieceKind::Queen => "q",
            PieceKind::King => "k",
        }
    }
}

/// One applied move. Write-once: the log is append-only and a record is
/// never updated after the transaction that created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMove {
    pub id: String,
    pub game_id: String,
    pub player_id: String,
    pub from_square: String,
    pub to_square: String,
    pub piece: PieceKind,
    #[serde(default)]
    pub promotion: Option<PieceKind>,
    pub capture: bool,
    #[serde(rename = "checkf")]
    pub check: bool,
    pub checkmate: bool,
    pub fen_after: String,
    pub move_number: u32,
    pub created_at: DateTime<Utc>,
}

impl GameMove {
    pub fn new(game_id: &str, player_id: &str, move_number: u32, now: DateTime<Utc>) -> Self {
        GameMove {
            id: Uuid::new_v4().to_string(),
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            from_square: String::new(),
            to_square: String::new(),
            piece: PieceKind::Pawn,
            promotion: None,
            capture: false,
            check: false,
            checkmate: false,
            fen_after: String::new(),
            move_number,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_values() {
        assert_eq!(PieceKind::Pawn.value(), 1);
        assert_eq!(PieceKind::Knight.value(), 3);
        assert_eq!(PieceKind::Bishop.value(), 3);
        assert_eq!(PieceKind::Rook.value(), 5);
        assert_eq!(PieceKind::Queen.value(), 9);
        assert_eq!(PieceKind::King.value(), 0);
    }

    #[test]
    fn test_piece_codes() {
        assert_eq!(PieceKind::from_code("Q"), Some(PieceKind::Queen));
        assert_eq!(PieceKind::from_code("n"), Some(PieceKind::Knight));
        assert_eq!(PieceKind::from_code("x"), None);
        assert_eq!(PieceKind::Rook.code(), "r");
    }

    #[test]
    fn test_move_serialization_matches_record_shape() {
        let mut game_move = GameMove::new("game-1", "player-1", 1, Utc::now());
        game_move.from_square = "e2".to_string();
        game_move.to_square = "e4".to_string();
        game_move.check = true;

        let value = serde_json::to_value(&game_move).unwrap();

        assert_eq!(value["game_id"], "game-1");
        assert_eq!(value["piece"], "p");
        assert_eq!(value["checkf"], true);
        assert_eq!(value["move_number"], 1);
        assert!(value["promotion"].is_null());
    }
}

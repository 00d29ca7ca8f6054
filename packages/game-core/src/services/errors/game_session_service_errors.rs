use crate::models::game_session::GameOutcome;
use crate::repositories::errors::game_repository_errors::GameSessionRepositoryError;
use crate::repositories::errors::room_repository_errors::RoomRepositoryError;
use crate::services::errors::chess_service_errors::ChessServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameSessionServiceError {
    NotFound(String),
    NotActive,
    WrongTurn,
    NotAPlayer,
    /// The mover's clock had already run out. The session has been
    /// completed with `outcome` as a side effect of the rejected request.
    TimeExpired { outcome: GameOutcome },
    IllegalMove(String),
    InvalidBoard(String),
    PromotionRequired,
    NoDrawOffer,
    CannotAcceptOwnDrawOffer,
    RoomNotFound(String),
    RoomNotReady(String),
    ConflictRetriesExhausted,
    Repository(GameSessionRepositoryError),
    RoomRepository(RoomRepositoryError),
}

impl GameSessionServiceError {
    /// Stable machine-readable code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            GameSessionServiceError::NotFound(_) => "not_found",
            GameSessionServiceError::NotActive => "not_active",
            GameSessionServiceError::WrongTurn => "wrong_turn",
            GameSessionServiceError::NotAPlayer => "not_a_player",
            GameSessionServiceError::TimeExpired { .. } => "time_expired",
            GameSessionServiceError::IllegalMove(_) => "illegal_move",
            GameSessionServiceError::InvalidBoard(_) => "invalid_board",
            GameSessionServiceError::PromotionRequired => "promotion_required",
            GameSessionServiceError::NoDrawOffer => "no_draw_offer",
            GameSessionServiceError::CannotAcceptOwnDrawOffer => "cannot_accept_own_draw_offer",
            GameSessionServiceError::RoomNotFound(_) => "room_not_found",
            GameSessionServiceError::RoomNotReady(_) => "room_not_ready",
            GameSessionServiceError::ConflictRetriesExhausted => "conflict",
            GameSessionServiceError::Repository(_) | GameSessionServiceError::RoomRepository(_) => {
                "storage_error"
            }
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            GameSessionServiceError::NotFound(_) | GameSessionServiceError::RoomNotFound(_) => 404,
            GameSessionServiceError::NotAPlayer => 403,
            GameSessionServiceError::IllegalMove(_)
            | GameSessionServiceError::PromotionRequired
            | GameSessionServiceError::CannotAcceptOwnDrawOffer => 400,
            GameSessionServiceError::NotActive
            | GameSessionServiceError::WrongTurn
            | GameSessionServiceError::TimeExpired { .. }
            | GameSessionServiceError::NoDrawOffer
            | GameSessionServiceError::RoomNotReady(_) => 409,
            GameSessionServiceError::ConflictRetriesExhausted => 503,
            GameSessionServiceError::InvalidBoard(_)
            | GameSessionServiceError::Repository(_)
            | GameSessionServiceError::RoomRepository(_) => 500,
        }
    }

    /// Whether the same request may succeed if simply sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GameSessionServiceError::ConflictRetriesExhausted
                | GameSessionServiceError::Repository(GameSessionRepositoryError::DynamoDb(_))
                | GameSessionServiceError::RoomRepository(RoomRepositoryError::DynamoDb(_))
        )
    }
}

impl std::fmt::Display for GameSessionServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameSessionServiceError::NotFound(id) => write!(f, "Game session {} not found", id),
            GameSessionServiceError::NotActive => write!(f, "Game is no longer active"),
            GameSessionServiceError::WrongTurn => write!(f, "It is not your turn"),
            GameSessionServiceError::NotAPlayer => write!(f, "You are not a player in this game"),
            GameSessionServiceError::TimeExpired { outcome } => {
                write!(f, "Your time has run out; game over ({:?})", outcome)
            }
            GameSessionServiceError::IllegalMove(msg) => write!(f, "Illegal move: {}", msg),
            GameSessionServiceError::InvalidBoard(msg) => write!(f, "Invalid board: {}", msg),
            GameSessionServiceError::PromotionRequired => {
                write!(f, "Choose a piece to promote to")
            }
            GameSessionServiceError::NoDrawOffer => write!(f, "There is no pending draw offer"),
            GameSessionServiceError::CannotAcceptOwnDrawOffer => {
                write!(f, "You cannot accept your own draw offer")
            }
            GameSessionServiceError::RoomNotFound(id) => write!(f, "Room {} not found", id),
            GameSessionServiceError::RoomNotReady(msg) => write!(f, "Room is not ready: {}", msg),
            GameSessionServiceError::ConflictRetriesExhausted => {
                write!(f, "Game was updated concurrently, please retry")
            }
            GameSessionServiceError::Repository(err) => write!(f, "Repository error: {}", err),
            GameSessionServiceError::RoomRepository(err) => write!(f, "Room repository error: {}", err),
        }
    }
}

impl std::error::Error for GameSessionServiceError {}

impl From<GameSessionRepositoryError> for GameSessionServiceError {
    fn from(err: GameSessionRepositoryError) -> Self {
        GameSessionServiceError::Repository(err)
    }
}

impl From<RoomRepositoryError> for GameSessionServiceError {
    fn from(err: RoomRepositoryError) -> Self {
        GameSessionServiceError::RoomRepository(err)
    }
}

impl From<ChessServiceError> for GameSessionServiceError {
    fn from(err: ChessServiceError) -> Self {
        match err {
            ChessServiceError::InvalidPosition(msg) => GameSessionServiceError::InvalidBoard(msg),
            ChessServiceError::IllegalMove(msg) => GameSessionServiceError::IllegalMove(msg),
            ChessServiceError::PromotionRequired => GameSessionServiceError::PromotionRequired,
            other @ (ChessServiceError::InvalidSquare(_) | ChessServiceError::InvalidPromotion(_)) => {
                GameSessionServiceError::IllegalMove(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chess_errors_map_to_rejections() {
        assert_eq!(
            GameSessionServiceError::from(ChessServiceError::PromotionRequired),
            GameSessionServiceError::PromotionRequired
        );
        assert_eq!(
            GameSessionServiceError::from(ChessServiceError::InvalidSquare("z9".to_string())).code(),
            "illegal_move"
        );
        assert_eq!(
            GameSessionServiceError::from(ChessServiceError::InvalidPosition("bad".to_string())).status(),
            500
        );
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(GameSessionServiceError::ConflictRetriesExhausted.is_retryable());
        assert!(GameSessionServiceError::from(GameSessionRepositoryError::DynamoDb("timeout".into()))
            .is_retryable());
        assert!(!GameSessionServiceError::WrongTurn.is_retryable());
        assert!(!GameSessionServiceError::TimeExpired {
            outcome: GameOutcome::Black
        }
        .is_retryable());
    }
}

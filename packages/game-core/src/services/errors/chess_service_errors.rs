use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChessServiceError {
    InvalidPosition(String),
    InvalidSquare(String),
    InvalidPromotion(String),
    IllegalMove(String),
    /// The move would be legal with a promotion piece; the caller still has
    /// to choose one.
    PromotionRequired,
}

impl fmt::Display for ChessServiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChessServiceError::InvalidPosition(msg) => write!(f, "Invalid position: {}", msg),
            ChessServiceError::InvalidSquare(square) => write!(f, "Invalid square: {}", square),
            ChessServiceError::InvalidPromotion(piece) => {
                write!(f, "Invalid promotion piece: {}", piece)
            }
            ChessServiceError::IllegalMove(msg) => write!(f, "Illegal move: {}", msg),
            ChessServiceError::PromotionRequired => write!(f, "Promotion piece required"),
        }
    }
}

impl std::error::Error for ChessServiceError {}

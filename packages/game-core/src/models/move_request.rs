use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub session_id: String,
    pub from_square: String,             // e.g., "e2"
    pub to_square: String,               // e.g., "e4"
    pub promotion_piece: Option<String>, // e.g., "q" for queen
}

impl MoveRequest {
    pub fn new(session_id: &str, from_square: &str, to_square: &str) -> Self {
        MoveRequest {
            session_id: session_id.to_string(),
            from_square: from_square.to_string(),
            to_square: to_square.to_string(),
            promotion_piece: None,
        }
    }

    pub fn with_promotion(
        session_id: &str,
        from_square: &str,
        to_square: &str,
        promotion_piece: &str,
    ) -> Self {
        MoveRequest {
            promotion_piece: Some(promotion_piece.to_string()),
            ..MoveRequest::new(session_id, from_square, to_square)
        }
    }
}

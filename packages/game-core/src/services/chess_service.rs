use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Rank, Square, EMPTY};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::{
    models::{game_move::PieceKind, game_session::PlayerColor},
    services::errors::chess_service_errors::ChessServiceError,
};

const ALL_PIECES: [Piece; 6] = [
    Piece::Pawn,
    Piece::Knight,
    Piece::Bishop,
    Piece::Rook,
    Piece::Queen,
    Piece::King,
];

/// A parsed position. Immutable: applying a move yields a new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulesState {
    board: Board,
}

impl RulesState {
    pub fn fen(&self) -> String {
        format!("{}", self.board)
    }

    pub fn side_to_move(&self) -> PlayerColor {
        player_color(self.board.side_to_move())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Stalemate,
    InsufficientMaterial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    None,
    Checkmate,
    Draw(DrawKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveLegality {
    Legal,
    /// A pawn reaching the last rank without a chosen piece.
    AwaitingPromotion,
    Illegal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveDescriptor {
    pub from_square: String,
    pub to_square: String,
    pub piece: PieceKind,
    pub promotion: Option<PieceKind>,
    pub captured: Option<PieceKind>,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub fen_after: String,
}

/// Adapter over the `chess` crate. Pure: never touches storage.
#[derive(Clone, Default)]
pub struct ChessService;

impl ChessService {
    pub fn new() -> Self {
        ChessService
    }

    pub fn load(&self, fen: &str) -> Result<RulesState, ChessServiceError> {
        let board = Board::from_str(fen)
            .map_err(|e| ChessServiceError::InvalidPosition(format!("Invalid FEN: {}", e)))?;
        Ok(RulesState { board })
    }

    /// Squares the piece on `from` may move to. Empty when the square is
    /// empty or holds a piece of the side not to move.
    pub fn legal_destinations(
        &self,
        state: &RulesState,
        from: &str,
    ) -> Result<Vec<String>, ChessServiceError> {
        let from_sq = parse_square(from)?;
        let destinations: BTreeSet<String> = MoveGen::new_legal(&state.board)
            .filter(|m| m.get_source() == from_sq)
            .map(|m| m.get_dest().to_string())
            .collect();
        Ok(destinations.into_iter().collect())
    }

    /// All legal moves in UCI notation.
    pub fn legal_moves(&self, state: &RulesState) -> Vec<String> {
        MoveGen::new_legal(&state.board)
            .map(|m| match m.get_promotion() {
                Some(piece) => format!(
                    "{}{}{}",
                    m.get_source(),
                    m.get_dest(),
                    piece_kind(piece).code()
                ),
                None => format!("{}{}", m.get_source(), m.get_dest()),
            })
            .collect()
    }

    pub fn check_move(
        &self,
        state: &RulesState,
        from: &str,
        to: &str,
        promotion: Option<&str>,
    ) -> Result<MoveLegality, ChessServiceError> {
        let from_sq = parse_square(from)?;
        let to_sq = parse_square(to)?;
        let promotion = promotion.map(parse_promotion).transpose()?;

        if state.board.legal(ChessMove::new(from_sq, to_sq, promotion)) {
            return Ok(MoveLegality::Legal);
        }

        if promotion.is_none() && is_promotion_square(&state.board, from_sq, to_sq) {
            let promotable = MoveGen::new_legal(&state.board).any(|m| {
                m.get_source() == from_sq && m.get_dest() == to_sq && m.get_promotion().is_some()
            });
            if promotable {
                return Ok(MoveLegality::AwaitingPromotion);
            }
        }

        Ok(MoveLegality::Illegal)
    }

    pub fn is_legal_move(
        &self,
        state: &RulesState,
        from: &str,
        to: &str,
        promotion: Option<&str>,
    ) -> bool {
        matches!(
            self.check_move(state, from, to, promotion),
            Ok(MoveLegality::Legal)
        )
    }

    pub fn apply_move(
        &self,
        state: &RulesState,
        from: &str,
        to: &str,
        promotion: Option<&str>,
    ) -> Result<(RulesState, MoveDescriptor), ChessServiceError> {
        match self.check_move(state, from, to, promotion)? {
            MoveLegality::Legal => {}
            MoveLegality::AwaitingPromotion => return Err(ChessServiceError::PromotionRequired),
            MoveLegality::Illegal => {
                return Err(ChessServiceError::IllegalMove(format!(
                    "{} to {} is not legal",
                    from, to
                )))
            }
        }

        let board = &state.board;
        let from_sq = parse_square(from)?;
        let to_sq = parse_square(to)?;
        let promotion = promotion.map(parse_promotion).transpose()?;

        let moving = board.piece_on(from_sq).ok_or_else(|| {
            ChessServiceError::IllegalMove(format!("No piece on {}", from))
        })?;
        let captured = match board.piece_on(to_sq) {
            Some(piece) => Some(piece_kind(piece)),
            // Diagonal pawn move onto an empty square is en passant.
            None if moving == Piece::Pawn && from_sq.get_file() != to_sq.get_file() => {
                Some(PieceKind::Pawn)
            }
            None => None,
        };

        let new_board = board.make_move_new(ChessMove::new(from_sq, to_sq, promotion));
        let next = RulesState { board: new_board };

        let descriptor = MoveDescriptor {
            from_square: from_sq.to_string(),
            to_square: to_sq.to_string(),
            piece: piece_kind(moving),
            promotion: promotion.map(piece_kind),
            captured,
            is_check: *new_board.checkers() != EMPTY,
            is_checkmate: new_board.status() == BoardStatus::Checkmate,
            fen_after: next.fen(),
        };

        Ok((next, descriptor))
    }

    pub fn terminal_state(&self, state: &RulesState) -> TerminalState {
        match state.board.status() {
            BoardStatus::Checkmate => TerminalState::Checkmate,
            BoardStatus::Stalemate => TerminalState::Draw(DrawKind::Stalemate),
            BoardStatus::Ongoing if insufficient_material(&state.board) => {
                TerminalState::Draw(DrawKind::InsufficientMaterial)
            }
            BoardStatus::Ongoing => TerminalState::None,
        }
    }

    pub fn material(&self, state: &RulesState, color: PlayerColor) -> i32 {
        ALL_PIECES
            .iter()
            .map(|&piece| count(&state.board, piece, chess_color(color)) * piece_kind(piece).value())
            .sum()
    }

    /// White material minus black material.
    pub fn material_advantage(&self, state: &RulesState) -> i32 {
        self.material(state, PlayerColor::White) - self.material(state, PlayerColor::Black)
    }

    /// Pieces of `color` no longer on the board compared to the initial
    /// setup. Promotions can make a count exceed the initial one; those are
    /// not reported.
    pub fn captured_pieces(&self, state: &RulesState, color: PlayerColor) -> Vec<PieceKind> {
        const INITIAL: [(Piece, i32); 5] = [
            (Piece::Pawn, 8),
            (Piece::Knight, 2),
            (Piece::Bishop, 2),
            (Piece::Rook, 2),
            (Piece::Queen, 1),
        ];

        INITIAL
            .iter()
            .flat_map(|&(piece, initial)| {
                let missing = (initial - count(&state.board, piece, chess_color(color))).max(0);
                std::iter::repeat(piece_kind(piece)).take(missing as usize)
            })
            .collect()
    }
}

fn parse_square(square: &str) -> Result<Square, ChessServiceError> {
    Square::from_str(&square.to_ascii_lowercase())
        .map_err(|_| ChessServiceError::InvalidSquare(square.to_string()))
}

fn parse_promotion(piece: &str) -> Result<Piece, ChessServiceError> {
    match PieceKind::from_code(piece) {
        Some(PieceKind::Queen) => Ok(Piece::Queen),
        Some(PieceKind::Rook) => Ok(Piece::Rook),
        Some(PieceKind::Bishop) => Ok(Piece::Bishop),
        Some(PieceKind::Knight) => Ok(Piece::Knight),
        _ => Err(ChessServiceError::InvalidPromotion(piece.to_string())),
    }
}

fn is_promotion_square(board: &Board, from: Square, to: Square) -> bool {
    board.piece_on(from) == Some(Piece::Pawn)
        && matches!(to.get_rank(), Rank::First | Rank::Eighth)
}

fn insufficient_material(board: &Board) -> bool {
    let heavy = [Piece::Pawn, Piece::Rook, Piece::Queen]
        .iter()
        .map(|&p| board.pieces(p).popcnt())
        .sum::<u32>();
    let minors = board.pieces(Piece::Knight).popcnt() + board.pieces(Piece::Bishop).popcnt();
    heavy == 0 && minors <= 1
}

fn count(board: &Board, piece: Piece, color: Color) -> i32 {
    (*board.pieces(piece) & *board.color_combined(color)).popcnt() as i32
}

fn piece_kind(piece: Piece) -> PieceKind {
    match piece {
        Piece::Pawn => PieceKind::Pawn,
        Piece::Knight => PieceKind::Knight,
        Piece::Bishop => PieceKind::Bishop,
        Piece::Rook => PieceKind::Rook,
        Piece::Queen => PieceKind::Queen,
        Piece::King => PieceKind::King,
    }
}

fn player_color(color: Color) -> PlayerColor {
    match color {
        Color::White => PlayerColor::White,
        Color::Black => PlayerColor::Black,
    }
}

fn chess_color(color: PlayerColor) -> Color {
    match color {
        PlayerColor::White => Color::White,
        PlayerColor::Black => Color::Black,
    }
}

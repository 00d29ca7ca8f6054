pub mod chess_service;
pub mod errors;
pub mod game_session_service;
pub mod settlement_service;
pub mod settlement_trigger;

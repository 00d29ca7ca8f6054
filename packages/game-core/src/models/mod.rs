pub mod account;
pub mod game_move;
pub mod game_session;
pub mod move_request;
pub mod room;
pub mod settlement;

pub mod errors;
pub mod game_repository;
pub mod ledger_repository;
pub mod memory;
pub mod room_repository;

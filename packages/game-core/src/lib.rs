pub mod change_feed;
pub mod clock;
pub mod config;
pub mod models;
pub mod repositories;
pub mod services;

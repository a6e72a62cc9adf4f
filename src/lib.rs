pub mod ai;
pub mod app_state;
pub mod commands;
pub mod config;
pub mod evaluate;
pub mod export;
pub mod extract;
pub mod job;
pub mod storage;

pub use app_state::AppEvent;

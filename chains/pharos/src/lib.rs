pub mod account;
pub mod config;
pub mod task;
pub mod utils;

pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod exchange;
pub mod models;
pub mod portfolio;
pub mod storage;

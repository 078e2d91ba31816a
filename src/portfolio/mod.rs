// src/portfolio/mod.rs
mod aggregator;
mod cost_basis;
mod history;
mod models;
mod service;
mod snapshots;
mod valuator;

pub use aggregator::*;
pub use cost_basis::*;
pub use history::*;
pub use models::*;
pub use service::*;
pub use snapshots::*;
pub use valuator::*;

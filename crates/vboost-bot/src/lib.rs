//! Paired maker/taker volume bot.
//!
//! Wires the venue gateways, order streams and price feed into a
//! `PairExecutor` and drives it in one of two run modes:
//! - Instant: open, wait, close, per round
//! - Build/hold/close: build up to a margin limit, hold, unwind

pub mod app;
pub mod config;
pub mod direction;
pub mod error;
pub mod orchestrator;

pub use app::Application;
pub use config::{AppConfig, Endpoints, Environment, RunMode};
pub use direction::DirectionPolicy;
pub use error::{AppError, AppResult};
pub use orchestrator::{Orchestrator, RunReport, RunSettings};

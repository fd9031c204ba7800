//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] vboost_core::CoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] vboost_gateway::GatewayError),

    #[error("Key error: {0}")]
    Key(#[from] vboost_gateway::KeyError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] vboost_telemetry::TelemetryError),

    #[error("Live trading requires --confirm")]
    NotConfirmed,

    #[error("Run halted: {0}")]
    Halted(String),
}

pub type AppResult<T> = Result<T, AppError>;

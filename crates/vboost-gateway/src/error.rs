//! Gateway error types.

use thiserror::Error;

use crate::signer::KeyError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Session rejected or a response lacked the payload an authenticated
    /// call always carries.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The venue answered with an error code.
    #[error("Order rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    /// Retries against a 503 or failing transport were exhausted.
    #[error("Venue unavailable: {0}")]
    Unavailable(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Venue error code, when the venue sent one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

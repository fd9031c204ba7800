//! Executor error taxonomy.
//!
//! Every failure inside a round ends up as one of these, and each maps onto
//! exactly one round outcome: permanent failures stop the run, transient
//! ones are retried by `RetryCoordinator`.

use thiserror::Error;
use vboost_core::RoundOutcome;
use vboost_gateway::GatewayError;

/// Venue error codes with dedicated handling.
pub mod codes {
    pub const INSUFFICIENT_MARGIN: i64 = 2080;
    pub const SIGNATURE_ERROR: i64 = 2002;
    pub const ORDER_TOO_SMALL: i64 = 2066;
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Bad input; retrying cannot help.
    #[error("{0}")]
    Validation(String),

    /// Session rejected; fatal to the run.
    #[error("{0}")]
    Auth(String),

    #[error("{message}")]
    VenueRejection {
        code: Option<i64>,
        message: String,
        permanent: bool,
    },

    /// Maker leg never showed up on the order stream.
    #[error("{0}")]
    ConfirmationTimeout(String),

    /// Both orders accepted, neither position moved.
    #[error("{0}")]
    NoFillObserved(String),

    /// Residual exposure could not be flattened or verified.
    #[error("Recovery failed: {0}")]
    RecoveryFailure(String),
}

impl ExecutorError {
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Auth(_) | Self::RecoveryFailure(_) => true,
            Self::VenueRejection { permanent, .. } => *permanent,
            Self::ConfirmationTimeout(_) | Self::NoFillObserved(_) => false,
        }
    }

    /// Map a gateway failure on a read or cancel path.
    pub fn from_gateway(context: &str, err: GatewayError) -> Self {
        match err {
            GatewayError::Auth(_) => Self::Auth(format!("Auth failed while {context}")),
            other => Self::VenueRejection {
                code: other.code(),
                message: format!("{context} failed: {other}"),
                permanent: false,
            },
        }
    }

    /// Map a `create_order` failure of the `leg` ("Maker", "Taker") order.
    pub fn from_rejection(leg: &str, err: GatewayError) -> Self {
        match err {
            GatewayError::Auth(_) => Self::Auth(format!("{leg} order failed: {err}")),
            GatewayError::Signing(_) | GatewayError::Key(_) | GatewayError::UnknownInstrument(_) => {
                Self::Validation(format!("{leg} order failed: {err}"))
            }
            GatewayError::Rejected { code, .. } if code == codes::INSUFFICIENT_MARGIN => {
                Self::VenueRejection {
                    code: Some(code),
                    message: "Insufficient margin".to_string(),
                    permanent: false,
                }
            }
            GatewayError::Rejected { code, .. } if code == codes::SIGNATURE_ERROR => {
                Self::VenueRejection {
                    code: Some(code),
                    message: format!("{leg} order failed: signature error"),
                    permanent: true,
                }
            }
            GatewayError::Rejected { code, .. } if code == codes::ORDER_TOO_SMALL => {
                Self::VenueRejection {
                    code: Some(code),
                    message: "Order size too small".to_string(),
                    permanent: true,
                }
            }
            other => Self::VenueRejection {
                code: other.code(),
                message: format!("{leg} order failed: {other}"),
                permanent: false,
            },
        }
    }

    #[must_use]
    pub fn into_outcome(self) -> RoundOutcome {
        if self.is_permanent() {
            RoundOutcome::FailPermanent(self.to_string())
        } else {
            RoundOutcome::FailTransient(self.to_string())
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

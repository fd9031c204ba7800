//! Outcome types for one maker/taker round.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Size;

/// Prefix carried by successful-but-recovered round messages.
pub const EXTERNAL_FILL_WARNING: &str = "EXTERNAL_FILL_WARNING";

/// Signed position change of account A (maker) and account B (taker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaPair {
    pub a: Size,
    pub b: Size,
}

impl DeltaPair {
    #[must_use]
    pub fn new(a: Size, b: Size) -> Self {
        Self { a, b }
    }

    /// What a clean round produces: A moves by `+size` when opening
    /// (`-size` when closing) and B moves the opposite way.
    #[must_use]
    pub fn expected(size: Size, opening: bool) -> Self {
        if opening {
            Self::new(size, -size)
        } else {
            Self::new(-size, size)
        }
    }

    /// Net exposure across both accounts.
    #[must_use]
    pub fn net(&self) -> Size {
        self.a + self.b
    }

    /// Both deltas within `tol` of `other`.
    #[must_use]
    pub fn within(&self, other: &DeltaPair, tol: Size) -> bool {
        (self.a - other.a).abs() <= tol && (self.b - other.b).abs() <= tol
    }

    /// Both deltas within `tol` of zero.
    #[must_use]
    pub fn is_flat(&self, tol: Size) -> bool {
        self.a.abs() <= tol && self.b.abs() <= tol
    }
}

impl fmt::Display for DeltaPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{a: {}, b: {}}}", self.a.normalized(), self.b.normalized())
    }
}

/// Terminal state of one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Both legs filled as expected.
    Success,
    /// Positions diverged, residual exposure was flattened.
    WarningRecovered {
        observed: DeltaPair,
        expected: DeltaPair,
        message: String,
    },
    /// Worth retrying.
    FailTransient(String),
    /// Retrying cannot help.
    FailPermanent(String),
}

impl RoundOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::WarningRecovered { .. })
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::FailPermanent(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::WarningRecovered { .. } => "warning_recovered",
            Self::FailTransient(_) => "fail_transient",
            Self::FailPermanent(_) => "fail_permanent",
        }
    }
}

/// Flattened result handed back to callers.
///
/// Warnings are carried in `message` with `success == true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub permanent_error: bool,
    pub message: Option<String>,
}

impl ExecutionResult {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            permanent_error: false,
            message: None,
        }
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            success: false,
            permanent_error: false,
            message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            success: false,
            permanent_error: true,
            message: Some(message.into()),
        }
    }

    /// Successful round carrying an external-fill warning.
    pub fn is_warning(&self) -> bool {
        self.success
            && self
                .message
                .as_deref()
                .is_some_and(|m| m.starts_with(EXTERNAL_FILL_WARNING))
    }
}

impl From<RoundOutcome> for ExecutionResult {
    fn from(outcome: RoundOutcome) -> Self {
        match outcome {
            RoundOutcome::Success => Self::ok(),
            RoundOutcome::WarningRecovered { message, .. } => Self {
                success: true,
                permanent_error: false,
                message: Some(message),
            },
            RoundOutcome::FailTransient(m) => Self::transient(m),
            RoundOutcome::FailPermanent(m) => Self::permanent(m),
        }
    }
}

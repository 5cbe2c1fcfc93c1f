//! Rule outcomes
//!
//! Every rule settles to exactly one [`Decision`]. `Deny` is a rule declining
//! access; `Error` is the rule itself failing. Both block the field.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Reason used when a rule denies without saying why
pub const DEFAULT_DENY_MESSAGE: &str = "Not Authorised!";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny { reason: String },
    Error { cause: RuleFailure },
}

impl Decision {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    /// Deny with [`DEFAULT_DENY_MESSAGE`]
    pub fn denied() -> Self {
        Self::deny(DEFAULT_DENY_MESSAGE)
    }

    pub fn error(cause: impl Into<anyhow::Error>) -> Self {
        Self::Error {
            cause: RuleFailure::new(cause),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Text shown to the caller for a blocking decision
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::Deny { reason } => Some(reason.clone()),
            Self::Error { cause } => Some(cause.to_string()),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny { reason } => write!(f, "deny: {}", reason),
            Self::Error { cause } => write!(f, "error: {}", cause),
        }
    }
}

/// Cause of an `Error` decision
///
/// Shared so that a cached decision can be handed to every field occurrence
/// that asks for it. Two failures are equal when their messages are.
#[derive(Clone)]
pub struct RuleFailure(Arc<anyhow::Error>);

impl RuleFailure {
    pub fn new(cause: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(cause.into()))
    }

    pub fn cause(&self) -> &anyhow::Error {
        &self.0
    }

    /// Messages of the cause and everything it wraps, outermost first
    pub fn chain(&self) -> Vec<String> {
        self.0.chain().map(ToString::to_string).collect()
    }
}

impl fmt::Debug for RuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for RuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for RuleFailure {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_string() == other.0.to_string()
    }
}

impl Serialize for RuleFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

/// Values a predicate may return
pub trait IntoDecision {
    fn into_decision(self) -> Decision;
}

impl IntoDecision for Decision {
    fn into_decision(self) -> Decision {
        self
    }
}

impl IntoDecision for bool {
    fn into_decision(self) -> Decision {
        if self {
            Decision::Allow
        } else {
            Decision::denied()
        }
    }
}

impl<T, E> IntoDecision for Result<T, E>
where
    T: IntoDecision,
    E: Into<anyhow::Error>,
{
    fn into_decision(self) -> Decision {
        match self {
            Ok(value) => value.into_decision(),
            Err(error) => Decision::error(error),
        }
    }
}

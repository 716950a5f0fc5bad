//! Result of a pipeline step that has a documented fallback.

use serde::{Deserialize, Serialize};

/// Value produced by a step that can fall back to a simpler strategy.
///
/// Hard failures are reported through `Result`; this type only records which
/// of the two successful paths ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The primary algorithm produced the value.
    Primary(T),
    /// The primary algorithm failed and the fallback produced the value.
    Fallback { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Self::Fallback {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Primary(value) | Self::Fallback { value, .. } => value,
        }
    }

    /// Fallback reason, if the fallback path ran.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Primary(_) => None,
            Self::Fallback { reason, .. } => Some(reason),
        }
    }

    /// Which path ran, without the value.
    pub fn source(&self) -> StepSource {
        match self {
            Self::Primary(_) => StepSource::Primary,
            Self::Fallback { reason, .. } => StepSource::Fallback {
                reason: reason.clone(),
            },
        }
    }
}

/// The path recorded next to a stored result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum StepSource {
    #[default]
    Primary,
    Fallback { reason: String },
}

impl StepSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

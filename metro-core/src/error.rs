//! Failure taxonomy for every mutating call in the core.
//!
//! Expected business outcomes (bad input, not enough resources, an action
//! that the current state forbids) are values, never panics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ResourceKind;

/// How far a pool falls short of a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub kind: ResourceKind,
    pub needed: i64,
    pub available: i64,
}

impl Shortfall {
    pub fn missing(&self) -> i64 {
        self.needed - self.available
    }
}

/// Errors raised by a `ResourcePool`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("negative amount {amount} for {kind}")]
    Negative { kind: ResourceKind, amount: i64 },
    #[error("insufficient {}: need {}, have {}", .0.kind, .0.needed, .0.available)]
    Insufficient(Shortfall),
}

/// Errors returned by simulation operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Malformed or out-of-range input
    #[error("invalid input: {0}")]
    Invalid(String),
    /// Reference to a station, faction, event or entity that does not exist
    #[error("not found: {0}")]
    NotFound(String),
    #[error("insufficient {}: need {}, have {}", .0.kind, .0.needed, .0.available)]
    Insufficient(Shortfall),
    /// The action is well-formed but the current state forbids it
    #[error("illegal transition: {0}")]
    IllegalTransition(String),
}

impl SimError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SimError::Invalid(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        SimError::NotFound(msg.into())
    }

    pub fn illegal(msg: impl Into<String>) -> Self {
        SimError::IllegalTransition(msg.into())
    }

    /// Validation failures cover both bad input and dangling references
    pub fn is_validation(&self) -> bool {
        matches!(self, SimError::Invalid(_) | SimError::NotFound(_))
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, SimError::Insufficient(_))
    }

    pub fn shortfall(&self) -> Option<Shortfall> {
        match self {
            SimError::Insufficient(s) => Some(*s),
            _ => None,
        }
    }
}

impl From<ResourceError> for SimError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Negative { kind, amount } => {
                SimError::Invalid(format!("negative amount {} for {}", amount, kind))
            }
            ResourceError::Insufficient(shortfall) => SimError::Insufficient(shortfall),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_error_maps_to_taxonomy() {
        let negative: SimError = ResourceError::Negative {
            kind: ResourceKind::Food,
            amount: -3,
        }
        .into();
        assert!(negative.is_validation());

        let short = Shortfall {
            kind: ResourceKind::Scrap,
            needed: 30,
            available: 12,
        };
        let insufficient: SimError = ResourceError::Insufficient(short).into();
        assert!(insufficient.is_insufficient());
        assert_eq!(insufficient.shortfall().map(|s| s.missing()), Some(18));
        assert_eq!(insufficient.to_string(), "insufficient scrap: need 30, have 12");
    }
}

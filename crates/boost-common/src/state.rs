//! Boost cycle phases.
//!
//! Each accepted input event opens a cycle:
//! IDLE → ACTIVE → IDLE
//!
//! A retrigger while ACTIVE stays in ACTIVE and only moves the expiry
//! deadline; there is no stacking of floors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the current boost cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoostPhase {
    /// No floor is applied; waiting for input.
    #[default]
    Idle,
    /// A floor is applied and the expiry task is armed.
    Active,
}

impl fmt::Display for BoostPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Active => write!(f, "ACTIVE"),
        }
    }
}

impl BoostPhase {
    /// Derive the phase from the latest generation and the last expired one.
    ///
    /// Generation 0 means no trigger was ever accepted.
    #[must_use]
    pub fn from_generations(current: u64, expired: u64) -> Self {
        if current == 0 || current == expired {
            Self::Idle
        } else {
            Self::Active
        }
    }

    /// Returns true while a floor may be applied.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(BoostPhase::default(), BoostPhase::Idle);
        assert!(!BoostPhase::default().is_active());
    }

    #[test]
    fn test_from_generations() {
        assert_eq!(BoostPhase::from_generations(0, 0), BoostPhase::Idle);
        assert_eq!(BoostPhase::from_generations(1, 0), BoostPhase::Active);
        assert_eq!(BoostPhase::from_generations(3, 3), BoostPhase::Idle);
        // A retrigger after an expiry opens a new cycle.
        assert_eq!(BoostPhase::from_generations(4, 3), BoostPhase::Active);
    }

    #[test]
    fn test_display() {
        assert_eq!(BoostPhase::Idle.to_string(), "IDLE");
        assert_eq!(BoostPhase::Active.to_string(), "ACTIVE");
    }
}

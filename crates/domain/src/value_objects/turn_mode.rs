//! Turn mode - the policy governing how player inputs are reduced to
//! the single action resolved by the narrator.
//!
//! The mode is inherited from the campaign at contract creation and is
//! immutable for the contract's life. Downstream code dispatches on the
//! aggregation policy selected from this enum, never on raw strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    /// The host (or sole designated actor) drives the turn alone.
    SinglePlayer,
    /// One input per character; majority of distinct choices wins.
    Vote,
    /// The earliest eligible submission is the turn's action.
    FirstResponseWins,
    /// Everyone contributes; all inputs are concatenated into context.
    Freeform,
}

impl TurnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SinglePlayer => "single_player",
            Self::Vote => "vote",
            Self::FirstResponseWins => "first_response_wins",
            Self::Freeform => "freeform",
        }
    }
}

impl fmt::Display for TurnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TurnMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_player" => Ok(Self::SinglePlayer),
            "vote" => Ok(Self::Vote),
            "first_response_wins" => Ok(Self::FirstResponseWins),
            "freeform" => Ok(Self::Freeform),
            _ => Err(DomainError::parse(format!("Unknown turn mode: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for mode in [
            TurnMode::SinglePlayer,
            TurnMode::Vote,
            TurnMode::FirstResponseWins,
            TurnMode::Freeform,
        ] {
            assert_eq!(mode.as_str().parse::<TurnMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!("co_op".parse::<TurnMode>().is_err());
    }
}

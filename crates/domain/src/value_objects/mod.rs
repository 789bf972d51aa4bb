//! Value objects for the turn-resolution domain.

mod dice;
mod effects;
mod turn_mode;

pub use dice::{DiceFormula, DiceParseError, DiceRollResult, Vantage};
pub use effects::{NarrativeEffect, NarrativeOutcome};
pub use turn_mode::TurnMode;

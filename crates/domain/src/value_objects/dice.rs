//! Dice notation value objects, parsing, and rolling
//!
//! Supports dice notation like "1d20+5", "2d6-1", "1d100", etc., plus
//! advantage/disadvantage (roll the pool twice, keep the better/worse
//! total before applying the modifier).
//!
//! Rolling takes an injected die roller so the domain stays free of RNG
//! concerns; the engine supplies one backed by a cryptographically sound
//! source.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error when parsing dice notation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceParseError {
    /// The notation string is empty
    #[error("Empty dice notation")]
    Empty,
    /// Invalid format - expected XdY or XdY+Z
    #[error("Invalid dice notation: {0}")]
    InvalidFormat(String),
    /// Dice count must be at least 1
    #[error("Dice count must be at least 1")]
    InvalidDiceCount,
    /// Die size must be at least 2
    #[error("Die size must be at least 2")]
    InvalidDieSize,
}

/// Advantage state for a roll.
///
/// Advantage rolls the dice pool twice and keeps the higher total;
/// disadvantage keeps the lower. Both apply before the modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

/// Parsed dice notation like "2d6+3"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceFormula {
    /// Number of dice to roll (X in XdY)
    pub dice_count: u8,
    /// Size of each die (Y in XdY)
    pub die_size: u8,
    /// Modifier to add/subtract after rolling (+Z or -Z)
    pub modifier: i32,
}

impl DiceFormula {
    /// Create a new dice formula
    pub fn new(dice_count: u8, die_size: u8, modifier: i32) -> Result<Self, DiceParseError> {
        if dice_count == 0 {
            return Err(DiceParseError::InvalidDiceCount);
        }
        if die_size < 2 {
            return Err(DiceParseError::InvalidDieSize);
        }
        Ok(Self {
            dice_count,
            die_size,
            modifier,
        })
    }

    /// Parse dice notation like "1d20+5", "2d6-1", "1d100"
    ///
    /// Supported formats:
    /// - "XdY" - Roll X dice of size Y
    /// - "XdY+Z" - Roll X dice of size Y, add Z
    /// - "XdY-Z" - Roll X dice of size Y, subtract Z
    /// - "dY" - Roll 1 die of size Y (shorthand)
    pub fn parse(input: &str) -> Result<Self, DiceParseError> {
        let input = input.trim().to_lowercase();
        if input.is_empty() {
            return Err(DiceParseError::Empty);
        }

        // Parsed manually to avoid a regex dependency in the domain layer

        let d_pos = input.find('d').ok_or_else(|| {
            DiceParseError::InvalidFormat(format!("Missing 'd' separator in '{}'", input))
        })?;

        // Parse dice count (before 'd'); "d20" means "1d20"
        let dice_count_str = &input[..d_pos];
        let dice_count: u8 = if dice_count_str.is_empty() {
            1
        } else {
            dice_count_str.parse().map_err(|_| {
                DiceParseError::InvalidFormat(format!("Invalid dice count: '{}'", dice_count_str))
            })?
        };

        if dice_count == 0 {
            return Err(DiceParseError::InvalidDiceCount);
        }

        // Parse die size and modifier (after 'd')
        let after_d = &input[d_pos + 1..];

        let (die_size_str, modifier) = if let Some(plus_pos) = after_d.find('+') {
            let die_str = &after_d[..plus_pos];
            let mod_str = &after_d[plus_pos + 1..];
            let modifier: i32 = mod_str.parse().map_err(|_| {
                DiceParseError::InvalidFormat(format!("Invalid modifier: '+{}'", mod_str))
            })?;
            (die_str, modifier)
        } else if let Some(minus_pos) = after_d.rfind('-') {
            // rfind so a trailing negative modifier wins over a '-' in the die size
            if minus_pos == 0 {
                return Err(DiceParseError::InvalidFormat(format!(
                    "Invalid die size: '{}'",
                    after_d
                )));
            }
            let die_str = &after_d[..minus_pos];
            let mod_str = &after_d[minus_pos + 1..];
            let modifier: i32 = mod_str.parse::<i32>().map_err(|_| {
                DiceParseError::InvalidFormat(format!("Invalid modifier: '-{}'", mod_str))
            })?;
            (die_str, -modifier)
        } else {
            (after_d, 0)
        };

        let die_size: u8 = die_size_str.parse().map_err(|_| {
            DiceParseError::InvalidFormat(format!("Invalid die size: '{}'", die_size_str))
        })?;

        if die_size < 2 {
            return Err(DiceParseError::InvalidDieSize);
        }

        Ok(Self {
            dice_count,
            die_size,
            modifier,
        })
    }

    /// Roll the dice using the supplied die roller.
    ///
    /// `roll_die(sides)` must return a uniform value in `1..=sides`.
    /// With advantage/disadvantage the whole pool is rolled twice and the
    /// higher/lower pool total is kept; the dropped pool is recorded so the
    /// breakdown can show it.
    pub fn roll_with<F>(&self, vantage: Vantage, mut roll_die: F) -> DiceRollResult
    where
        F: FnMut(u8) -> i32,
    {
        let roll_pool = |roll_die: &mut F| -> Vec<i32> {
            (0..self.dice_count).map(|_| roll_die(self.die_size)).collect()
        };

        let first = roll_pool(&mut roll_die);
        let (kept, dropped) = match vantage {
            Vantage::Normal => (first, None),
            Vantage::Advantage | Vantage::Disadvantage => {
                let second = roll_pool(&mut roll_die);
                let first_total: i32 = first.iter().sum();
                let second_total: i32 = second.iter().sum();
                let keep_first = match vantage {
                    Vantage::Advantage => first_total >= second_total,
                    _ => first_total <= second_total,
                };
                if keep_first {
                    (first, Some(second))
                } else {
                    (second, Some(first))
                }
            }
        };

        let dice_total: i32 = kept.iter().sum();
        let total = dice_total + self.modifier;

        DiceRollResult {
            formula: self.clone(),
            vantage,
            individual_rolls: kept,
            dropped_rolls: dropped,
            dice_total,
            modifier_applied: self.modifier,
            total,
        }
    }

    /// Get the minimum possible roll
    pub fn min_roll(&self) -> i32 {
        self.dice_count as i32 + self.modifier
    }

    /// Get the maximum possible roll
    pub fn max_roll(&self) -> i32 {
        (self.dice_count as i32 * self.die_size as i32) + self.modifier
    }

    /// Format as a display string (e.g., "1d20+5")
    pub fn display(&self) -> String {
        if self.modifier == 0 {
            format!("{}d{}", self.dice_count, self.die_size)
        } else if self.modifier > 0 {
            format!("{}d{}+{}", self.dice_count, self.die_size, self.modifier)
        } else {
            format!("{}d{}{}", self.dice_count, self.die_size, self.modifier)
        }
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Result of rolling dice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceRollResult {
    /// The formula that was rolled
    pub formula: DiceFormula,
    /// Advantage state the roll was made under
    pub vantage: Vantage,
    /// Individual die results that counted
    pub individual_rolls: Vec<i32>,
    /// The discarded pool when rolled with advantage/disadvantage
    pub dropped_rolls: Option<Vec<i32>>,
    /// Sum of counted dice before modifier
    pub dice_total: i32,
    /// Modifier that was applied
    pub modifier_applied: i32,
    /// Final total (dice_total + modifier)
    pub total: i32,
}

impl DiceRollResult {
    /// Format as a breakdown string (e.g., "1d20(14) + 5 = 19")
    pub fn breakdown(&self) -> String {
        let rolls_str = if self.individual_rolls.len() == 1 {
            format!("({})", self.individual_rolls[0])
        } else {
            let parts: Vec<String> = self.individual_rolls.iter().map(|r| r.to_string()).collect();
            format!("[{}]", parts.join(", "))
        };

        let vantage_str = match (&self.vantage, &self.dropped_rolls) {
            (Vantage::Advantage, Some(dropped)) => {
                let parts: Vec<String> = dropped.iter().map(|r| r.to_string()).collect();
                format!(" adv, dropped [{}]", parts.join(", "))
            }
            (Vantage::Disadvantage, Some(dropped)) => {
                let parts: Vec<String> = dropped.iter().map(|r| r.to_string()).collect();
                format!(" dis, dropped [{}]", parts.join(", "))
            }
            _ => String::new(),
        };

        let base = format!("{}d{}", self.formula.dice_count, self.formula.die_size);
        if self.modifier_applied == 0 {
            format!("{}{}{} = {}", base, rolls_str, vantage_str, self.total)
        } else if self.modifier_applied > 0 {
            format!(
                "{}{}{} + {} = {}",
                base, rolls_str, vantage_str, self.modifier_applied, self.total
            )
        } else {
            format!(
                "{}{}{} - {} = {}",
                base,
                rolls_str,
                vantage_str,
                -self.modifier_applied,
                self.total
            )
        }
    }

    /// The natural (unmodified) die result, for single-die rolls.
    pub fn natural(&self) -> Option<i32> {
        if self.individual_rolls.len() == 1 {
            self.individual_rolls.first().copied()
        } else {
            None
        }
    }

    /// Natural maximum on a single d20 (critical)
    pub fn is_critical(&self) -> bool {
        self.formula.die_size == 20
            && self.formula.dice_count == 1
            && self.natural() == Some(20)
    }

    /// Natural 1 on a single d20 (fumble)
    pub fn is_fumble(&self) -> bool {
        self.formula.die_size == 20 && self.formula.dice_count == 1 && self.natural() == Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Die roller that replays a fixed script of results.
    fn scripted(rolls: Vec<i32>) -> impl FnMut(u8) -> i32 {
        let mut iter = rolls.into_iter();
        move |_| iter.next().unwrap_or(1)
    }

    #[test]
    fn test_parse_simple_d20() {
        let formula = DiceFormula::parse("1d20").unwrap();
        assert_eq!(formula.dice_count, 1);
        assert_eq!(formula.die_size, 20);
        assert_eq!(formula.modifier, 0);
    }

    #[test]
    fn test_parse_shorthand_d20() {
        let formula = DiceFormula::parse("d20").unwrap();
        assert_eq!(formula.dice_count, 1);
        assert_eq!(formula.die_size, 20);
        assert_eq!(formula.modifier, 0);
    }

    #[test]
    fn test_parse_with_positive_modifier() {
        let formula = DiceFormula::parse("1d20+5").unwrap();
        assert_eq!(formula.modifier, 5);
    }

    #[test]
    fn test_parse_with_negative_modifier() {
        let formula = DiceFormula::parse("1d20-3").unwrap();
        assert_eq!(formula.modifier, -3);
    }

    #[test]
    fn test_parse_multiple_dice() {
        let formula = DiceFormula::parse("2d6+3").unwrap();
        assert_eq!(formula.dice_count, 2);
        assert_eq!(formula.die_size, 6);
        assert_eq!(formula.modifier, 3);
    }

    #[test]
    fn test_parse_case_insensitive_and_whitespace() {
        let formula = DiceFormula::parse("  1D20+5  ").unwrap();
        assert_eq!(formula.die_size, 20);
        assert_eq!(formula.modifier, 5);
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(DiceFormula::parse(""), Err(DiceParseError::Empty)));
    }

    #[test]
    fn test_parse_invalid_no_d() {
        assert!(matches!(
            DiceFormula::parse("20"),
            Err(DiceParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_invalid_zero_dice() {
        assert!(matches!(
            DiceFormula::parse("0d20"),
            Err(DiceParseError::InvalidDiceCount)
        ));
    }

    #[test]
    fn test_parse_invalid_die_size() {
        assert!(matches!(
            DiceFormula::parse("1d1"),
            Err(DiceParseError::InvalidDieSize)
        ));
    }

    #[test]
    fn test_roll_normal() {
        let formula = DiceFormula::parse("1d20+5").unwrap();
        let result = formula.roll_with(Vantage::Normal, scripted(vec![14]));
        assert_eq!(result.individual_rolls, vec![14]);
        assert_eq!(result.dice_total, 14);
        assert_eq!(result.total, 19);
        assert!(result.dropped_rolls.is_none());
    }

    #[test]
    fn test_roll_advantage_keeps_higher() {
        let formula = DiceFormula::parse("1d20").unwrap();
        let result = formula.roll_with(Vantage::Advantage, scripted(vec![7, 15]));
        assert_eq!(result.individual_rolls, vec![15]);
        assert_eq!(result.dropped_rolls, Some(vec![7]));
        assert_eq!(result.total, 15);
    }

    #[test]
    fn test_roll_disadvantage_keeps_lower() {
        let formula = DiceFormula::parse("1d20").unwrap();
        let result = formula.roll_with(Vantage::Disadvantage, scripted(vec![7, 15]));
        assert_eq!(result.individual_rolls, vec![7]);
        assert_eq!(result.dropped_rolls, Some(vec![15]));
        assert_eq!(result.total, 7);
    }

    #[test]
    fn test_advantage_applies_before_modifier() {
        let formula = DiceFormula::parse("1d20-2").unwrap();
        let result = formula.roll_with(Vantage::Advantage, scripted(vec![3, 18]));
        assert_eq!(result.dice_total, 18);
        assert_eq!(result.total, 16);
    }

    #[test]
    fn test_breakdown_single_die() {
        let formula = DiceFormula::new(1, 20, 5).unwrap();
        let result = formula.roll_with(Vantage::Normal, scripted(vec![14]));
        assert_eq!(result.breakdown(), "1d20(14) + 5 = 19");
    }

    #[test]
    fn test_breakdown_multiple_dice() {
        let formula = DiceFormula::new(2, 6, 3).unwrap();
        let result = formula.roll_with(Vantage::Normal, scripted(vec![4, 5]));
        assert_eq!(result.breakdown(), "2d6[4, 5] + 3 = 12");
    }

    #[test]
    fn test_breakdown_advantage() {
        let formula = DiceFormula::new(1, 20, 0).unwrap();
        let result = formula.roll_with(Vantage::Advantage, scripted(vec![7, 15]));
        assert_eq!(result.breakdown(), "1d20(15) adv, dropped [7] = 15");
    }

    #[test]
    fn test_critical_and_fumble() {
        let formula = DiceFormula::new(1, 20, 0).unwrap();
        let crit = formula.roll_with(Vantage::Normal, scripted(vec![20]));
        assert!(crit.is_critical());
        assert!(!crit.is_fumble());

        let fumble = formula.roll_with(Vantage::Normal, scripted(vec![1]));
        assert!(fumble.is_fumble());
        assert!(!fumble.is_critical());
    }

    #[test]
    fn test_no_critical_on_non_d20() {
        let formula = DiceFormula::new(1, 6, 0).unwrap();
        let result = formula.roll_with(Vantage::Normal, scripted(vec![6]));
        assert!(!result.is_critical());
    }

    #[test]
    fn test_min_max_roll() {
        let formula = DiceFormula::new(2, 6, 3).unwrap();
        assert_eq!(formula.min_roll(), 5);
        assert_eq!(formula.max_roll(), 15);
    }

    #[test]
    fn test_display() {
        assert_eq!(DiceFormula::new(1, 20, 0).unwrap().display(), "1d20");
        assert_eq!(DiceFormula::new(1, 20, 5).unwrap().display(), "1d20+5");
        assert_eq!(DiceFormula::new(1, 20, -3).unwrap().display(), "1d20-3");
    }
}

//! D&D 5e rules content consumed by the context builder and roll
//! fulfilment.
//!
//! Pure lookup functions with no I/O; the only failure mode is a typed
//! error for an unknown class.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Spell slots per spell level (1st..9th) for full casters, by class level.
/// Index is class level - 1.
const FULL_CASTER_SLOTS: [[u8; 9]; 20] = [
    [2, 0, 0, 0, 0, 0, 0, 0, 0], // Level 1
    [3, 0, 0, 0, 0, 0, 0, 0, 0], // Level 2
    [4, 2, 0, 0, 0, 0, 0, 0, 0], // Level 3
    [4, 3, 0, 0, 0, 0, 0, 0, 0], // Level 4
    [4, 3, 2, 0, 0, 0, 0, 0, 0], // Level 5
    [4, 3, 3, 0, 0, 0, 0, 0, 0], // Level 6
    [4, 3, 3, 1, 0, 0, 0, 0, 0], // Level 7
    [4, 3, 3, 2, 0, 0, 0, 0, 0], // Level 8
    [4, 3, 3, 3, 1, 0, 0, 0, 0], // Level 9
    [4, 3, 3, 3, 2, 0, 0, 0, 0], // Level 10
    [4, 3, 3, 3, 2, 1, 0, 0, 0], // Level 11
    [4, 3, 3, 3, 2, 1, 0, 0, 0], // Level 12
    [4, 3, 3, 3, 2, 1, 1, 0, 0], // Level 13
    [4, 3, 3, 3, 2, 1, 1, 0, 0], // Level 14
    [4, 3, 3, 3, 2, 1, 1, 1, 0], // Level 15
    [4, 3, 3, 3, 2, 1, 1, 1, 0], // Level 16
    [4, 3, 3, 3, 2, 1, 1, 1, 1], // Level 17
    [4, 3, 3, 3, 3, 1, 1, 1, 1], // Level 18
    [4, 3, 3, 3, 3, 2, 1, 1, 1], // Level 19
    [4, 3, 3, 3, 3, 2, 2, 1, 1], // Level 20
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

impl CharacterClass {
    fn is_full_caster(&self) -> bool {
        matches!(
            self,
            Self::Bard | Self::Cleric | Self::Druid | Self::Sorcerer | Self::Wizard
        )
    }

    fn is_half_caster(&self) -> bool {
        matches!(self, Self::Paladin | Self::Ranger)
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Barbarian => "barbarian",
            Self::Bard => "bard",
            Self::Cleric => "cleric",
            Self::Druid => "druid",
            Self::Fighter => "fighter",
            Self::Monk => "monk",
            Self::Paladin => "paladin",
            Self::Ranger => "ranger",
            Self::Rogue => "rogue",
            Self::Sorcerer => "sorcerer",
            Self::Warlock => "warlock",
            Self::Wizard => "wizard",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for CharacterClass {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "barbarian" => Ok(Self::Barbarian),
            "bard" => Ok(Self::Bard),
            "cleric" => Ok(Self::Cleric),
            "druid" => Ok(Self::Druid),
            "fighter" => Ok(Self::Fighter),
            "monk" => Ok(Self::Monk),
            "paladin" => Ok(Self::Paladin),
            "ranger" => Ok(Self::Ranger),
            "rogue" => Ok(Self::Rogue),
            "sorcerer" => Ok(Self::Sorcerer),
            "warlock" => Ok(Self::Warlock),
            "wizard" => Ok(Self::Wizard),
            _ => Err(DomainError::parse(format!("Unknown character class: {}", s))),
        }
    }
}

/// Ability modifier from an ability score.
///
/// D&D uses floor division, Rust's `/` rounds toward zero, so negatives
/// need the adjustment.
pub fn ability_modifier(score: i32) -> i32 {
    let diff = score - 10;
    if diff >= 0 {
        diff / 2
    } else {
        (diff - 1) / 2
    }
}

/// Proficiency bonus by character level (+2 at level 1, +6 at level 20).
pub fn proficiency_bonus(level: u8) -> i32 {
    ((level.clamp(1, 20) as i32 - 1) / 4) + 2
}

/// Spell slots per spell level (index 0 = 1st-level slots) for a class
/// at a class level. Martial classes and warlocks (pact magic) report no
/// standard slots.
pub fn spell_slots_for_level(class: CharacterClass, level: u8) -> [u8; 9] {
    if level == 0 || level > 20 {
        return [0; 9];
    }
    if class.is_full_caster() {
        FULL_CASTER_SLOTS[(level - 1) as usize]
    } else if class.is_half_caster() {
        // Half casters progress at half rate, no slots at level 1
        let effective = level / 2;
        if effective == 0 {
            [0; 9]
        } else {
            FULL_CASTER_SLOTS[(effective - 1) as usize]
        }
    } else {
        [0; 9]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ability_modifier_calculation() {
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(11), 0);
        assert_eq!(ability_modifier(12), 1);
        assert_eq!(ability_modifier(20), 5);
        assert_eq!(ability_modifier(8), -1);
        assert_eq!(ability_modifier(9), -1);
        assert_eq!(ability_modifier(7), -2);
        assert_eq!(ability_modifier(1), -5);
    }

    #[test]
    fn proficiency_bonus_progression() {
        assert_eq!(proficiency_bonus(1), 2);
        assert_eq!(proficiency_bonus(4), 2);
        assert_eq!(proficiency_bonus(5), 3);
        assert_eq!(proficiency_bonus(9), 4);
        assert_eq!(proficiency_bonus(13), 5);
        assert_eq!(proficiency_bonus(17), 6);
        assert_eq!(proficiency_bonus(20), 6);
    }

    #[test]
    fn full_caster_slots() {
        assert_eq!(
            spell_slots_for_level(CharacterClass::Wizard, 1),
            [2, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            spell_slots_for_level(CharacterClass::Cleric, 5),
            [4, 3, 2, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            spell_slots_for_level(CharacterClass::Bard, 20),
            [4, 3, 3, 3, 3, 2, 2, 1, 1]
        );
    }

    #[test]
    fn half_caster_slots() {
        assert_eq!(spell_slots_for_level(CharacterClass::Paladin, 1), [0; 9]);
        assert_eq!(
            spell_slots_for_level(CharacterClass::Ranger, 9),
            [4, 3, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn martial_classes_have_no_slots() {
        assert_eq!(spell_slots_for_level(CharacterClass::Fighter, 20), [0; 9]);
        assert_eq!(spell_slots_for_level(CharacterClass::Rogue, 10), [0; 9]);
    }

    #[test]
    fn out_of_range_levels_have_no_slots() {
        assert_eq!(spell_slots_for_level(CharacterClass::Wizard, 0), [0; 9]);
        assert_eq!(spell_slots_for_level(CharacterClass::Wizard, 21), [0; 9]);
    }

    #[test]
    fn unknown_class_is_a_parse_error() {
        assert!("artificer_homebrew".parse::<CharacterClass>().is_err());
        assert_eq!(
            "Wizard".parse::<CharacterClass>().unwrap(),
            CharacterClass::Wizard
        );
    }
}

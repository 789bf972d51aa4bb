//! Dice roll requests - gating sub-tasks that suspend turn progress.
//!
//! A request is resolved exactly once; the resolved payload is embedded
//! so a second resolution attempt can return the existing result without
//! re-rolling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::ids::{CharacterId, RollRequestId, TurnContractId};
use crate::value_objects::{DiceRollResult, Vantage};

/// What kind of check the roll represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollType {
    AbilityCheck,
    SkillCheck,
    SavingThrow,
    Attack,
    Damage,
    /// Player-initiated roll outside any narrator request.
    Voluntary,
}

impl RollType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AbilityCheck => "ability_check",
            Self::SkillCheck => "skill_check",
            Self::SavingThrow => "saving_throw",
            Self::Attack => "attack",
            Self::Damage => "damage",
            Self::Voluntary => "voluntary",
        }
    }
}

impl fmt::Display for RollType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RollType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ability_check" => Ok(Self::AbilityCheck),
            "skill_check" => Ok(Self::SkillCheck),
            "saving_throw" => Ok(Self::SavingThrow),
            "attack" => Ok(Self::Attack),
            "damage" => Ok(Self::Damage),
            "voluntary" => Ok(Self::Voluntary),
            _ => Err(DomainError::parse(format!("Unknown roll type: {}", s))),
        }
    }
}

/// The outcome stored on a resolved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollResolution {
    pub total: i32,
    pub breakdown: String,
    pub rolls: Vec<i32>,
    pub critical: bool,
    pub fumble: bool,
    /// Derived from the DC comparison; `None` when the request has no DC.
    pub success: Option<bool>,
    pub resolved_at: DateTime<Utc>,
}

/// A roll that must happen before resolution may proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceRollRequest {
    pub id: RollRequestId,
    pub turn_contract_id: TurnContractId,
    /// `None` means the host rolls on behalf of an NPC/monster.
    pub character_id: Option<CharacterId>,
    pub roll_type: RollType,
    /// Dice notation, e.g. "1d20+5".
    pub notation: String,
    pub ability: Option<String>,
    pub skill: Option<String>,
    pub dc: Option<i32>,
    pub vantage: Vantage,
    /// Display/resolution sequence hint; resolution order is otherwise
    /// unconstrained.
    pub roll_order: u32,
    pub resolution: Option<RollResolution>,
    pub created_at: DateTime<Utc>,
}

impl DiceRollRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        turn_contract_id: TurnContractId,
        character_id: Option<CharacterId>,
        roll_type: RollType,
        notation: impl Into<String>,
        ability: Option<String>,
        skill: Option<String>,
        dc: Option<i32>,
        vantage: Vantage,
        roll_order: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RollRequestId::new(),
            turn_contract_id,
            character_id,
            roll_type,
            notation: notation.into(),
            ability,
            skill,
            dc,
            vantage,
            roll_order,
            resolution: None,
            created_at: now,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Whether the host may resolve this request directly (host-controlled
    /// NPC/monster rolls).
    pub fn is_host_roll(&self) -> bool {
        self.character_id.is_none()
    }

    /// Record the dice result on this request.
    ///
    /// Success against the DC uses the modified total. Rejects a second
    /// resolution; idempotent replay is handled above this layer by
    /// returning the stored resolution.
    pub fn resolve(
        &self,
        result: &DiceRollResult,
        now: DateTime<Utc>,
    ) -> Result<DiceRollRequest, DomainError> {
        if self.is_resolved() {
            return Err(DomainError::constraint(format!(
                "Roll request {} already resolved",
                self.id
            )));
        }

        let resolution = RollResolution {
            total: result.total,
            breakdown: result.breakdown(),
            rolls: result.individual_rolls.clone(),
            critical: result.is_critical(),
            fumble: result.is_fumble(),
            success: self.dc.map(|dc| result.total >= dc),
            resolved_at: now,
        };

        let mut resolved = self.clone();
        resolved.resolution = Some(resolution);
        Ok(resolved)
    }
}

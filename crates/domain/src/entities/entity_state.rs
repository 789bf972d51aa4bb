//! Entity state - mutable combat/scene state for scene-resident actors.
//!
//! The resolution pipeline is the sole writer during turn resolution.
//! HP is always clamped to `[0, max_hp]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{EntityId, SceneId};
use crate::value_objects::NarrativeEffect;

/// Grid position within the scene map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    pub id: EntityId,
    pub scene_id: SceneId,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub conditions: Vec<String>,
    pub position: Option<Position>,
    /// Ability scores and similar sheet numbers ("STR", "DEX", "LEVEL", ...).
    pub stats: BTreeMap<String, i32>,
}

impl EntityState {
    pub fn new(scene_id: SceneId, name: impl Into<String>, max_hp: i32) -> Result<Self, DomainError> {
        if max_hp < 0 {
            return Err(DomainError::validation("max_hp cannot be negative"));
        }
        Ok(Self {
            id: EntityId::new(),
            scene_id,
            name: name.into(),
            hp: max_hp,
            max_hp,
            conditions: Vec::new(),
            position: None,
            stats: BTreeMap::new(),
        })
    }

    /// Ability score lookup with the 5e default of 10.
    pub fn stat(&self, name: &str) -> i32 {
        self.stats.get(name).copied().unwrap_or(10)
    }

    /// Apply a single narrator effect, clamping HP to `[0, max_hp]`.
    ///
    /// Negative amounts are rejected; the narrator expresses direction
    /// through the effect variant, not the sign.
    pub fn apply_effect(&self, effect: &NarrativeEffect) -> Result<EntityState, DomainError> {
        let mut next = self.clone();
        match effect {
            NarrativeEffect::EntityDamage { amount, .. } => {
                if *amount < 0 {
                    return Err(DomainError::validation("Damage amount cannot be negative"));
                }
                next.hp = (next.hp - amount).max(0);
            }
            NarrativeEffect::EntityHeal { amount, .. } => {
                if *amount < 0 {
                    return Err(DomainError::validation("Heal amount cannot be negative"));
                }
                next.hp = (next.hp + amount).min(next.max_hp);
            }
            NarrativeEffect::ConditionAdd { condition, .. } => {
                if !next.conditions.iter().any(|c| c == condition) {
                    next.conditions.push(condition.clone());
                }
            }
            NarrativeEffect::ConditionRemove { condition, .. } => {
                next.conditions.retain(|c| c != condition);
            }
            NarrativeEffect::PositionChange { x, y, .. } => {
                next.position = Some(Position { x: *x, y: *y });
            }
        }
        Ok(next)
    }

    /// Change max HP, re-clamping current HP. Negative values rejected.
    pub fn set_max_hp(&self, max_hp: i32) -> Result<EntityState, DomainError> {
        if max_hp < 0 {
            return Err(DomainError::validation("max_hp cannot be negative"));
        }
        let mut next = self.clone();
        next.max_hp = max_hp;
        next.hp = next.hp.min(max_hp);
        Ok(next)
    }
}

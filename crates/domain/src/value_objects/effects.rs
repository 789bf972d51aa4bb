//! Narrative outcome and the closed effects union.
//!
//! The narrator model returns loosely structured JSON. The engine parses
//! it into these types at the invocation boundary, before anything
//! reaches the resolution pipeline. Unknown effect tags fail the serde
//! parse (unknown variant), never passed through.

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// A single world-state effect produced by the narrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum NarrativeEffect {
    EntityDamage { entity_id: EntityId, amount: i32 },
    EntityHeal { entity_id: EntityId, amount: i32 },
    ConditionAdd { entity_id: EntityId, condition: String },
    ConditionRemove { entity_id: EntityId, condition: String },
    PositionChange { entity_id: EntityId, x: i32, y: i32 },
}

impl NarrativeEffect {
    /// The entity this effect targets.
    pub fn entity_id(&self) -> EntityId {
        match self {
            Self::EntityDamage { entity_id, .. }
            | Self::EntityHeal { entity_id, .. }
            | Self::ConditionAdd { entity_id, .. }
            | Self::ConditionRemove { entity_id, .. }
            | Self::PositionChange { entity_id, .. } => *entity_id,
        }
    }

    /// Short label used for event-log entries.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::EntityDamage { .. } => "damage",
            Self::EntityHeal { .. } => "heal",
            Self::ConditionAdd { .. } => "condition_add",
            Self::ConditionRemove { .. } => "condition_remove",
            Self::PositionChange { .. } => "position_change",
        }
    }
}

/// Validated output of one narrator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeOutcome {
    /// Player-visible narration for the turn.
    pub narrative: String,
    /// World-state effects to apply.
    #[serde(default)]
    pub effects: Vec<NarrativeEffect>,
    /// Additional event descriptions (e.g. "trap disarmed").
    #[serde(default)]
    pub events: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<NarrativeOutcome, serde_json::Error> {
        serde_json::from_str(raw)
    }

    #[test]
    fn test_parse_valid_outcome() {
        let raw = r#"{
            "narrative": "The chest creaks open.",
            "effects": [
                {"type": "entity_damage", "entity_id": "8f3c6a1e-3b77-4e1e-9a7e-111111111111", "amount": 5}
            ],
            "events": ["trap disarmed"]
        }"#;
        let outcome = parse(raw).unwrap();
        assert_eq!(outcome.effects.len(), 1);
        assert_eq!(outcome.events, vec!["trap disarmed".to_string()]);
        assert_eq!(outcome.effects[0].kind_label(), "damage");
    }

    #[test]
    fn test_unknown_effect_tag_rejected() {
        let raw = r#"{
            "narrative": "Something odd happens.",
            "effects": [
                {"type": "summon_demon", "entity_id": "8f3c6a1e-3b77-4e1e-9a7e-111111111111"}
            ]
        }"#;
        assert!(parse(raw).is_err());
    }

    #[test]
    fn test_effects_and_events_default_empty() {
        let outcome = parse(r#"{"narrative": "Nothing happens."}"#).unwrap();
        assert!(outcome.effects.is_empty());
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn test_non_json_rejected() {
        assert!(parse("The goblin attacks!").is_err());
    }
}

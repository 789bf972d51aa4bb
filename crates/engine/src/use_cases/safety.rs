//! Deterministic post-generation safety check on narrator output.
//!
//! Runs between the narrator call and effect application, while the
//! contract is still in `resolving`. A failed check rolls the turn back
//! exactly like a failed narrator call; no effect from a flagged outcome
//! ever reaches an entity.

use std::collections::HashSet;

use turnwright_domain::{EntityId, NarrativeEffect, NarrativeOutcome};

/// Effect amounts past this are treated as model runaway, not drama.
const MAX_EFFECT_AMOUNT: i32 = 1_000;

const MAX_EFFECTS_PER_TURN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyReport {
    pub safe: bool,
    pub issues: Vec<String>,
}

/// Validate a narrator outcome before any of it is applied.
///
/// Checks are structural and deterministic: empty narrative, effects
/// aimed at entities outside the scene, absurd magnitudes, and runaway
/// effect counts.
pub fn validate_outcome(
    outcome: &NarrativeOutcome,
    known_entities: &HashSet<EntityId>,
) -> SafetyReport {
    let mut issues = Vec::new();

    if outcome.narrative.trim().is_empty() {
        issues.push("narrative text is empty".to_string());
    }

    if outcome.effects.len() > MAX_EFFECTS_PER_TURN {
        issues.push(format!(
            "{} effects exceeds the per-turn limit of {}",
            outcome.effects.len(),
            MAX_EFFECTS_PER_TURN
        ));
    }

    for (index, effect) in outcome.effects.iter().enumerate() {
        if !known_entities.contains(&effect.entity_id()) {
            issues.push(format!(
                "effect {} ({}) targets unknown entity {}",
                index,
                effect.kind_label(),
                effect.entity_id()
            ));
        }

        match effect {
            NarrativeEffect::EntityDamage { amount, .. }
            | NarrativeEffect::EntityHeal { amount, .. } => {
                if *amount < 0 {
                    issues.push(format!(
                        "effect {} ({}) has negative amount {}",
                        index,
                        effect.kind_label(),
                        amount
                    ));
                } else if *amount > MAX_EFFECT_AMOUNT {
                    issues.push(format!(
                        "effect {} ({}) amount {} exceeds limit {}",
                        index,
                        effect.kind_label(),
                        amount,
                        MAX_EFFECT_AMOUNT
                    ));
                }
            }
            NarrativeEffect::ConditionAdd { condition, .. }
            | NarrativeEffect::ConditionRemove { condition, .. } => {
                if condition.trim().is_empty() {
                    issues.push(format!("effect {} has an empty condition name", index));
                }
            }
            NarrativeEffect::PositionChange { .. } => {}
        }
    }

    SafetyReport {
        safe: issues.is_empty(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(narrative: &str, effects: Vec<NarrativeEffect>) -> NarrativeOutcome {
        NarrativeOutcome {
            narrative: narrative.to_string(),
            effects,
            events: Vec::new(),
        }
    }

    #[test]
    fn test_clean_outcome_passes() {
        let entity = EntityId::new();
        let known: HashSet<EntityId> = [entity].into_iter().collect();
        let report = validate_outcome(
            &outcome(
                "The goblin staggers.",
                vec![NarrativeEffect::EntityDamage {
                    entity_id: entity,
                    amount: 5,
                }],
            ),
            &known,
        );
        assert!(report.safe);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_unknown_entity_flagged() {
        let known: HashSet<EntityId> = HashSet::new();
        let report = validate_outcome(
            &outcome(
                "Something lurches.",
                vec![NarrativeEffect::EntityHeal {
                    entity_id: EntityId::new(),
                    amount: 3,
                }],
            ),
            &known,
        );
        assert!(!report.safe);
        assert!(report.issues[0].contains("unknown entity"));
    }

    #[test]
    fn test_runaway_amount_flagged() {
        let entity = EntityId::new();
        let known: HashSet<EntityId> = [entity].into_iter().collect();
        let report = validate_outcome(
            &outcome(
                "A meteor falls.",
                vec![NarrativeEffect::EntityDamage {
                    entity_id: entity,
                    amount: 99_999,
                }],
            ),
            &known,
        );
        assert!(!report.safe);
        assert!(report.issues[0].contains("exceeds limit"));
    }

    #[test]
    fn test_empty_narrative_flagged() {
        let report = validate_outcome(&outcome("   ", vec![]), &HashSet::new());
        assert!(!report.safe);
    }

    #[test]
    fn test_multiple_issues_all_reported() {
        let entity = EntityId::new();
        let known: HashSet<EntityId> = [entity].into_iter().collect();
        let report = validate_outcome(
            &outcome(
                "",
                vec![NarrativeEffect::ConditionAdd {
                    entity_id: entity,
                    condition: "  ".into(),
                }],
            ),
            &known,
        );
        assert_eq!(report.issues.len(), 2);
    }
}

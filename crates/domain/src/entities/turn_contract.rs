//! Turn contract - the unit of work for one player-input / narration /
//! world-update cycle.
//!
//! The phase lifecycle is a small state machine:
//!
//! ```text
//! awaiting_input <-> awaiting_rolls
//!        |               |
//!        v               v
//!          resolving -> complete
//!        ^     |
//!        +-----+  (rollback on narrator failure)
//! ```
//!
//! `transition()` is a pure function. It computes the next contract value
//! with `state_version + 1`; persisting that value is the caller's job and
//! must be conditioned on the stored version still equaling the version
//! this transition was computed from (compare-and-swap). A conditioned
//! write that matches nothing is a concurrent-modification conflict.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{SceneId, TurnContractId};
use crate::value_objects::TurnMode;

/// Metadata key recording the failure kind on a rollback transition,
/// so callers can pick a retry policy without re-deriving it.
pub const META_LAST_FAILURE: &str = "last_failure";
/// Metadata key describing what the narrator is doing while `resolving`.
pub const META_AI_TASK: &str = "ai_task";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingInput,
    AwaitingRolls,
    Resolving,
    Complete,
}

impl TurnPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting_input",
            Self::AwaitingRolls => "awaiting_rolls",
            Self::Resolving => "resolving",
            Self::Complete => "complete",
        }
    }

    /// Whether `self -> target` is a legal phase change.
    pub fn can_transition_to(&self, target: TurnPhase) -> bool {
        matches!(
            (self, target),
            (Self::AwaitingInput, TurnPhase::AwaitingRolls)
                | (Self::AwaitingRolls, TurnPhase::AwaitingInput)
                | (Self::AwaitingInput, TurnPhase::Resolving)
                | (Self::AwaitingRolls, TurnPhase::Resolving)
                | (Self::Resolving, TurnPhase::Complete)
                | (Self::Resolving, TurnPhase::AwaitingInput)
        )
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TurnPhase {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_input" => Ok(Self::AwaitingInput),
            "awaiting_rolls" => Ok(Self::AwaitingRolls),
            "resolving" => Ok(Self::Resolving),
            "complete" => Ok(Self::Complete),
            _ => Err(DomainError::parse(format!("Unknown turn phase: {}", s))),
        }
    }
}

/// One active turn within a scene.
///
/// Contracts are never deleted; a completed contract is succeeded by a
/// fresh one, forming an append-only lineage per scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnContract {
    pub id: TurnContractId,
    pub scene_id: SceneId,
    /// Immutable for the contract's life, inherited from the campaign.
    pub mode: TurnMode,
    pub phase: TurnPhase,
    /// Narrative prompt shown to players for this turn.
    pub prompt: String,
    /// Optimistic concurrency token. Every successful mutation increments
    /// it by exactly 1.
    pub state_version: u64,
    /// Free-form annotations (e.g. `ai_task`, `last_failure`).
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl TurnContract {
    pub fn new(scene_id: SceneId, mode: TurnMode, prompt: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: TurnContractId::new(),
            scene_id,
            mode,
            phase: TurnPhase::AwaitingInput,
            prompt: prompt.into(),
            state_version: 0,
            metadata: BTreeMap::new(),
            created_at: now,
        }
    }

    /// Compute the contract value after a phase transition.
    ///
    /// Pure: no I/O, no clock. Returns `InvalidTransition` for an illegal
    /// pair. The metadata patch is merged over the existing annotations.
    pub fn transition(
        &self,
        target: TurnPhase,
        metadata_patch: &BTreeMap<String, String>,
    ) -> Result<TurnContract, DomainError> {
        if !self.phase.can_transition_to(target) {
            return Err(DomainError::invalid_transition(
                self.phase.as_str(),
                target.as_str(),
            ));
        }

        let mut next = self.clone();
        next.phase = target;
        next.state_version = self.state_version + 1;
        for (key, value) in metadata_patch {
            next.metadata.insert(key.clone(), value.clone());
        }
        Ok(next)
    }

    pub fn is_complete(&self) -> bool {
        self.phase == TurnPhase::Complete
    }
}

/// Convenience for single-key metadata patches.
pub fn metadata_patch(key: &str, value: impl Into<String>) -> BTreeMap<String, String> {
    let mut patch = BTreeMap::new();
    patch.insert(key.to_string(), value.into());
    patch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> TurnContract {
        TurnContract::new(SceneId::new(), TurnMode::Freeform, "The door is locked.", Utc::now())
    }

    #[test]
    fn test_new_contract_starts_awaiting_input_at_version_zero() {
        let c = contract();
        assert_eq!(c.phase, TurnPhase::AwaitingInput);
        assert_eq!(c.state_version, 0);
    }

    #[test]
    fn test_legal_transitions_increment_version_by_one() {
        let c = contract();
        let resolving = c.transition(TurnPhase::Resolving, &BTreeMap::new()).unwrap();
        assert_eq!(resolving.phase, TurnPhase::Resolving);
        assert_eq!(resolving.state_version, 1);

        let complete = resolving
            .transition(TurnPhase::Complete, &BTreeMap::new())
            .unwrap();
        assert_eq!(complete.state_version, 2);
        assert!(complete.is_complete());
    }

    #[test]
    fn test_rollback_edge_is_legal() {
        let c = contract();
        let resolving = c.transition(TurnPhase::Resolving, &BTreeMap::new()).unwrap();
        let rolled_back = resolving
            .transition(
                TurnPhase::AwaitingInput,
                &metadata_patch(META_LAST_FAILURE, "ai_invocation"),
            )
            .unwrap();
        assert_eq!(rolled_back.phase, TurnPhase::AwaitingInput);
        assert_eq!(rolled_back.state_version, 2);
        assert_eq!(
            rolled_back.metadata.get(META_LAST_FAILURE).map(String::as_str),
            Some("ai_invocation")
        );
    }

    #[test]
    fn test_rolls_edge_is_bidirectional() {
        let c = contract();
        let waiting = c
            .transition(TurnPhase::AwaitingRolls, &BTreeMap::new())
            .unwrap();
        assert_eq!(waiting.state_version, 1);
        let back = waiting
            .transition(TurnPhase::AwaitingInput, &BTreeMap::new())
            .unwrap();
        assert_eq!(back.state_version, 2);
    }

    #[test]
    fn test_illegal_transitions_name_the_pair() {
        let c = contract();
        let err = c.transition(TurnPhase::Complete, &BTreeMap::new()).unwrap_err();
        match err {
            DomainError::InvalidTransition { from, to } => {
                assert_eq!(from, "awaiting_input");
                assert_eq!(to, "complete");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_complete_is_terminal() {
        let c = contract();
        let complete = c
            .transition(TurnPhase::Resolving, &BTreeMap::new())
            .unwrap()
            .transition(TurnPhase::Complete, &BTreeMap::new())
            .unwrap();
        for target in [
            TurnPhase::AwaitingInput,
            TurnPhase::AwaitingRolls,
            TurnPhase::Resolving,
            TurnPhase::Complete,
        ] {
            assert!(complete.transition(target, &BTreeMap::new()).is_err());
        }
    }

    #[test]
    fn test_transition_is_pure() {
        let c = contract();
        let _ = c.transition(TurnPhase::Resolving, &BTreeMap::new()).unwrap();
        // Original untouched
        assert_eq!(c.phase, TurnPhase::AwaitingInput);
        assert_eq!(c.state_version, 0);
    }
}

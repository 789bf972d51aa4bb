//! Turn lifecycle: start a contract, collect input, resolve it.
//!
//! `ResolveTurn` owns the optimistic-concurrency discipline: the claim
//! into `resolving` is a compare-and-swap retried at most ONCE, and only
//! when the conflicting writer left the contract still open for input.
//! A contract already in `resolving` is someone else's in-flight
//! resolution and is never stolen.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use turnwright_domain::{
    metadata_patch, CharacterId, DomainError, PlayerInput, RollRequestId, SceneId, TurnContract,
    TurnContractId, TurnPhase, UserId, META_AI_TASK, META_LAST_FAILURE,
};

use crate::infrastructure::ports::{
    ClockPort, EntityStateStore, NarrativePort, PlayerInputStore, RepoError, RollRequestStore,
    SceneStore, TurnContractStore,
};
use crate::use_cases::aggregation::{policy_for, Readiness};
use crate::use_cases::context::build_dm_context;
use crate::use_cases::pipeline::{ApplicationReport, ApplyResolution, PipelineError};
use crate::use_cases::safety::validate_outcome;

pub const FAILURE_AI_INVOCATION: &str = "ai_invocation";
pub const FAILURE_SAFETY_VIOLATION: &str = "safety_violation";
pub const FAILURE_PARTIAL_APPLICATION: &str = "partial_application";

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Scene not found")]
    SceneNotFound,
    #[error("Turn contract not found")]
    ContractNotFound,
    #[error("User is not allowed to perform this action")]
    PermissionDenied,
    #[error("Scene already has an active turn contract")]
    ActiveContractExists,
    #[error("Input is closed while the turn is {0}")]
    InputClosed(TurnPhase),
    #[error("Turn is not ready to resolve: {reason}")]
    NotReady {
        reason: String,
        missing: Vec<CharacterId>,
        pending_rolls: Vec<RollRequestId>,
    },
    #[error("Turn contract was modified concurrently")]
    ConcurrentModification,
    #[error("Narrator invocation failed: {0}")]
    AiInvocationFailure(String),
    #[error("Narrator output failed the safety check")]
    SafetyViolation { issues: Vec<String> },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

// =============================================================================
// StartTurn
// =============================================================================

/// Open a new turn contract for a scene. Host only; one active contract
/// per scene is enforced by the store.
pub struct StartTurn {
    scenes: Arc<dyn SceneStore>,
    contracts: Arc<dyn TurnContractStore>,
    clock: Arc<dyn ClockPort>,
}

impl StartTurn {
    pub fn new(
        scenes: Arc<dyn SceneStore>,
        contracts: Arc<dyn TurnContractStore>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            scenes,
            contracts,
            clock,
        }
    }

    pub async fn execute(
        &self,
        scene_id: SceneId,
        user_id: UserId,
        prompt: String,
    ) -> Result<TurnContract, TurnError> {
        let scene = self
            .scenes
            .get(scene_id)
            .await?
            .ok_or(TurnError::SceneNotFound)?;
        if scene.host_user_id != user_id {
            return Err(TurnError::PermissionDenied);
        }

        let contract = TurnContract::new(scene_id, scene.mode, prompt, self.clock.now());
        match self.contracts.insert(contract.clone()).await {
            Ok(()) => {}
            Err(RepoError::Constraint(_)) => return Err(TurnError::ActiveContractExists),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(scene_id = %scene_id, contract_id = %contract.id, mode = %contract.mode, "turn started");
        Ok(contract)
    }
}

// =============================================================================
// SubmitInput
// =============================================================================

#[derive(Debug)]
pub struct InputAccepted {
    pub input: PlayerInput,
    pub readiness: Readiness,
    /// Roll requests still gating resolution.
    pub pending_rolls: Vec<RollRequestId>,
}

/// Record one player (or host) submission against an open contract.
pub struct SubmitInput {
    scenes: Arc<dyn SceneStore>,
    contracts: Arc<dyn TurnContractStore>,
    inputs: Arc<dyn PlayerInputStore>,
    rolls: Arc<dyn RollRequestStore>,
    clock: Arc<dyn ClockPort>,
}

impl SubmitInput {
    pub fn new(
        scenes: Arc<dyn SceneStore>,
        contracts: Arc<dyn TurnContractStore>,
        inputs: Arc<dyn PlayerInputStore>,
        rolls: Arc<dyn RollRequestStore>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            scenes,
            contracts,
            inputs,
            rolls,
            clock,
        }
    }

    pub async fn execute(
        &self,
        contract_id: TurnContractId,
        user_id: UserId,
        character_id: Option<CharacterId>,
        content: String,
    ) -> Result<InputAccepted, TurnError> {
        let contract = self
            .contracts
            .get(contract_id)
            .await?
            .ok_or(TurnError::ContractNotFound)?;

        // Input stays open through awaiting_rolls; a resolving or
        // complete turn takes no more
        match contract.phase {
            TurnPhase::AwaitingInput | TurnPhase::AwaitingRolls => {}
            phase => return Err(TurnError::InputClosed(phase)),
        }

        let scene = self
            .scenes
            .get(contract.scene_id)
            .await?
            .ok_or(TurnError::SceneNotFound)?;
        let participants = self.scenes.participants(scene.id).await?;
        let is_host = scene.host_user_id == user_id;

        match character_id {
            Some(character_id) => {
                let owns = participants
                    .iter()
                    .any(|p| p.character_id == character_id && p.user_id == user_id);
                if !owns && !is_host {
                    return Err(TurnError::PermissionDenied);
                }
            }
            None if is_host => {}
            None => return Err(TurnError::PermissionDenied),
        }

        let input = PlayerInput::new(contract_id, character_id, content, self.clock.now());
        self.inputs.append(input.clone()).await?;

        let all_inputs = self.inputs.list_for_contract(contract_id).await?;
        let active: HashSet<CharacterId> =
            participants.iter().map(|p| p.character_id).collect();
        let readiness = policy_for(contract.mode).readiness(&all_inputs, &active);
        let pending_rolls = self
            .rolls
            .unresolved_for_contract(contract_id)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        tracing::debug!(
            contract_id = %contract_id,
            ready = readiness.ready,
            "input accepted"
        );

        Ok(InputAccepted {
            input,
            readiness,
            pending_rolls,
        })
    }
}

// =============================================================================
// ResolveTurn
// =============================================================================

#[derive(Debug)]
pub struct TurnResolved {
    pub contract: TurnContract,
    pub narrative: String,
    pub report: ApplicationReport,
    /// The successor contract opened for the next beat of the scene.
    pub next_contract: TurnContract,
}

/// Claim a ready contract, invoke the narrator, and apply the outcome.
///
/// On narrator failure or a safety violation the contract rolls back to
/// `awaiting_input` with the failure recorded in metadata; no entity is
/// touched on those paths.
pub struct ResolveTurn {
    scenes: Arc<dyn SceneStore>,
    contracts: Arc<dyn TurnContractStore>,
    inputs: Arc<dyn PlayerInputStore>,
    rolls: Arc<dyn RollRequestStore>,
    entities: Arc<dyn EntityStateStore>,
    narrator: Arc<dyn NarrativePort>,
    apply: Arc<ApplyResolution>,
    clock: Arc<dyn ClockPort>,
}

impl ResolveTurn {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scenes: Arc<dyn SceneStore>,
        contracts: Arc<dyn TurnContractStore>,
        inputs: Arc<dyn PlayerInputStore>,
        rolls: Arc<dyn RollRequestStore>,
        entities: Arc<dyn EntityStateStore>,
        narrator: Arc<dyn NarrativePort>,
        apply: Arc<ApplyResolution>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            scenes,
            contracts,
            inputs,
            rolls,
            entities,
            narrator,
            apply,
            clock,
        }
    }

    /// `force` lets the host bypass the readiness check (never the roll
    /// gate).
    pub async fn execute(
        &self,
        contract_id: TurnContractId,
        user_id: UserId,
        force: bool,
    ) -> Result<TurnResolved, TurnError> {
        let contract = self
            .contracts
            .get(contract_id)
            .await?
            .ok_or(TurnError::ContractNotFound)?;
        let scene = self
            .scenes
            .get(contract.scene_id)
            .await?
            .ok_or(TurnError::SceneNotFound)?;
        let is_host = scene.host_user_id == user_id;
        if force && !is_host {
            return Err(TurnError::PermissionDenied);
        }

        match contract.phase {
            TurnPhase::AwaitingInput | TurnPhase::AwaitingRolls => {}
            TurnPhase::Resolving => return Err(TurnError::ConcurrentModification),
            TurnPhase::Complete => {
                return Err(DomainError::invalid_transition(
                    TurnPhase::Complete.as_str(),
                    TurnPhase::Resolving.as_str(),
                )
                .into())
            }
        }

        // The roll gate is absolute: zero unresolved requests before any
        // resolution attempt, forced or not
        let pending: Vec<RollRequestId> = self
            .rolls
            .unresolved_for_contract(contract_id)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        if !pending.is_empty() {
            return Err(TurnError::NotReady {
                reason: format!("{} roll request(s) unresolved", pending.len()),
                missing: Vec::new(),
                pending_rolls: pending,
            });
        }

        let participants = self.scenes.participants(scene.id).await?;
        let active: HashSet<CharacterId> =
            participants.iter().map(|p| p.character_id).collect();
        let all_inputs = self.inputs.list_for_contract(contract_id).await?;
        let policy = policy_for(contract.mode);

        if !force {
            let readiness = policy.readiness(&all_inputs, &active);
            if !readiness.ready {
                return Err(TurnError::NotReady {
                    reason: readiness.reason,
                    missing: readiness.missing,
                    pending_rolls: Vec::new(),
                });
            }
        }

        let resolving = self.claim(contract).await?;

        // A roll request can slip in between the gate check and the
        // claim. Re-check under the claim and release it on a hit, so a
        // contract never resolves over an unresolved request.
        let pending: Vec<RollRequestId> = self
            .rolls
            .unresolved_for_contract(contract_id)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        if !pending.is_empty() {
            self.release_claim(&resolving).await?;
            return Err(TurnError::NotReady {
                reason: "roll requests arrived during the resolution claim".to_string(),
                missing: Vec::new(),
                pending_rolls: pending,
            });
        }

        // Context assembly and the narrator call happen after the claim;
        // the claim is what serializes resolvers
        let counted = policy.counted_inputs(&all_inputs);
        let roll_requests = self.rolls.list_for_contract(contract_id).await?;
        let entities = self.entities.list_for_scene(scene.id).await?;
        let context = build_dm_context(
            &scene,
            &resolving,
            &counted,
            &roll_requests,
            &entities,
            &participants,
        );

        let outcome = match self.narrator.resolve_turn(context).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(contract_id = %contract_id, error = %e, "narrator failed, rolling back");
                self.rollback(&resolving, FAILURE_AI_INVOCATION).await?;
                return Err(TurnError::AiInvocationFailure(e.to_string()));
            }
        };

        let known: HashSet<_> = entities.iter().map(|e| e.id).collect();
        let safety = validate_outcome(&outcome, &known);
        if !safety.safe {
            tracing::warn!(
                contract_id = %contract_id,
                issues = safety.issues.len(),
                "narrator output failed safety check, rolling back"
            );
            self.rollback(&resolving, FAILURE_SAFETY_VIOLATION).await?;
            return Err(TurnError::SafetyViolation {
                issues: safety.issues,
            });
        }

        let applied = self.apply.execute(&scene, &resolving, &outcome).await?;

        // Open the next beat so the scene keeps moving
        let next_prompt = outcome
            .events
            .last()
            .cloned()
            .unwrap_or_else(|| "What do you do next?".to_string());
        let next_contract =
            TurnContract::new(scene.id, scene.mode, next_prompt, self.clock.now());
        self.contracts.insert(next_contract.clone()).await?;

        Ok(TurnResolved {
            contract: applied.contract,
            narrative: outcome.narrative,
            report: applied.report,
            next_contract,
        })
    }

    /// Claim the contract into `resolving` via compare-and-swap.
    ///
    /// On conflict, reload once: if the contract is still awaiting input
    /// the conflict was routine churn (a late input, a cleared roll) and
    /// the claim is retried exactly once. Any other phase ends the
    /// attempt.
    async fn claim(&self, contract: TurnContract) -> Result<TurnContract, TurnError> {
        let task_metadata = metadata_patch(META_AI_TASK, Uuid::new_v4().to_string());

        if let Some(resolving) = self.try_claim(&contract, &task_metadata).await? {
            return Ok(resolving);
        }

        let current = self
            .contracts
            .get(contract.id)
            .await?
            .ok_or(TurnError::ContractNotFound)?;
        match current.phase {
            TurnPhase::AwaitingInput => {}
            // Someone else's resolution is in flight; never steal it
            TurnPhase::Resolving => return Err(TurnError::ConcurrentModification),
            // A gating roll appeared while we were claiming
            TurnPhase::AwaitingRolls => {
                let pending = self
                    .rolls
                    .unresolved_for_contract(contract.id)
                    .await?
                    .into_iter()
                    .map(|r| r.id)
                    .collect();
                return Err(TurnError::NotReady {
                    reason: "roll requests arrived during the resolution claim".to_string(),
                    missing: Vec::new(),
                    pending_rolls: pending,
                });
            }
            TurnPhase::Complete => {
                return Err(DomainError::invalid_transition(
                    TurnPhase::Complete.as_str(),
                    TurnPhase::Resolving.as_str(),
                )
                .into())
            }
        }

        match self.try_claim(&current, &task_metadata).await? {
            Some(resolving) => Ok(resolving),
            None => Err(TurnError::ConcurrentModification),
        }
    }

    async fn try_claim(
        &self,
        contract: &TurnContract,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Option<TurnContract>, TurnError> {
        let resolving = contract.transition(TurnPhase::Resolving, metadata)?;
        let swapped = self
            .contracts
            .compare_and_swap(contract.id, contract.state_version, resolving.clone())
            .await?;
        Ok(swapped.then_some(resolving))
    }

    /// Hand the claim back without recording a failure. The requester
    /// that interrupted the claim re-runs its own phase transition.
    async fn release_claim(&self, resolving: &TurnContract) -> Result<(), TurnError> {
        let reopened = resolving.transition(TurnPhase::AwaitingInput, &BTreeMap::new())?;
        let swapped = self
            .contracts
            .compare_and_swap(resolving.id, resolving.state_version, reopened)
            .await?;
        if !swapped {
            return Err(TurnError::ConcurrentModification);
        }
        Ok(())
    }

    /// Return a resolving contract to `awaiting_input`, recording why.
    ///
    /// The resolving version is exclusively ours, so this CAS cannot
    /// race another writer; a failure here is a store invariant breach.
    async fn rollback(&self, resolving: &TurnContract, failure: &str) -> Result<(), TurnError> {
        let metadata = metadata_patch(META_LAST_FAILURE, failure);
        let rolled_back = resolving.transition(TurnPhase::AwaitingInput, &metadata)?;
        let swapped = self
            .contracts
            .compare_and_swap(resolving.id, resolving.state_version, rolled_back)
            .await?;
        if !swapped {
            return Err(TurnError::ConcurrentModification);
        }
        Ok(())
    }
}

// =============================================================================
// RecoverTurn
// =============================================================================

/// Hand a wedged `resolving` contract back to the host.
///
/// Partial effect application leaves the contract in `resolving` so the
/// winner's claim is visible; this reopens it for input with the failure
/// recorded, letting the host resolve again. Effects that already landed
/// stay landed.
pub struct RecoverTurn {
    scenes: Arc<dyn SceneStore>,
    contracts: Arc<dyn TurnContractStore>,
}

impl RecoverTurn {
    pub fn new(scenes: Arc<dyn SceneStore>, contracts: Arc<dyn TurnContractStore>) -> Self {
        Self { scenes, contracts }
    }

    pub async fn execute(
        &self,
        contract_id: TurnContractId,
        user_id: UserId,
    ) -> Result<TurnContract, TurnError> {
        let contract = self
            .contracts
            .get(contract_id)
            .await?
            .ok_or(TurnError::ContractNotFound)?;
        let scene = self
            .scenes
            .get(contract.scene_id)
            .await?
            .ok_or(TurnError::SceneNotFound)?;
        if scene.host_user_id != user_id {
            return Err(TurnError::PermissionDenied);
        }
        if contract.phase != TurnPhase::Resolving {
            return Err(TurnError::InputClosed(contract.phase));
        }

        let metadata = metadata_patch(META_LAST_FAILURE, FAILURE_PARTIAL_APPLICATION);
        let reopened = contract.transition(TurnPhase::AwaitingInput, &metadata)?;
        let swapped = self
            .contracts
            .compare_and_swap(contract_id, contract.state_version, reopened.clone())
            .await?;
        if !swapped {
            return Err(TurnError::ConcurrentModification);
        }

        tracing::info!(contract_id = %contract_id, "resolving contract handed back to the host");
        Ok(reopened)
    }
}

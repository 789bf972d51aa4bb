//! Roll request lifecycle: enqueue a gating roll, fulfill it once.
//!
//! Fulfillment is idempotent at this layer: a second fulfill call for an
//! already-resolved request returns the stored resolution unchanged
//! instead of re-rolling.

use std::collections::BTreeMap;
use std::sync::Arc;

use turnwright_domain::game_systems::dnd5e::ability_modifier;
use turnwright_domain::{
    CharacterId, ChatAuthor, ChatMessage, DiceFormula, DiceRollRequest, DomainError, EventKind,
    EventLogEntry, RollRequestId, RollType, TurnContract, TurnContractId, TurnPhase, UserId,
    Vantage,
};

use crate::infrastructure::ports::{
    ChatLogStore, ClockPort, EntityStateStore, EventLogStore, RandomPort, RepoError,
    RollRequestStore, SceneStore, TurnContractStore,
};

#[derive(Debug, thiserror::Error)]
pub enum RollError {
    #[error("Turn contract not found")]
    ContractNotFound,
    #[error("Roll request not found")]
    RollNotFound,
    #[error("Rolls cannot be requested while the turn is {0}")]
    InvalidPhase(TurnPhase),
    #[error("User is not allowed to fulfill this roll")]
    PermissionDenied,
    #[error("Turn contract was modified concurrently")]
    ConcurrentModification,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

// =============================================================================
// RequestRoll
// =============================================================================

#[derive(Debug, Clone)]
pub struct RollRequestParams {
    pub character_id: Option<CharacterId>,
    pub roll_type: RollType,
    pub notation: String,
    pub ability: Option<String>,
    pub skill: Option<String>,
    pub dc: Option<i32>,
    pub vantage: Vantage,
}

#[derive(Debug)]
pub struct RollRequested {
    pub request: DiceRollRequest,
    pub contract: TurnContract,
}

/// Enqueue a gating roll against a contract.
///
/// An `awaiting_input` contract moves to `awaiting_rolls`; a contract
/// already awaiting rolls just gains another request. Contracts in
/// `resolving` or `complete` reject new rolls.
pub struct RequestRoll {
    contracts: Arc<dyn TurnContractStore>,
    rolls: Arc<dyn RollRequestStore>,
    clock: Arc<dyn ClockPort>,
}

impl RequestRoll {
    pub fn new(
        contracts: Arc<dyn TurnContractStore>,
        rolls: Arc<dyn RollRequestStore>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            contracts,
            rolls,
            clock,
        }
    }

    pub async fn execute(
        &self,
        contract_id: TurnContractId,
        params: RollRequestParams,
    ) -> Result<RollRequested, RollError> {
        let contract = self
            .contracts
            .get(contract_id)
            .await?
            .ok_or(RollError::ContractNotFound)?;

        match contract.phase {
            TurnPhase::AwaitingInput | TurnPhase::AwaitingRolls => {}
            phase => return Err(RollError::InvalidPhase(phase)),
        }

        // Reject malformed notation before anything is stored
        DiceFormula::parse(&params.notation).map_err(DomainError::from)?;

        let roll_order = self.rolls.list_for_contract(contract_id).await?.len() as u32;
        let request = DiceRollRequest::new(
            contract_id,
            params.character_id,
            params.roll_type,
            params.notation,
            params.ability,
            params.skill,
            params.dc,
            params.vantage,
            roll_order,
            self.clock.now(),
        );
        self.rolls.insert(request.clone()).await?;

        let contract = if contract.phase == TurnPhase::AwaitingInput {
            match self.gate(contract).await {
                Ok(updated) => updated,
                Err(e) => {
                    // The gate never took effect; do not leave an
                    // orphaned request behind
                    self.rolls.delete(request.id).await?;
                    return Err(e);
                }
            }
        } else {
            contract
        };

        tracing::info!(
            contract_id = %contract_id,
            roll_type = %request.roll_type,
            notation = %request.notation,
            "roll requested"
        );

        Ok(RollRequested { request, contract })
    }

    /// Move an `awaiting_input` contract to `awaiting_rolls`.
    ///
    /// On a version conflict, reload once: another request (or a
    /// released resolution claim) may already have moved the phase, or
    /// left it open for one retry. A contract found resolving or
    /// complete means the request lost to a resolver and must not
    /// stand.
    async fn gate(&self, contract: TurnContract) -> Result<TurnContract, RollError> {
        let updated = contract.transition(TurnPhase::AwaitingRolls, &BTreeMap::new())?;
        let swapped = self
            .contracts
            .compare_and_swap(contract.id, contract.state_version, updated.clone())
            .await?;
        if swapped {
            return Ok(updated);
        }

        let current = self
            .contracts
            .get(contract.id)
            .await?
            .ok_or(RollError::ContractNotFound)?;
        match current.phase {
            TurnPhase::AwaitingRolls => Ok(current),
            TurnPhase::AwaitingInput => {
                let updated = current.transition(TurnPhase::AwaitingRolls, &BTreeMap::new())?;
                let swapped = self
                    .contracts
                    .compare_and_swap(current.id, current.state_version, updated.clone())
                    .await?;
                if swapped {
                    Ok(updated)
                } else {
                    Err(RollError::ConcurrentModification)
                }
            }
            TurnPhase::Resolving => Err(RollError::ConcurrentModification),
            phase @ TurnPhase::Complete => Err(RollError::InvalidPhase(phase)),
        }
    }
}

// =============================================================================
// FulfillRoll
// =============================================================================

#[derive(Debug)]
pub struct RollFulfilled {
    pub request: DiceRollRequest,
    /// The request was already resolved; the stored resolution was
    /// returned without re-rolling.
    pub replayed: bool,
    /// This fulfillment cleared the last gating roll and the contract
    /// moved back to `awaiting_input`.
    pub unblocked: bool,
    pub contract: TurnContract,
}

/// Roll the dice for one request and record the result.
pub struct FulfillRoll {
    scenes: Arc<dyn SceneStore>,
    contracts: Arc<dyn TurnContractStore>,
    rolls: Arc<dyn RollRequestStore>,
    entities: Arc<dyn EntityStateStore>,
    events: Arc<dyn EventLogStore>,
    chat: Arc<dyn ChatLogStore>,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
}

impl FulfillRoll {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scenes: Arc<dyn SceneStore>,
        contracts: Arc<dyn TurnContractStore>,
        rolls: Arc<dyn RollRequestStore>,
        entities: Arc<dyn EntityStateStore>,
        events: Arc<dyn EventLogStore>,
        chat: Arc<dyn ChatLogStore>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        Self {
            scenes,
            contracts,
            rolls,
            entities,
            events,
            chat,
            clock,
            random,
        }
    }

    pub async fn execute(
        &self,
        contract_id: TurnContractId,
        roll_id: RollRequestId,
        user_id: UserId,
        notation_override: Option<String>,
    ) -> Result<RollFulfilled, RollError> {
        let contract = self
            .contracts
            .get(contract_id)
            .await?
            .ok_or(RollError::ContractNotFound)?;
        let request = self
            .rolls
            .get(roll_id)
            .await?
            .ok_or(RollError::RollNotFound)?;
        if request.turn_contract_id != contract_id {
            return Err(RollError::RollNotFound);
        }

        // Idempotent replay: an already-resolved request returns the
        // stored resolution, no dice touched
        if request.is_resolved() {
            return Ok(RollFulfilled {
                request,
                replayed: true,
                unblocked: false,
                contract,
            });
        }

        let scene = self
            .scenes
            .get(contract.scene_id)
            .await?
            .ok_or(RollError::ContractNotFound)?;
        let is_host = scene.host_user_id == user_id;
        let participant = match request.character_id {
            Some(character_id) => {
                let participants = self.scenes.participants(scene.id).await?;
                let owner = participants
                    .into_iter()
                    .find(|p| p.character_id == character_id);
                match &owner {
                    Some(p) if p.user_id == user_id || is_host => {}
                    _ => return Err(RollError::PermissionDenied),
                }
                owner
            }
            // NPC/monster rolls belong to the host alone
            None if is_host => None,
            None => return Err(RollError::PermissionDenied),
        };

        let notation = notation_override.as_deref().unwrap_or(&request.notation);
        let formula = DiceFormula::parse(notation).map_err(DomainError::from)?;

        // Fold the character's ability modifier into the roll when the
        // request names an ability and the character is staged on the map
        let formula = match (&request.ability, &participant) {
            (Some(ability), Some(p)) => match p.entity_id {
                Some(entity_id) => match self.entities.get(entity_id).await? {
                    Some(entity) => {
                        let bonus = ability_modifier(entity.stat(&ability.to_uppercase()));
                        DiceFormula::new(
                            formula.dice_count,
                            formula.die_size,
                            formula.modifier + bonus,
                        )
                        .map_err(DomainError::from)?
                    }
                    None => formula,
                },
                None => formula,
            },
            _ => formula,
        };

        let result = formula.roll_with(request.vantage, |sides| self.random.roll_die(sides));
        let now = self.clock.now();
        let resolved = request.resolve(&result, now)?;

        match self.rolls.mark_resolved(resolved.clone()).await {
            Ok(()) => {}
            Err(RepoError::Constraint(_)) => {
                // Lost the race to another fulfiller; surface their result
                let stored = self
                    .rolls
                    .get(roll_id)
                    .await?
                    .ok_or(RollError::RollNotFound)?;
                return Ok(RollFulfilled {
                    request: stored,
                    replayed: true,
                    unblocked: false,
                    contract,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let breakdown = result.breakdown();
        self.events
            .append(EventLogEntry::new(
                scene.id,
                Some(contract_id),
                EventKind::RollResult,
                format!("{} roll: {}", resolved.roll_type, breakdown),
                now,
            ))
            .await?;

        let author = match resolved.character_id {
            Some(character_id) => ChatAuthor::Character { character_id },
            None => ChatAuthor::Host,
        };
        self.chat
            .append(ChatMessage::new(
                scene.id,
                Some(contract_id),
                author,
                format!("\u{1f3b2} {} ({})", breakdown, resolved.roll_type),
                now,
            ))
            .await?;

        // Clearing the last gating roll re-opens the turn for input
        let unresolved = self.rolls.unresolved_for_contract(contract_id).await?;
        let (contract, unblocked) =
            if unresolved.is_empty() && contract.phase == TurnPhase::AwaitingRolls {
                let updated = contract.transition(TurnPhase::AwaitingInput, &BTreeMap::new())?;
                let swapped = self
                    .contracts
                    .compare_and_swap(contract_id, contract.state_version, updated.clone())
                    .await?;
                if !swapped {
                    return Err(RollError::ConcurrentModification);
                }
                (updated, true)
            } else {
                (contract, false)
            };

        tracing::info!(
            contract_id = %contract_id,
            roll_id = %roll_id,
            total = result.total,
            unblocked,
            "roll fulfilled"
        );

        Ok(RollFulfilled {
            request: resolved,
            replayed: false,
            unblocked,
            contract,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use mockall::predicate::eq;
    use turnwright_domain::{SceneId, TurnMode};

    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::memory::{InMemoryEventLogStore, InMemorySceneStore};
    use crate::infrastructure::ports::{MockRollRequestStore, MockTurnContractStore, Scene};
    use crate::test_fixtures::SequenceRandom;

    fn open_contract() -> TurnContract {
        TurnContract::new(SceneId::new(), TurnMode::SinglePlayer, "prompt", Utc::now())
    }

    fn voluntary_params() -> RollRequestParams {
        RollRequestParams {
            character_id: None,
            roll_type: RollType::Voluntary,
            notation: "1d20".to_string(),
            ability: None,
            skill: None,
            dc: None,
            vantage: Vantage::Normal,
        }
    }

    #[tokio::test]
    async fn test_request_lost_to_a_resolver_does_not_linger() {
        // The resolver claims between our insert and our phase
        // transition; the request must be deleted, not left to gate a
        // contract that already resolved
        let contract = open_contract();
        let contract_id = contract.id;
        let claimed = contract
            .transition(TurnPhase::Resolving, &BTreeMap::new())
            .expect("claim");

        let mut contracts = MockTurnContractStore::new();
        let mut seq = mockall::Sequence::new();
        let initial = contract.clone();
        contracts
            .expect_get()
            .with(eq(contract_id))
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(initial.clone())));
        contracts
            .expect_compare_and_swap()
            .withf(move |id, expected, updated| {
                *id == contract_id && *expected == 0 && updated.phase == TurnPhase::AwaitingRolls
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(false));
        contracts
            .expect_get()
            .with(eq(contract_id))
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(claimed.clone())));

        let mut rolls = MockRollRequestStore::new();
        let mut roll_seq = mockall::Sequence::new();
        rolls
            .expect_list_for_contract()
            .times(1)
            .in_sequence(&mut roll_seq)
            .returning(|_| Ok(Vec::new()));
        rolls
            .expect_insert()
            .times(1)
            .in_sequence(&mut roll_seq)
            .returning(|_| Ok(()));
        rolls
            .expect_delete()
            .times(1)
            .in_sequence(&mut roll_seq)
            .returning(|_| Ok(()));

        let request_roll = RequestRoll::new(
            Arc::new(contracts),
            Arc::new(rolls),
            Arc::new(SystemClock),
        );
        let err = request_roll
            .execute(contract_id, voluntary_params())
            .await
            .expect_err("losing the race must fail the request");
        assert!(matches!(err, RollError::ConcurrentModification));
    }

    #[tokio::test]
    async fn test_malformed_notation_is_rejected_before_storing() {
        let contract = open_contract();
        let contract_id = contract.id;

        let mut contracts = MockTurnContractStore::new();
        contracts
            .expect_get()
            .with(eq(contract_id))
            .returning(move |_| Ok(Some(contract.clone())));
        // No expectations: the store must never see the request
        let rolls = MockRollRequestStore::new();

        let request_roll = RequestRoll::new(
            Arc::new(contracts),
            Arc::new(rolls),
            Arc::new(SystemClock),
        );
        let mut params = voluntary_params();
        params.notation = "twenty".to_string();
        let err = request_roll
            .execute(contract_id, params)
            .await
            .expect_err("bad notation must be rejected");
        assert!(matches!(err, RollError::Domain(_)));
    }

    #[tokio::test]
    async fn test_storage_failure_during_resolution_propagates() {
        // A failed write must not be reported as a fulfilled roll
        let scenes = Arc::new(InMemorySceneStore::new());
        let scene = Scene {
            id: SceneId::new(),
            name: "Test".to_string(),
            mode: TurnMode::SinglePlayer,
            host_user_id: UserId::new(),
        };
        scenes.insert(scene.clone()).await.expect("insert scene");

        let contract = TurnContract::new(scene.id, scene.mode, "prompt", Utc::now());
        let contract_id = contract.id;
        let request = DiceRollRequest::new(
            contract_id,
            None,
            RollType::Voluntary,
            "1d20",
            None,
            None,
            None,
            Vantage::Normal,
            0,
            Utc::now(),
        );
        let roll_id = request.id;

        let mut contracts = MockTurnContractStore::new();
        contracts
            .expect_get()
            .with(eq(contract_id))
            .returning(move |_| Ok(Some(contract.clone())));

        let mut rolls = MockRollRequestStore::new();
        rolls
            .expect_get()
            .with(eq(roll_id))
            .returning(move |_| Ok(Some(request.clone())));
        rolls
            .expect_mark_resolved()
            .times(1)
            .returning(|_| Err(RepoError::Storage("write failed".to_string())));

        let events = Arc::new(InMemoryEventLogStore::new());
        let fulfill = FulfillRoll::new(
            scenes,
            Arc::new(contracts),
            Arc::new(rolls),
            Arc::new(crate::infrastructure::memory::InMemoryEntityStateStore::new()),
            events.clone(),
            Arc::new(crate::infrastructure::memory::InMemoryChatLogStore::new()),
            Arc::new(SystemClock),
            Arc::new(SequenceRandom::new(vec![12])),
        );
        let err = fulfill
            .execute(contract_id, roll_id, scene.host_user_id, None)
            .await
            .expect_err("storage failure must propagate");
        assert!(matches!(err, RollError::Repo(RepoError::Storage(_))));
        assert!(events
            .list_for_scene(scene.id)
            .await
            .expect("list events")
            .is_empty());
    }
}

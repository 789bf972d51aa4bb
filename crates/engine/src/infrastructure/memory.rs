//! In-memory store adapters backed by DashMap.
//!
//! The default runtime persistence and the substrate for tests. The
//! compare-and-swap on turn contracts runs under the map's entry lock,
//! which gives the same semantics as a conditional `UPDATE ... WHERE
//! version = ?` against a real database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use turnwright_domain::{
    ChatMessage, ChatMessageId, DiceRollRequest, EntityId, EntityState, EventLogEntry,
    PlayerInput, RollRequestId, SceneId, TurnContract, TurnContractId,
};

use crate::infrastructure::ports::{
    ChatLogStore, EntityStateStore, EventLogStore, PlayerInputStore, RepoError, RollRequestStore,
    Scene, SceneParticipant, SceneStore, TurnContractStore,
};

// =============================================================================
// Scenes
// =============================================================================

#[derive(Default)]
pub struct InMemorySceneStore {
    scenes: DashMap<SceneId, Scene>,
    participants: DashMap<SceneId, Vec<SceneParticipant>>,
}

impl InMemorySceneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SceneStore for InMemorySceneStore {
    async fn insert(&self, scene: Scene) -> Result<(), RepoError> {
        self.scenes.insert(scene.id, scene);
        Ok(())
    }

    async fn get(&self, id: SceneId) -> Result<Option<Scene>, RepoError> {
        Ok(self.scenes.get(&id).map(|s| s.clone()))
    }

    async fn add_participant(
        &self,
        scene_id: SceneId,
        participant: SceneParticipant,
    ) -> Result<(), RepoError> {
        if !self.scenes.contains_key(&scene_id) {
            return Err(RepoError::NotFound);
        }
        self.participants
            .entry(scene_id)
            .or_default()
            .push(participant);
        Ok(())
    }

    async fn participants(&self, scene_id: SceneId) -> Result<Vec<SceneParticipant>, RepoError> {
        Ok(self
            .participants
            .get(&scene_id)
            .map(|p| p.clone())
            .unwrap_or_default())
    }
}

// =============================================================================
// Turn contracts
// =============================================================================

#[derive(Default)]
pub struct InMemoryTurnContractStore {
    contracts: DashMap<TurnContractId, TurnContract>,
    /// Scene lineage in creation order.
    by_scene: DashMap<SceneId, Vec<TurnContractId>>,
}

impl InMemoryTurnContractStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TurnContractStore for InMemoryTurnContractStore {
    async fn insert(&self, contract: TurnContract) -> Result<(), RepoError> {
        // The scene entry guard serializes concurrent inserts, so the
        // duplicate check and the insert happen under one lock.
        let mut ids = self.by_scene.entry(contract.scene_id).or_default();
        for id in ids.iter() {
            if let Some(existing) = self.contracts.get(id) {
                if !existing.is_complete() {
                    return Err(RepoError::Constraint(format!(
                        "Scene {} already has active contract {}",
                        contract.scene_id, existing.id
                    )));
                }
            }
        }
        ids.push(contract.id);
        self.contracts.insert(contract.id, contract);
        Ok(())
    }

    async fn get(&self, id: TurnContractId) -> Result<Option<TurnContract>, RepoError> {
        Ok(self.contracts.get(&id).map(|c| c.clone()))
    }

    async fn compare_and_swap(
        &self,
        id: TurnContractId,
        expected_version: u64,
        updated: TurnContract,
    ) -> Result<bool, RepoError> {
        // The entry guard holds the shard lock, making check-and-write atomic.
        let Some(mut entry) = self.contracts.get_mut(&id) else {
            return Err(RepoError::NotFound);
        };
        if entry.state_version != expected_version {
            return Ok(false);
        }
        *entry = updated;
        Ok(true)
    }

    async fn active_for_scene(
        &self,
        scene_id: SceneId,
    ) -> Result<Option<TurnContract>, RepoError> {
        let Some(ids) = self.by_scene.get(&scene_id) else {
            return Ok(None);
        };
        for id in ids.iter() {
            if let Some(contract) = self.contracts.get(id) {
                if !contract.is_complete() {
                    return Ok(Some(contract.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn lineage_for_scene(&self, scene_id: SceneId) -> Result<Vec<TurnContract>, RepoError> {
        let Some(ids) = self.by_scene.get(&scene_id) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| self.contracts.get(id).map(|c| c.clone()))
            .collect())
    }
}

// =============================================================================
// Player inputs
// =============================================================================

#[derive(Default)]
pub struct InMemoryPlayerInputStore {
    by_contract: DashMap<TurnContractId, Vec<PlayerInput>>,
}

impl InMemoryPlayerInputStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlayerInputStore for InMemoryPlayerInputStore {
    async fn append(&self, input: PlayerInput) -> Result<(), RepoError> {
        self.by_contract
            .entry(input.turn_contract_id)
            .or_default()
            .push(input);
        Ok(())
    }

    async fn list_for_contract(
        &self,
        contract_id: TurnContractId,
    ) -> Result<Vec<PlayerInput>, RepoError> {
        let mut inputs = self
            .by_contract
            .get(&contract_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        // Stable sort keeps insertion order for equal timestamps
        inputs.sort_by_key(|i| i.submitted_at);
        Ok(inputs)
    }
}

// =============================================================================
// Roll requests
// =============================================================================

#[derive(Default)]
pub struct InMemoryRollRequestStore {
    requests: DashMap<RollRequestId, DiceRollRequest>,
    by_contract: DashMap<TurnContractId, Vec<RollRequestId>>,
}

impl InMemoryRollRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RollRequestStore for InMemoryRollRequestStore {
    async fn insert(&self, request: DiceRollRequest) -> Result<(), RepoError> {
        self.by_contract
            .entry(request.turn_contract_id)
            .or_default()
            .push(request.id);
        self.requests.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: RollRequestId) -> Result<Option<DiceRollRequest>, RepoError> {
        Ok(self.requests.get(&id).map(|r| r.clone()))
    }

    async fn mark_resolved(&self, request: DiceRollRequest) -> Result<(), RepoError> {
        let Some(mut entry) = self.requests.get_mut(&request.id) else {
            return Err(RepoError::NotFound);
        };
        if entry.is_resolved() {
            return Err(RepoError::Constraint(format!(
                "Roll request {} already resolved",
                request.id
            )));
        }
        *entry = request;
        Ok(())
    }

    async fn delete(&self, id: RollRequestId) -> Result<(), RepoError> {
        if let Some((_, request)) = self.requests.remove(&id) {
            if let Some(mut ids) = self.by_contract.get_mut(&request.turn_contract_id) {
                ids.retain(|other| *other != id);
            }
        }
        Ok(())
    }

    async fn list_for_contract(
        &self,
        contract_id: TurnContractId,
    ) -> Result<Vec<DiceRollRequest>, RepoError> {
        let mut requests: Vec<DiceRollRequest> = self
            .by_contract
            .get(&contract_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.requests.get(id).map(|r| r.clone()))
                    .collect()
            })
            .unwrap_or_default();
        requests.sort_by_key(|r| r.roll_order);
        Ok(requests)
    }

    async fn unresolved_for_contract(
        &self,
        contract_id: TurnContractId,
    ) -> Result<Vec<DiceRollRequest>, RepoError> {
        let mut requests = self.list_for_contract(contract_id).await?;
        requests.retain(|r| !r.is_resolved());
        Ok(requests)
    }
}

// =============================================================================
// Entity state
// =============================================================================

#[derive(Default)]
pub struct InMemoryEntityStateStore {
    entities: DashMap<EntityId, EntityState>,
}

impl InMemoryEntityStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStateStore for InMemoryEntityStateStore {
    async fn upsert(&self, entity: EntityState) -> Result<(), RepoError> {
        self.entities.insert(entity.id, entity);
        Ok(())
    }

    async fn get(&self, id: EntityId) -> Result<Option<EntityState>, RepoError> {
        Ok(self.entities.get(&id).map(|e| e.clone()))
    }

    async fn list_for_scene(&self, scene_id: SceneId) -> Result<Vec<EntityState>, RepoError> {
        let mut entities: Vec<EntityState> = self
            .entities
            .iter()
            .filter(|e| e.scene_id == scene_id)
            .map(|e| e.clone())
            .collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entities)
    }
}

// =============================================================================
// Event log / chat
// =============================================================================

#[derive(Default)]
pub struct InMemoryEventLogStore {
    by_scene: DashMap<SceneId, Vec<EventLogEntry>>,
}

impl InMemoryEventLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLogStore for InMemoryEventLogStore {
    async fn append(&self, entry: EventLogEntry) -> Result<(), RepoError> {
        self.by_scene.entry(entry.scene_id).or_default().push(entry);
        Ok(())
    }

    async fn list_for_scene(&self, scene_id: SceneId) -> Result<Vec<EventLogEntry>, RepoError> {
        Ok(self
            .by_scene
            .get(&scene_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryChatLogStore {
    by_scene: DashMap<SceneId, Vec<ChatMessage>>,
}

impl InMemoryChatLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatLogStore for InMemoryChatLogStore {
    async fn append(&self, message: ChatMessage) -> Result<(), RepoError> {
        self.by_scene
            .entry(message.scene_id)
            .or_default()
            .push(message);
        Ok(())
    }

    async fn list_for_scene(&self, scene_id: SceneId) -> Result<Vec<ChatMessage>, RepoError> {
        Ok(self
            .by_scene
            .get(&scene_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn patch_metadata(
        &self,
        id: ChatMessageId,
        patch: BTreeMap<String, String>,
    ) -> Result<(), RepoError> {
        for mut messages in self.by_scene.iter_mut() {
            if let Some(message) = messages.iter_mut().find(|m| m.id == id) {
                for (key, value) in patch {
                    message.metadata.insert(key, value);
                }
                return Ok(());
            }
        }
        Err(RepoError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use turnwright_domain::{ChatAuthor, TurnMode, TurnPhase};

    fn contract(scene_id: SceneId) -> TurnContract {
        TurnContract::new(scene_id, TurnMode::Freeform, "prompt", Utc::now())
    }

    #[tokio::test]
    async fn test_cas_succeeds_on_matching_version() {
        let store = InMemoryTurnContractStore::new();
        let c = contract(SceneId::new());
        store.insert(c.clone()).await.unwrap();

        let next = c
            .transition(TurnPhase::Resolving, &Default::default())
            .unwrap();
        assert!(store.compare_and_swap(c.id, 0, next).await.unwrap());
        assert_eq!(
            store.get(c.id).await.unwrap().unwrap().phase,
            TurnPhase::Resolving
        );
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_version() {
        let store = InMemoryTurnContractStore::new();
        let c = contract(SceneId::new());
        store.insert(c.clone()).await.unwrap();

        let next = c
            .transition(TurnPhase::Resolving, &Default::default())
            .unwrap();
        assert!(store.compare_and_swap(c.id, 0, next.clone()).await.unwrap());
        // Second swap against the already-consumed version must lose
        assert!(!store.compare_and_swap(c.id, 0, next).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_active_contract_per_scene() {
        let store = InMemoryTurnContractStore::new();
        let scene_id = SceneId::new();
        let first = contract(scene_id);
        store.insert(first.clone()).await.unwrap();
        assert!(matches!(
            store.insert(contract(scene_id)).await,
            Err(RepoError::Constraint(_))
        ));

        // Completing the first frees the slot
        let complete = first
            .transition(TurnPhase::Resolving, &Default::default())
            .unwrap()
            .transition(TurnPhase::Complete, &Default::default())
            .unwrap();
        assert!(store.compare_and_swap(first.id, 0, complete).await.unwrap());
        store.insert(contract(scene_id)).await.unwrap();

        let lineage = store.lineage_for_scene(scene_id).await.unwrap();
        assert_eq!(lineage.len(), 2);
    }

    #[tokio::test]
    async fn test_racing_inserts_admit_one_active_contract() {
        let store = InMemoryTurnContractStore::new();
        let scene_id = SceneId::new();

        let (a, b) = tokio::join!(
            store.insert(contract(scene_id)),
            store.insert(contract(scene_id))
        );
        assert_eq!(a.is_ok() as usize + b.is_ok() as usize, 1);
        assert!(store.active_for_scene(scene_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_inputs_ordered_by_submission_time() {
        let store = InMemoryPlayerInputStore::new();
        let contract_id = TurnContractId::new();
        let t0 = Utc::now();
        let later = PlayerInput::new(contract_id, None, "second", t0 + chrono::Duration::seconds(5));
        let earlier = PlayerInput::new(contract_id, None, "first", t0);
        store.append(later).await.unwrap();
        store.append(earlier).await.unwrap();

        let inputs = store.list_for_contract(contract_id).await.unwrap();
        assert_eq!(inputs[0].content, "first");
        assert_eq!(inputs[1].content, "second");
    }

    #[tokio::test]
    async fn test_chat_metadata_patch_keeps_content() {
        let store = InMemoryChatLogStore::new();
        let scene_id = SceneId::new();
        let message = ChatMessage::new(scene_id, None, ChatAuthor::System, "narration", Utc::now());
        let id = message.id;
        store.append(message).await.unwrap();

        let mut patch = BTreeMap::new();
        patch.insert("audio_ref".to_string(), "clip-42".to_string());
        store.patch_metadata(id, patch).await.unwrap();

        let messages = store.list_for_scene(scene_id).await.unwrap();
        assert_eq!(messages[0].content, "narration");
        assert_eq!(
            messages[0].metadata.get("audio_ref").map(String::as_str),
            Some("clip-42")
        );
    }
}

//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is
//! concrete types. Ports exist for:
//! - Persistence (could swap the in-memory stores for a database)
//! - Narrative model calls (could swap Ollama -> Claude/OpenAI)
//! - Clock/Random (for testing)
//!
//! The turn-contract store's `compare_and_swap` is the optimistic
//! concurrency primitive every phase transition must go through; there
//! is no unconditional update path for contracts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use turnwright_domain::{
    game_systems::dnd5e::CharacterClass, ChatMessage, ChatMessageId, CharacterId, DiceRollRequest,
    EntityId, EntityState, EventLogEntry, NarrativeOutcome, PlayerInput, RollRequestId, SceneId,
    TurnContract, TurnContractId, TurnMode, UserId,
};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Not found")]
    NotFound,
    #[error("Constraint violated: {0}")]
    Constraint(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NarrativeError {
    #[error("Narrator request failed: {0}")]
    RequestFailed(String),
    #[error("Narrator request timed out")]
    Timeout,
    #[error("Invalid narrator response: {0}")]
    InvalidResponse(String),
}

// =============================================================================
// Infrastructure Types
// =============================================================================

/// A scene hosting one active turn-contract lineage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    /// Turn mode inherited by every contract created for this scene.
    pub mode: TurnMode,
    /// The campaign host; may force-resolve and roll for NPCs.
    pub host_user_id: UserId,
}

/// A player seat in a scene: which user controls which character.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneParticipant {
    pub character_id: CharacterId,
    pub user_id: UserId,
    pub name: String,
    /// Map entity carrying the character's combat state, when staged.
    pub entity_id: Option<EntityId>,
    pub class: Option<CharacterClass>,
    pub level: u8,
}

// =============================================================================
// Persistence Ports
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SceneStore: Send + Sync {
    async fn insert(&self, scene: Scene) -> Result<(), RepoError>;
    async fn get(&self, id: SceneId) -> Result<Option<Scene>, RepoError>;
    async fn add_participant(
        &self,
        scene_id: SceneId,
        participant: SceneParticipant,
    ) -> Result<(), RepoError>;
    async fn participants(&self, scene_id: SceneId) -> Result<Vec<SceneParticipant>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TurnContractStore: Send + Sync {
    /// Insert a fresh contract. Fails with `Constraint` if the scene
    /// already has a non-complete contract (one active contract per
    /// scene).
    async fn insert(&self, contract: TurnContract) -> Result<(), RepoError>;

    async fn get(&self, id: TurnContractId) -> Result<Option<TurnContract>, RepoError>;

    /// Conditional update keyed on the stored `state_version`.
    ///
    /// Returns `Ok(false)` when the stored version no longer equals
    /// `expected_version` - a concurrent-modification conflict the
    /// caller must handle by reloading, never by overwriting.
    async fn compare_and_swap(
        &self,
        id: TurnContractId,
        expected_version: u64,
        updated: TurnContract,
    ) -> Result<bool, RepoError>;

    /// The scene's one non-complete contract, if any.
    async fn active_for_scene(&self, scene_id: SceneId)
        -> Result<Option<TurnContract>, RepoError>;

    /// Full append-only lineage for a scene, oldest first.
    async fn lineage_for_scene(&self, scene_id: SceneId) -> Result<Vec<TurnContract>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlayerInputStore: Send + Sync {
    async fn append(&self, input: PlayerInput) -> Result<(), RepoError>;

    /// All inputs for a contract, ordered by submission time (insertion
    /// order breaks ties).
    async fn list_for_contract(
        &self,
        contract_id: TurnContractId,
    ) -> Result<Vec<PlayerInput>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RollRequestStore: Send + Sync {
    async fn insert(&self, request: DiceRollRequest) -> Result<(), RepoError>;
    async fn get(&self, id: RollRequestId) -> Result<Option<DiceRollRequest>, RepoError>;

    /// Store the resolved form of a request. Fails with `Constraint` if
    /// the stored request is already resolved (at-most-one resolution).
    async fn mark_resolved(&self, request: DiceRollRequest) -> Result<(), RepoError>;

    /// Remove a request that never took effect (its phase transition
    /// lost a version race). Removing an unknown id is a no-op.
    async fn delete(&self, id: RollRequestId) -> Result<(), RepoError>;

    async fn list_for_contract(
        &self,
        contract_id: TurnContractId,
    ) -> Result<Vec<DiceRollRequest>, RepoError>;

    /// Unresolved requests gating the contract, ordered by `roll_order`.
    async fn unresolved_for_contract(
        &self,
        contract_id: TurnContractId,
    ) -> Result<Vec<DiceRollRequest>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityStateStore: Send + Sync {
    async fn upsert(&self, entity: EntityState) -> Result<(), RepoError>;
    async fn get(&self, id: EntityId) -> Result<Option<EntityState>, RepoError>;
    async fn list_for_scene(&self, scene_id: SceneId) -> Result<Vec<EntityState>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Append-only; entries are never updated or deleted.
    async fn append(&self, entry: EventLogEntry) -> Result<(), RepoError>;
    async fn list_for_scene(&self, scene_id: SceneId) -> Result<Vec<EventLogEntry>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatLogStore: Send + Sync {
    /// Append-only; message content is never rewritten.
    async fn append(&self, message: ChatMessage) -> Result<(), RepoError>;
    async fn list_for_scene(&self, scene_id: SceneId) -> Result<Vec<ChatMessage>, RepoError>;

    /// The one sanctioned after-the-fact write: merge metadata (e.g. a
    /// lazily generated audio reference) without touching content.
    async fn patch_metadata(
        &self,
        id: ChatMessageId,
        patch: BTreeMap<String, String>,
    ) -> Result<(), RepoError>;
}

// =============================================================================
// Narrative Model Port
// =============================================================================

/// Assembled context handed to the narrator for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmContext {
    pub scene_name: String,
    /// The turn's narrative prompt.
    pub prompt: String,
    /// Counted player actions, formatted, submission order preserved.
    pub actions: Vec<String>,
    /// Breakdown lines for every resolved roll on the contract.
    pub rolls: Vec<String>,
    /// One line per scene entity (HP, conditions, position).
    pub entities: Vec<String>,
    /// Character sheet summaries (class, level, slots, key modifiers).
    pub sheets: Vec<String>,
}

/// The external narrative model: context in, structured outcome out.
///
/// Treated as slow and unreliable; callers must never hold a lock across
/// this call and must never trust the output without the safety check.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NarrativePort: Send + Sync {
    async fn resolve_turn(&self, context: DmContext) -> Result<NarrativeOutcome, NarrativeError>;
}

// =============================================================================
// Clock / Random Ports
// =============================================================================

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[cfg_attr(test, mockall::automock)]
pub trait RandomPort: Send + Sync {
    /// Uniform die roll in `1..=sides`, from a cryptographically sound
    /// source in production.
    fn roll_die(&self, sides: u8) -> i32;
}

//! Append-only records of what happened: event-log entries and chat
//! messages.
//!
//! Neither is ever mutated after creation, with one exception: a chat
//! message's metadata may be patched to attach lazily generated
//! annotations (audio references), which does not change its content.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CharacterId, ChatMessageId, EventId, SceneId, TurnContractId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Narration,
    Damage,
    Healing,
    ConditionAdded,
    ConditionRemoved,
    PositionChanged,
    RollResult,
    TurnCompleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    pub id: EventId,
    pub scene_id: SceneId,
    pub turn_contract_id: Option<TurnContractId>,
    pub kind: EventKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn new(
        scene_id: SceneId,
        turn_contract_id: Option<TurnContractId>,
        kind: EventKind,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            scene_id,
            turn_contract_id,
            kind,
            description: description.into(),
            created_at: now,
        }
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatAuthor {
    System,
    Host,
    Character { character_id: CharacterId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: ChatMessageId,
    pub scene_id: SceneId,
    pub turn_contract_id: Option<TurnContractId>,
    pub author: ChatAuthor,
    pub content: String,
    /// Patched after the fact for lazily generated annotations only.
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        scene_id: SceneId,
        turn_contract_id: Option<TurnContractId>,
        author: ChatAuthor,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ChatMessageId::new(),
            scene_id,
            turn_contract_id,
            author,
            content: content.into(),
            metadata: BTreeMap::new(),
            created_at: now,
        }
    }
}

//! Player input - one row per player submission against a contract.
//!
//! Inputs are immutable once created. The aggregation policy decides
//! which of them count; nothing ever rewrites one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CharacterId, PlayerInputId, TurnContractId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInput {
    pub id: PlayerInputId,
    pub turn_contract_id: TurnContractId,
    /// `None` for host/system inputs.
    pub character_id: Option<CharacterId>,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
}

impl PlayerInput {
    pub fn new(
        turn_contract_id: TurnContractId,
        character_id: Option<CharacterId>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PlayerInputId::new(),
            turn_contract_id,
            character_id,
            content: content.into(),
            submitted_at: now,
        }
    }

    /// Host/system input (no owning character).
    pub fn is_host(&self) -> bool {
        self.character_id.is_none()
    }
}

//! Domain entities.

mod entity_state;
mod event_log;
mod player_input;
mod roll_request;
mod turn_contract;

pub use entity_state::{EntityState, Position};
pub use event_log::{ChatAuthor, ChatMessage, EventKind, EventLogEntry};
pub use player_input::PlayerInput;
pub use roll_request::{DiceRollRequest, RollResolution, RollType};
pub use turn_contract::{
    metadata_patch, TurnContract, TurnPhase, META_AI_TASK, META_LAST_FAILURE,
};

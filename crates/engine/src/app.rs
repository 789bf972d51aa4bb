//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    clock::{SystemClock, SystemRandom},
    memory::{
        InMemoryChatLogStore, InMemoryEntityStateStore, InMemoryEventLogStore,
        InMemoryPlayerInputStore, InMemoryRollRequestStore, InMemorySceneStore,
        InMemoryTurnContractStore,
    },
    ports::{
        ChatLogStore, ClockPort, EntityStateStore, EventLogStore, NarrativePort, PlayerInputStore,
        RandomPort, RollRequestStore, SceneStore, TurnContractStore,
    },
};
use crate::use_cases::{
    ApplyResolution, FulfillRoll, RecoverTurn, RequestRoll, ResolveTurn, StartTurn, SubmitInput,
};

/// Main application state, passed to HTTP handlers via Axum state.
pub struct App {
    pub stores: Stores,
    pub use_cases: UseCases,
    pub narrator: Arc<dyn NarrativePort>,
    pub clock: Arc<dyn ClockPort>,
}

/// All persistence ports, injected as trait objects.
pub struct Stores {
    pub scenes: Arc<dyn SceneStore>,
    pub contracts: Arc<dyn TurnContractStore>,
    pub inputs: Arc<dyn PlayerInputStore>,
    pub rolls: Arc<dyn RollRequestStore>,
    pub entities: Arc<dyn EntityStateStore>,
    pub events: Arc<dyn EventLogStore>,
    pub chat: Arc<dyn ChatLogStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            scenes: Arc::new(InMemorySceneStore::new()),
            contracts: Arc::new(InMemoryTurnContractStore::new()),
            inputs: Arc::new(InMemoryPlayerInputStore::new()),
            rolls: Arc::new(InMemoryRollRequestStore::new()),
            entities: Arc::new(InMemoryEntityStateStore::new()),
            events: Arc::new(InMemoryEventLogStore::new()),
            chat: Arc::new(InMemoryChatLogStore::new()),
        }
    }
}

/// Container for all use cases.
pub struct UseCases {
    pub start_turn: Arc<StartTurn>,
    pub submit_input: Arc<SubmitInput>,
    pub resolve_turn: Arc<ResolveTurn>,
    pub recover_turn: Arc<RecoverTurn>,
    pub request_roll: Arc<RequestRoll>,
    pub fulfill_roll: Arc<FulfillRoll>,
}

impl App {
    pub fn new(
        stores: Stores,
        narrator: Arc<dyn NarrativePort>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        let apply = Arc::new(ApplyResolution::new(
            stores.contracts.clone(),
            stores.entities.clone(),
            stores.events.clone(),
            stores.chat.clone(),
            clock.clone(),
        ));

        let use_cases = UseCases {
            start_turn: Arc::new(StartTurn::new(
                stores.scenes.clone(),
                stores.contracts.clone(),
                clock.clone(),
            )),
            submit_input: Arc::new(SubmitInput::new(
                stores.scenes.clone(),
                stores.contracts.clone(),
                stores.inputs.clone(),
                stores.rolls.clone(),
                clock.clone(),
            )),
            resolve_turn: Arc::new(ResolveTurn::new(
                stores.scenes.clone(),
                stores.contracts.clone(),
                stores.inputs.clone(),
                stores.rolls.clone(),
                stores.entities.clone(),
                narrator.clone(),
                apply,
                clock.clone(),
            )),
            recover_turn: Arc::new(RecoverTurn::new(
                stores.scenes.clone(),
                stores.contracts.clone(),
            )),
            request_roll: Arc::new(RequestRoll::new(
                stores.contracts.clone(),
                stores.rolls.clone(),
                clock.clone(),
            )),
            fulfill_roll: Arc::new(FulfillRoll::new(
                stores.scenes.clone(),
                stores.contracts.clone(),
                stores.rolls.clone(),
                stores.entities.clone(),
                stores.events.clone(),
                stores.chat.clone(),
                clock.clone(),
                random,
            )),
        };

        Self {
            stores,
            use_cases,
            narrator,
            clock,
        }
    }

    /// Production wiring: in-memory stores, system clock, OS randomness.
    pub fn with_defaults(narrator: Arc<dyn NarrativePort>) -> Self {
        Self::new(
            Stores::in_memory(),
            narrator,
            Arc::new(SystemClock),
            Arc::new(SystemRandom),
        )
    }
}

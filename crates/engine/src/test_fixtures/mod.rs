//! Common test helpers: scripted ports and scene seeding.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use turnwright_domain::{
    CharacterId, EntityId, EntityState, NarrativeOutcome, SceneId, TurnMode, UserId,
};

use crate::app::{App, Stores};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::ports::{
    DmContext, NarrativeError, NarrativePort, RandomPort, Scene, SceneParticipant,
};

// =============================================================================
// Scripted ports
// =============================================================================

/// Narrator returning queued outcomes, recording every context it saw.
pub struct ScriptedNarrator {
    outcomes: Mutex<Vec<Result<NarrativeOutcome, NarrativeError>>>,
    pub contexts: Mutex<Vec<DmContext>>,
}

impl ScriptedNarrator {
    pub fn returning(outcomes: Vec<Result<NarrativeOutcome, NarrativeError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_outcome(outcome: NarrativeOutcome) -> Self {
        Self::returning(vec![Ok(outcome)])
    }

    pub fn failing() -> Self {
        Self::returning(vec![Err(NarrativeError::RequestFailed(
            "connection refused".to_string(),
        ))])
    }

    /// The contexts captured so far.
    pub fn seen_contexts(&self) -> Vec<DmContext> {
        self.contexts.lock().expect("contexts lock").clone()
    }

    /// Mutable access to the queued outcomes, for scripts assembled
    /// mid-test.
    pub fn outcomes_mut(
        &self,
    ) -> std::sync::MutexGuard<'_, Vec<Result<NarrativeOutcome, NarrativeError>>> {
        self.outcomes.lock().expect("outcomes lock")
    }
}

#[async_trait]
impl NarrativePort for ScriptedNarrator {
    async fn resolve_turn(&self, context: DmContext) -> Result<NarrativeOutcome, NarrativeError> {
        self.contexts.lock().expect("contexts lock").push(context);
        let mut outcomes = self.outcomes.lock().expect("outcomes lock");
        if outcomes.is_empty() {
            return Err(NarrativeError::RequestFailed(
                "scripted narrator exhausted".to_string(),
            ));
        }
        outcomes.remove(0)
    }
}

/// Narrator that waits before answering, to widen race windows in
/// concurrency tests.
pub struct SlowNarrator {
    inner: ScriptedNarrator,
    delay: std::time::Duration,
}

impl SlowNarrator {
    pub fn new(outcome: NarrativeOutcome, delay: std::time::Duration) -> Self {
        Self {
            inner: ScriptedNarrator::with_outcome(outcome),
            delay,
        }
    }
}

#[async_trait]
impl NarrativePort for SlowNarrator {
    async fn resolve_turn(&self, context: DmContext) -> Result<NarrativeOutcome, NarrativeError> {
        tokio::time::sleep(self.delay).await;
        self.inner.resolve_turn(context).await
    }
}

/// Die roller producing a scripted sequence, then 1s.
pub struct SequenceRandom {
    values: Mutex<Vec<i32>>,
}

impl SequenceRandom {
    pub fn new(values: Vec<i32>) -> Self {
        Self {
            values: Mutex::new(values),
        }
    }
}

impl RandomPort for SequenceRandom {
    fn roll_die(&self, _sides: u8) -> i32 {
        let mut values = self.values.lock().expect("values lock");
        if values.is_empty() {
            1
        } else {
            values.remove(0)
        }
    }
}

// =============================================================================
// Scene seeding
// =============================================================================

pub struct SeededCharacter {
    pub character_id: CharacterId,
    pub user_id: UserId,
    pub entity_id: EntityId,
}

pub struct SeededScene {
    pub scene_id: SceneId,
    pub host_user_id: UserId,
    pub characters: Vec<SeededCharacter>,
    pub npc_entity_id: EntityId,
}

/// Build an App around the given narrator and seed a scene with
/// `character_count` staged player characters (10 HP, STR 14) and one
/// NPC entity at 20 HP.
pub async fn seed_scene(
    narrator: Arc<dyn NarrativePort>,
    random: Arc<dyn RandomPort>,
    mode: TurnMode,
    character_count: usize,
) -> (App, SeededScene) {
    let app = App::new(Stores::in_memory(), narrator, Arc::new(SystemClock), random);

    let host_user_id = UserId::new();
    let scene = Scene {
        id: SceneId::new(),
        name: "Test Scene".to_string(),
        mode,
        host_user_id,
    };
    app.stores
        .scenes
        .insert(scene.clone())
        .await
        .expect("insert scene");

    let mut characters = Vec::new();
    for i in 0..character_count {
        let user_id = UserId::new();
        let mut entity = EntityState::new(scene.id, format!("Hero {}", i + 1), 10).expect("entity");
        entity.stats = BTreeMap::from([("STR".to_string(), 14), ("DEX".to_string(), 12)]);
        let entity_id = entity.id;
        app.stores
            .entities
            .upsert(entity)
            .await
            .expect("upsert entity");

        let participant = SceneParticipant {
            character_id: CharacterId::new(),
            user_id,
            name: format!("Hero {}", i + 1),
            entity_id: Some(entity_id),
            class: None,
            level: 3,
        };
        let character_id = participant.character_id;
        app.stores
            .scenes
            .add_participant(scene.id, participant)
            .await
            .expect("add participant");

        characters.push(SeededCharacter {
            character_id,
            user_id,
            entity_id,
        });
    }

    let npc = EntityState::new(scene.id, "Goblin Chief", 20).expect("npc entity");
    let npc_entity_id = npc.id;
    app.stores.entities.upsert(npc).await.expect("upsert npc");

    (
        app,
        SeededScene {
            scene_id: scene.id,
            host_user_id,
            characters,
            npc_entity_id,
        },
    )
}

/// A one-damage-effect outcome against the given entity.
pub fn damage_outcome(entity_id: EntityId, amount: i32) -> NarrativeOutcome {
    NarrativeOutcome {
        narrative: "The blow lands with a sickening crunch.".to_string(),
        effects: vec![turnwright_domain::NarrativeEffect::EntityDamage { entity_id, amount }],
        events: vec!["The goblin chief staggers back".to_string()],
    }
}

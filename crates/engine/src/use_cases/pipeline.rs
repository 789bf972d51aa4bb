//! Effect application pipeline - turns a validated narrator outcome into
//! entity mutations, log entries, and the final `resolving -> complete`
//! transition.
//!
//! Effects apply in order. A failing effect does not abort the ones that
//! follow; failures are collected into a partial-application report and
//! the contract stays in `resolving` for the host to inspect. The final
//! transition is a single compare-and-swap with NO retry: a conflict at
//! that point means something else touched a resolving contract, which
//! is never routine.

use std::collections::BTreeMap;
use std::sync::Arc;

use turnwright_domain::{
    ChatAuthor, ChatMessage, DomainError, EventKind, EventLogEntry, NarrativeEffect,
    NarrativeOutcome, TurnContract, TurnPhase,
};

use crate::infrastructure::ports::{
    ChatLogStore, ClockPort, EntityStateStore, EventLogStore, RepoError, Scene, TurnContractStore,
};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FailedEffect {
    pub index: usize,
    pub kind: String,
    pub reason: String,
}

/// What happened to each effect: `applied` lines describe successful
/// mutations, `failed` carries the ones that could not land.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct ApplicationReport {
    pub applied: Vec<String>,
    pub failed: Vec<FailedEffect>,
}

#[derive(Debug)]
pub struct ResolutionApplied {
    pub contract: TurnContract,
    pub report: ApplicationReport,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Contract is no longer in the resolving phase")]
    NotResolving,
    #[error("Turn contract was modified concurrently")]
    ConcurrentModification,
    #[error("{} of {} effects failed to apply", report.failed.len(), report.applied.len() + report.failed.len())]
    PartialApplication { report: ApplicationReport },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct ApplyResolution {
    contracts: Arc<dyn TurnContractStore>,
    entities: Arc<dyn EntityStateStore>,
    events: Arc<dyn EventLogStore>,
    chat: Arc<dyn ChatLogStore>,
    clock: Arc<dyn ClockPort>,
}

impl ApplyResolution {
    pub fn new(
        contracts: Arc<dyn TurnContractStore>,
        entities: Arc<dyn EntityStateStore>,
        events: Arc<dyn EventLogStore>,
        chat: Arc<dyn ChatLogStore>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            contracts,
            entities,
            events,
            chat,
            clock,
        }
    }

    /// Apply `outcome` against the scene and complete the contract.
    ///
    /// `contract` must be the caller's resolving snapshot; its version is
    /// the CAS precondition for the completing transition.
    pub async fn execute(
        &self,
        scene: &Scene,
        contract: &TurnContract,
        outcome: &NarrativeOutcome,
    ) -> Result<ResolutionApplied, PipelineError> {
        if contract.phase != TurnPhase::Resolving {
            return Err(PipelineError::NotResolving);
        }
        let now = self.clock.now();

        let mut report = ApplicationReport::default();
        for (index, effect) in outcome.effects.iter().enumerate() {
            match self.apply_one(scene, contract, effect, now).await? {
                Ok(line) => report.applied.push(line),
                Err(reason) => report.failed.push(FailedEffect {
                    index,
                    kind: effect.kind_label().to_string(),
                    reason,
                }),
            }
        }

        // Narrative text and narrator-authored beats land regardless of
        // effect failures; they describe what the narrator said
        self.events
            .append(EventLogEntry::new(
                scene.id,
                Some(contract.id),
                EventKind::Narration,
                outcome.narrative.clone(),
                now,
            ))
            .await?;
        for beat in &outcome.events {
            self.events
                .append(EventLogEntry::new(
                    scene.id,
                    Some(contract.id),
                    EventKind::Narration,
                    beat.clone(),
                    now,
                ))
                .await?;
        }
        self.chat
            .append(ChatMessage::new(
                scene.id,
                Some(contract.id),
                ChatAuthor::System,
                outcome.narrative.clone(),
                now,
            ))
            .await?;

        if !report.failed.is_empty() {
            tracing::warn!(
                contract_id = %contract.id,
                failed = report.failed.len(),
                applied = report.applied.len(),
                "partial effect application, contract left resolving"
            );
            return Err(PipelineError::PartialApplication { report });
        }

        let completed = contract.transition(TurnPhase::Complete, &BTreeMap::new())?;
        let swapped = self
            .contracts
            .compare_and_swap(contract.id, contract.state_version, completed.clone())
            .await?;
        if !swapped {
            return Err(PipelineError::ConcurrentModification);
        }

        self.events
            .append(EventLogEntry::new(
                scene.id,
                Some(contract.id),
                EventKind::TurnCompleted,
                format!("Turn complete: {}", contract.prompt),
                now,
            ))
            .await?;

        tracing::info!(
            contract_id = %contract.id,
            effects = report.applied.len(),
            "turn resolved"
        );

        Ok(ResolutionApplied {
            contract: completed,
            report,
        })
    }

    /// Apply one effect. The outer `Result` is infrastructure failure;
    /// the inner one is the per-effect verdict feeding the report.
    async fn apply_one(
        &self,
        scene: &Scene,
        contract: &TurnContract,
        effect: &NarrativeEffect,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Result<String, String>, RepoError> {
        let entity_id = effect.entity_id();
        let Some(entity) = self.entities.get(entity_id).await? else {
            return Ok(Err(format!("entity {} not found", entity_id)));
        };
        if entity.scene_id != scene.id {
            return Ok(Err(format!("entity {} is not in this scene", entity_id)));
        }

        let updated = match entity.apply_effect(effect) {
            Ok(updated) => updated,
            Err(e) => return Ok(Err(e.to_string())),
        };
        self.entities.upsert(updated.clone()).await?;

        let (kind, line) = match effect {
            NarrativeEffect::EntityDamage { amount, .. } => (
                EventKind::Damage,
                format!(
                    "{} takes {} damage ({} -> {} HP)",
                    entity.name, amount, entity.hp, updated.hp
                ),
            ),
            NarrativeEffect::EntityHeal { amount, .. } => (
                EventKind::Healing,
                format!(
                    "{} heals {} ({} -> {} HP)",
                    entity.name, amount, entity.hp, updated.hp
                ),
            ),
            NarrativeEffect::ConditionAdd { condition, .. } => (
                EventKind::ConditionAdded,
                format!("{} gains condition: {}", entity.name, condition),
            ),
            NarrativeEffect::ConditionRemove { condition, .. } => (
                EventKind::ConditionRemoved,
                format!("{} loses condition: {}", entity.name, condition),
            ),
            NarrativeEffect::PositionChange { x, y, .. } => (
                EventKind::PositionChanged,
                format!("{} moves to ({}, {})", entity.name, x, y),
            ),
        };

        self.events
            .append(EventLogEntry::new(
                scene.id,
                Some(contract.id),
                kind,
                line.clone(),
                now,
            ))
            .await?;

        Ok(Ok(line))
    }
}

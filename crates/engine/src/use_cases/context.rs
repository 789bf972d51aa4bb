//! DM context assembly - flattens the turn's inputs, rolls, and scene
//! state into the prompt sections the narrator consumes.

use std::collections::HashMap;

use turnwright_domain::game_systems::dnd5e::{
    ability_modifier, proficiency_bonus, spell_slots_for_level,
};
use turnwright_domain::{CharacterId, DiceRollRequest, EntityState, PlayerInput, TurnContract};

use crate::infrastructure::ports::{DmContext, Scene, SceneParticipant};

/// Build the narrator context for one turn.
///
/// `counted_inputs` must already be filtered by the aggregation policy
/// and in submission order; the builder formats, it does not select.
pub fn build_dm_context(
    scene: &Scene,
    contract: &TurnContract,
    counted_inputs: &[&PlayerInput],
    rolls: &[DiceRollRequest],
    entities: &[EntityState],
    participants: &[SceneParticipant],
) -> DmContext {
    let names: HashMap<CharacterId, &str> = participants
        .iter()
        .map(|p| (p.character_id, p.name.as_str()))
        .collect();

    let actions = counted_inputs
        .iter()
        .map(|input| {
            let who = input
                .character_id
                .and_then(|id| names.get(&id).copied())
                .unwrap_or("The DM");
            format!("{}: {}", who, input.content)
        })
        .collect();

    let rolls = rolls
        .iter()
        .filter_map(|request| format_roll(request, &names))
        .collect();

    let entity_lines = entities.iter().map(format_entity).collect();

    let sheets = participants
        .iter()
        .map(|p| {
            let staged = p
                .entity_id
                .and_then(|id| entities.iter().find(|e| e.id == id));
            format_sheet(p, staged)
        })
        .collect();

    DmContext {
        scene_name: scene.name.clone(),
        prompt: contract.prompt.clone(),
        actions,
        rolls,
        entities: entity_lines,
        sheets,
    }
}

fn format_roll(request: &DiceRollRequest, names: &HashMap<CharacterId, &str>) -> Option<String> {
    let resolution = request.resolution.as_ref()?;
    let who = request
        .character_id
        .and_then(|id| names.get(&id).copied())
        .unwrap_or("The DM");
    let mut line = format!(
        "{} rolled {} ({}): {}",
        who, request.notation, request.roll_type, resolution.breakdown
    );
    if let Some(dc) = request.dc {
        let verdict = match resolution.success {
            Some(true) => "success",
            Some(false) => "failure",
            None => "ungraded",
        };
        line.push_str(&format!(" vs DC {dc} - {verdict}"));
    }
    if resolution.critical {
        line.push_str(" (critical!)");
    } else if resolution.fumble {
        line.push_str(" (fumble!)");
    }
    Some(line)
}

fn format_entity(entity: &EntityState) -> String {
    let mut line = format!("{}: {}/{} HP", entity.name, entity.hp, entity.max_hp);
    if !entity.conditions.is_empty() {
        line.push_str(&format!(", conditions: {}", entity.conditions.join(", ")));
    }
    if let Some(position) = &entity.position {
        line.push_str(&format!(", at ({}, {})", position.x, position.y));
    }
    line
}

fn format_sheet(participant: &SceneParticipant, entity: Option<&EntityState>) -> String {
    let mut line = match participant.class {
        Some(class) => format!(
            "{}: level {} {}, proficiency +{}",
            participant.name,
            participant.level,
            class,
            proficiency_bonus(participant.level)
        ),
        None => format!("{}: level {}", participant.name, participant.level),
    };

    if let Some(class) = participant.class {
        let slots = spell_slots_for_level(class, participant.level);
        let summary: Vec<String> = slots
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(i, count)| format!("L{}x{}", i + 1, count))
            .collect();
        if !summary.is_empty() {
            line.push_str(&format!(", slots [{}]", summary.join(" ")));
        }
    }

    if let Some(entity) = entity {
        let mods: Vec<String> = ["STR", "DEX", "CON", "INT", "WIS", "CHA"]
            .iter()
            .map(|ability| format!("{} {:+}", ability, ability_modifier(entity.stat(ability))))
            .collect();
        line.push_str(&format!(", {}", mods.join(" ")));
    }

    line
}

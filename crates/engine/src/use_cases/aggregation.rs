//! Input aggregation - the per-turn-mode policy deciding when enough
//! player input has arrived to resolve, and which inputs count.
//!
//! One strategy per mode, selected once from the contract's immutable
//! `mode` field. Nothing downstream dispatches on mode strings.

use std::collections::{BTreeMap, HashSet};

use turnwright_domain::{CharacterId, PlayerInput, TurnMode};

/// Readiness verdict with the specific blocking reason when not ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    pub reason: String,
    /// Characters the policy is still waiting on (empty when ready or
    /// when the wait is not character-shaped).
    pub missing: Vec<CharacterId>,
}

impl Readiness {
    fn ready(reason: impl Into<String>) -> Self {
        Self {
            ready: true,
            reason: reason.into(),
            missing: Vec::new(),
        }
    }

    fn waiting(reason: impl Into<String>, missing: Vec<CharacterId>) -> Self {
        Self {
            ready: false,
            reason: reason.into(),
            missing,
        }
    }
}

/// Mode-specific aggregation policy.
///
/// `counted_inputs` returns the inputs that feed the narrator context,
/// in submission order; inputs outside that set stay recorded but are
/// excluded.
pub trait InputAggregationPolicy: Send + Sync {
    fn mode(&self) -> TurnMode;

    fn readiness(
        &self,
        inputs: &[PlayerInput],
        active_characters: &HashSet<CharacterId>,
    ) -> Readiness;

    fn counted_inputs<'a>(&self, inputs: &'a [PlayerInput]) -> Vec<&'a PlayerInput>;
}

/// Select the policy for a turn mode.
pub fn policy_for(mode: TurnMode) -> &'static dyn InputAggregationPolicy {
    match mode {
        TurnMode::SinglePlayer => &SinglePlayerPolicy,
        TurnMode::FirstResponseWins => &FirstResponseWinsPolicy,
        TurnMode::Vote => &VotePolicy,
        TurnMode::Freeform => &FreeformPolicy,
    }
}

// =============================================================================
// single_player
// =============================================================================

/// Ready once the host (the sole designated actor, `character_id = None`)
/// has submitted one input. Character submissions are recorded but never
/// counted.
pub struct SinglePlayerPolicy;

impl InputAggregationPolicy for SinglePlayerPolicy {
    fn mode(&self) -> TurnMode {
        TurnMode::SinglePlayer
    }

    fn readiness(&self, inputs: &[PlayerInput], _active: &HashSet<CharacterId>) -> Readiness {
        if inputs.iter().any(|i| i.is_host()) {
            Readiness::ready("host input received")
        } else {
            Readiness::waiting("waiting for the host input", Vec::new())
        }
    }

    fn counted_inputs<'a>(&self, inputs: &'a [PlayerInput]) -> Vec<&'a PlayerInput> {
        inputs.iter().find(|i| i.is_host()).into_iter().collect()
    }
}

// =============================================================================
// first_response_wins
// =============================================================================

/// Ready as soon as any eligible character has submitted; the earliest
/// submission is the turn's action, exclusively.
pub struct FirstResponseWinsPolicy;

impl InputAggregationPolicy for FirstResponseWinsPolicy {
    fn mode(&self) -> TurnMode {
        TurnMode::FirstResponseWins
    }

    fn readiness(&self, inputs: &[PlayerInput], _active: &HashSet<CharacterId>) -> Readiness {
        if inputs.iter().any(|i| i.character_id.is_some()) {
            Readiness::ready("first response received")
        } else {
            Readiness::waiting("waiting for any character to respond", Vec::new())
        }
    }

    fn counted_inputs<'a>(&self, inputs: &'a [PlayerInput]) -> Vec<&'a PlayerInput> {
        inputs
            .iter()
            .find(|i| i.character_id.is_some())
            .into_iter()
            .collect()
    }
}

// =============================================================================
// vote
// =============================================================================

/// One vote per character (their first submission). Ready when every
/// active character has voted, or a strict majority backs one choice.
/// Ties break deterministically toward the earliest-submitted choice.
pub struct VotePolicy;

impl VotePolicy {
    /// Each character's counted vote: their first submission.
    fn votes<'a>(inputs: &'a [PlayerInput]) -> Vec<&'a PlayerInput> {
        let mut seen: HashSet<CharacterId> = HashSet::new();
        let mut votes = Vec::new();
        for input in inputs {
            let Some(character_id) = input.character_id else {
                continue;
            };
            if seen.insert(character_id) {
                votes.push(input);
            }
        }
        votes
    }

    fn normalize(content: &str) -> String {
        content.trim().to_lowercase()
    }

    /// The winning choice: most votes, earliest first submission breaks
    /// ties. Returns the earliest input carrying that choice.
    fn winner<'a>(inputs: &'a [PlayerInput]) -> Option<&'a PlayerInput> {
        let votes = Self::votes(inputs);
        if votes.is_empty() {
            return None;
        }

        // choice -> (count, first input holding it); BTreeMap keeps the
        // iteration deterministic
        let mut tally: BTreeMap<String, (usize, &PlayerInput)> = BTreeMap::new();
        for vote in votes {
            let choice = Self::normalize(&vote.content);
            tally
                .entry(choice)
                .and_modify(|(count, _)| *count += 1)
                .or_insert((1, vote));
        }

        tally
            .into_values()
            .max_by(|(count_a, input_a), (count_b, input_b)| {
                count_a
                    .cmp(count_b)
                    // On equal counts the EARLIER submission wins, so compare
                    // reversed timestamps
                    .then_with(|| input_b.submitted_at.cmp(&input_a.submitted_at))
            })
            .map(|(_, input)| input)
    }
}

impl InputAggregationPolicy for VotePolicy {
    fn mode(&self) -> TurnMode {
        TurnMode::Vote
    }

    fn readiness(&self, inputs: &[PlayerInput], active: &HashSet<CharacterId>) -> Readiness {
        let votes = Self::votes(inputs);
        let voted: HashSet<CharacterId> = votes.iter().filter_map(|v| v.character_id).collect();

        let missing: Vec<CharacterId> = active.difference(&voted).copied().collect();
        if missing.is_empty() {
            return Readiness::ready("all characters voted");
        }

        // Strict majority of the active roster backing one choice closes
        // the vote early
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for vote in &votes {
            *counts.entry(Self::normalize(&vote.content)).or_default() += 1;
        }
        if let Some(top) = counts.values().max() {
            if *top * 2 > active.len() {
                return Readiness::ready("majority reached");
            }
        }

        Readiness::waiting(
            format!("waiting for {} more vote(s)", missing.len()),
            missing,
        )
    }

    fn counted_inputs<'a>(&self, inputs: &'a [PlayerInput]) -> Vec<&'a PlayerInput> {
        Self::winner(inputs).into_iter().collect()
    }
}

// =============================================================================
// freeform
// =============================================================================

/// Ready when every active character has submitted at least once (a host
/// force-resolve bypasses the wait upstream). All inputs are counted, in
/// submission order, rather than reduced to one.
pub struct FreeformPolicy;

impl InputAggregationPolicy for FreeformPolicy {
    fn mode(&self) -> TurnMode {
        TurnMode::Freeform
    }

    fn readiness(&self, inputs: &[PlayerInput], active: &HashSet<CharacterId>) -> Readiness {
        let submitted: HashSet<CharacterId> =
            inputs.iter().filter_map(|i| i.character_id).collect();
        let missing: Vec<CharacterId> = active.difference(&submitted).copied().collect();
        if missing.is_empty() {
            Readiness::ready("all characters submitted")
        } else {
            Readiness::waiting(
                format!("waiting for {} character(s)", missing.len()),
                missing,
            )
        }
    }

    fn counted_inputs<'a>(&self, inputs: &'a [PlayerInput]) -> Vec<&'a PlayerInput> {
        inputs.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use turnwright_domain::TurnContractId;

    fn input(
        contract_id: TurnContractId,
        character_id: Option<CharacterId>,
        content: &str,
        offset_secs: i64,
    ) -> PlayerInput {
        PlayerInput::new(
            contract_id,
            character_id,
            content,
            Utc::now() + Duration::seconds(offset_secs),
        )
    }

    #[test]
    fn test_single_player_waits_for_host() {
        let contract_id = TurnContractId::new();
        let characters: Vec<CharacterId> = (0..3).map(|_| CharacterId::new()).collect();
        let active: HashSet<CharacterId> = characters.iter().copied().collect();

        let mut inputs: Vec<PlayerInput> = characters
            .iter()
            .enumerate()
            .map(|(i, c)| input(contract_id, Some(*c), "act", i as i64))
            .collect();

        let policy = SinglePlayerPolicy;
        assert!(!policy.readiness(&inputs, &active).ready);

        inputs.push(input(contract_id, None, "the host acts", 10));
        let readiness = policy.readiness(&inputs, &active);
        assert!(readiness.ready);

        let counted = policy.counted_inputs(&inputs);
        assert_eq!(counted.len(), 1);
        assert!(counted[0].is_host());
    }

    #[test]
    fn test_first_response_wins_selects_earliest_exclusively() {
        let contract_id = TurnContractId::new();
        let (a, b) = (CharacterId::new(), CharacterId::new());
        let active: HashSet<CharacterId> = [a, b].into_iter().collect();

        let inputs = vec![
            input(contract_id, Some(a), "charge!", 0),
            input(contract_id, Some(b), "hide!", 1),
        ];

        let policy = FirstResponseWinsPolicy;
        assert!(policy.readiness(&inputs, &active).ready);

        let counted = policy.counted_inputs(&inputs);
        assert_eq!(counted.len(), 1);
        assert_eq!(counted[0].character_id, Some(a));
        assert_eq!(counted[0].content, "charge!");
    }

    #[test]
    fn test_vote_ready_when_all_voted() {
        let contract_id = TurnContractId::new();
        let characters: Vec<CharacterId> = (0..3).map(|_| CharacterId::new()).collect();
        let active: HashSet<CharacterId> = characters.iter().copied().collect();

        let inputs: Vec<PlayerInput> = characters
            .iter()
            .enumerate()
            .map(|(i, c)| input(contract_id, Some(*c), "go left", i as i64))
            .collect();

        assert!(VotePolicy.readiness(&inputs, &active).ready);
    }

    #[test]
    fn test_vote_majority_closes_early() {
        let contract_id = TurnContractId::new();
        let characters: Vec<CharacterId> = (0..5).map(|_| CharacterId::new()).collect();
        let active: HashSet<CharacterId> = characters.iter().copied().collect();

        // 3 of 5 back the same choice; 2 have not voted yet
        let inputs = vec![
            input(contract_id, Some(characters[0]), "go left", 0),
            input(contract_id, Some(characters[1]), "Go Left", 1),
            input(contract_id, Some(characters[2]), "go left ", 2),
        ];

        let readiness = VotePolicy.readiness(&inputs, &active);
        assert!(readiness.ready);
        assert_eq!(readiness.reason, "majority reached");
    }

    #[test]
    fn test_vote_reports_missing_characters() {
        let contract_id = TurnContractId::new();
        let characters: Vec<CharacterId> = (0..3).map(|_| CharacterId::new()).collect();
        let active: HashSet<CharacterId> = characters.iter().copied().collect();

        let inputs = vec![input(contract_id, Some(characters[0]), "wait", 0)];
        let readiness = VotePolicy.readiness(&inputs, &active);
        assert!(!readiness.ready);
        assert_eq!(readiness.missing.len(), 2);
    }

    #[test]
    fn test_vote_tie_break_is_earliest_submission() {
        let contract_id = TurnContractId::new();
        let characters: Vec<CharacterId> = (0..4).map(|_| CharacterId::new()).collect();

        // 2-2 tie; "open the door" was submitted first
        let inputs = vec![
            input(contract_id, Some(characters[0]), "open the door", 0),
            input(contract_id, Some(characters[1]), "smash the wall", 1),
            input(contract_id, Some(characters[2]), "smash the wall", 2),
            input(contract_id, Some(characters[3]), "open the door", 3),
        ];

        let counted = VotePolicy.counted_inputs(&inputs);
        assert_eq!(counted.len(), 1);
        assert_eq!(counted[0].content, "open the door");
        assert_eq!(counted[0].character_id, Some(characters[0]));
    }

    #[test]
    fn test_vote_counts_only_first_submission_per_character() {
        let contract_id = TurnContractId::new();
        let (a, b, c) = (CharacterId::new(), CharacterId::new(), CharacterId::new());

        // Character a spams the same choice; it still counts once
        let inputs = vec![
            input(contract_id, Some(a), "run", 0),
            input(contract_id, Some(a), "run", 1),
            input(contract_id, Some(a), "run", 2),
            input(contract_id, Some(b), "fight", 3),
            input(contract_id, Some(c), "fight", 4),
        ];

        let counted = VotePolicy.counted_inputs(&inputs);
        assert_eq!(counted[0].content, "fight");
    }

    #[test]
    fn test_freeform_waits_for_everyone_and_counts_all() {
        let contract_id = TurnContractId::new();
        let (a, b) = (CharacterId::new(), CharacterId::new());
        let active: HashSet<CharacterId> = [a, b].into_iter().collect();

        let mut inputs = vec![input(contract_id, Some(a), "I search the chest", 0)];
        let policy = FreeformPolicy;
        let readiness = policy.readiness(&inputs, &active);
        assert!(!readiness.ready);
        assert_eq!(readiness.missing, vec![b]);

        inputs.push(input(contract_id, Some(b), "I watch the door", 1));
        assert!(policy.readiness(&inputs, &active).ready);
        assert_eq!(policy.counted_inputs(&inputs).len(), 2);
    }

    #[test]
    fn test_policy_for_maps_every_mode() {
        for mode in [
            TurnMode::SinglePlayer,
            TurnMode::Vote,
            TurnMode::FirstResponseWins,
            TurnMode::Freeform,
        ] {
            assert_eq!(policy_for(mode).mode(), mode);
        }
    }
}

use crate::formula::eval_formula;
use crate::store::StoreHub;
use crate::types::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

// ── Bucket identity ────────────────────────────────────────────────────

/// Results are bucketed by the ordered participant list.
pub fn participant_key(players: &[String]) -> String {
    players.join(", ")
}

/// Canonical lookup key for a parameter set: sorted keys, then serialized.
/// Two parameter maps with the same contents always produce the same key,
/// regardless of how they were built up.
pub fn canonical_parameter_key(parameters: &BTreeMap<String, String>) -> String {
    serde_json::to_string(parameters).unwrap_or_else(|_| "{}".to_string())
}

// ── Reconciliation engine ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StandingsOptions {
    pub first_place_formula: String,
    pub second_place_formula: String,
    /// When set, repeated runs of the same seed within a bucket count once.
    pub dedupe_by_seed: bool,
}

impl Default for StandingsOptions {
    fn default() -> Self {
        Self {
            first_place_formula: DEFAULT_POINT_FORMULA_1.to_string(),
            second_place_formula: DEFAULT_POINT_FORMULA_2.to_string(),
            dedupe_by_seed: false,
        }
    }
}

impl StandingsOptions {
    pub fn from_config(config: &ShellConfig) -> Self {
        Self {
            first_place_formula: config.point_formula_1.clone(),
            second_place_formula: config.point_formula_2.clone(),
            dedupe_by_seed: config.dedupe_by_seed,
        }
    }
}

/// Recompute the point modifier from the full round/results history in the
/// store and persist it under its well-known key. Stateless and idempotent:
/// safe to call on every results change, and a stale pass is simply
/// overwritten by the next trigger.
///
/// The formulas stored under their keys win over the configured defaults,
/// so operators can retune scoring without touching the config file.
pub fn update_point_modifier(store: &StoreHub, options: &StandingsOptions) -> PointModifier {
    let rounds: Vec<RoundDefinition> = store.read(ROUNDS_KEY, Vec::new());
    let results: ResultsStore = store.read(RESULTS_KEY, ResultsStore::new());
    let formula_1: String = store.read(POINT_FORMULA_1_KEY, options.first_place_formula.clone());
    let formula_2: String = store.read(POINT_FORMULA_2_KEY, options.second_place_formula.clone());

    let modifier = compute_point_modifier(
        &rounds,
        &results,
        &formula_1,
        &formula_2,
        options.dedupe_by_seed,
    );
    store.write(POINT_MODIFIER_KEY, &modifier);
    modifier
}

/// Pure recomputation core: replay every round against the recorded
/// results. Rounds without a result bucket have not been played and
/// contribute nothing.
pub fn compute_point_modifier(
    rounds: &[RoundDefinition],
    results: &ResultsStore,
    formula_1: &str,
    formula_2: &str,
    dedupe_by_seed: bool,
) -> PointModifier {
    let mut modifier = PointModifier::new();
    for round in rounds {
        let bucket = results
            .get(&participant_key(&round.players))
            .and_then(|by_params| by_params.get(&canonical_parameter_key(&round.parameters)));
        let bucket = match bucket {
            Some(bucket) => bucket,
            None => continue,
        };
        let mut seen_seeds = HashSet::new();
        for result in bucket {
            if dedupe_by_seed && !seen_seeds.insert(result.seed.as_str()) {
                continue;
            }
            apply_result(&mut modifier, round, result, formula_1, formula_2);
        }
    }
    modifier
}

fn apply_result(
    modifier: &mut PointModifier,
    round: &RoundDefinition,
    result: &MatchResult,
    formula_1: &str,
    formula_2: &str,
) {
    let n = round.players.len() as f64;
    if let Some(winner) = placed_player(round, result, 0) {
        let winner = winner.clone();
        modifier.entry(winner.clone()).or_insert(0.0);
        add_contribution(modifier, &winner, formula_1, n, &result.seed);
    }
    if let Some(runner_up) = placed_player(round, result, 1) {
        let runner_up = runner_up.clone();
        modifier.entry(runner_up.clone()).or_insert(0.0);
        add_contribution(modifier, &runner_up, formula_2, n, &result.seed);
    }
}

fn placed_player<'a>(
    round: &'a RoundDefinition,
    result: &MatchResult,
    place: usize,
) -> Option<&'a String> {
    let slot = *result.places.get(place)?;
    let player = round.players.get(slot);
    if player.is_none() {
        warn!(
            "result seed {:?}: place {place} names slot {slot}, outside the {} recorded players",
            result.seed,
            round.players.len()
        );
    }
    player
}

// A broken formula contributes zero for this pair and the pass carries on.
fn add_contribution(modifier: &mut PointModifier, player: &str, formula: &str, n: f64, seed: &str) {
    match eval_formula(formula, n) {
        Ok(points) => {
            *modifier.entry(player.to_string()).or_insert(0.0) += points;
        }
        Err(e) => {
            warn!("scoring formula {formula:?} failed for seed {seed:?}: {e}");
        }
    }
}

// ── Projected standings ────────────────────────────────────────────────

/// Zero-based rank of `team` once the point modifier is layered on top of
/// official points. `None` when the team is not in the table.
pub fn rank_of(teams: &[TeamStanding], modifier: &PointModifier, team: &str) -> Option<usize> {
    let projected =
        |t: &TeamStanding| t.points + modifier.get(&t.name).copied().unwrap_or(0.0);
    let mut sorted: Vec<&TeamStanding> = teams.iter().collect();
    sorted.sort_by(|a, b| {
        projected(b)
            .partial_cmp(&projected(a))
            .unwrap_or(Ordering::Equal)
    });
    sorted.iter().position(|t| t.name == team)
}

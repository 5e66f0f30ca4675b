use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ── Constants ──────────────────────────────────────────────────────────

// Stable key namespace shared with the UI layer. Other components address
// persisted state by these names, so they must never change silently.
pub const ROUNDS_KEY: &str = "Rounds";
pub const RESULTS_KEY: &str = "Results";
pub const POINT_MODIFIER_KEY: &str = "Point Modifier";
pub const POINT_FORMULA_1_KEY: &str = "Point Formula 1";
pub const POINT_FORMULA_2_KEY: &str = "Point Formula 2";
pub const CURRENT_ROUND_KEY: &str = "Current Round";

pub const DEFAULT_POINT_FORMULA_1: &str = "2";
pub const DEFAULT_POINT_FORMULA_2: &str = "1";
pub const SIMULATION_RETRY_MS: u64 = 500;
pub const STORE_WATCH_INTERVAL_MS: u64 = 1000;

// ── Tournament domain types ────────────────────────────────────────────

/// One scheduled match: who plays (order = assigned slot) and under which
/// parameter set (map, difficulty, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundDefinition {
    pub players: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// One completed simulation outcome. `places[0]` is the slot index of the
/// winner. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub seed: String,
    pub places: Vec<usize>,
    #[serde(default)]
    pub statistics: BTreeMap<String, f64>,
}

/// participant key -> canonical parameter key -> results, oldest first.
pub type ResultsStore = HashMap<String, HashMap<String, Vec<MatchResult>>>;

/// Derived standings delta per participant. Fully recomputed on every
/// results change, never updated incrementally.
pub type PointModifier = HashMap<String, f64>;

/// Officially saved points for one team, as the admin panel stores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamStanding {
    pub name: String,
    pub points: f64,
}

// ── Ingestion / runtime boundary types ─────────────────────────────────

/// Outcome report delivered by the simulation runtime when a match ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub player_names: Vec<String>,
    pub seed: String,
    pub places: Vec<usize>,
    #[serde(default)]
    pub statistics: BTreeMap<String, f64>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub verbose: bool,
}

/// Everything the simulation runtime needs to start one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub parameters: BTreeMap<String, String>,
    pub player_payloads: Vec<String>,
    pub player_names: Vec<String>,
    pub headless: bool,
    pub interactive: bool,
    pub verbose: bool,
    pub seed: String,
}

// ── Config types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShellConfig {
    pub storage_path: String,
    pub point_formula_1: String,
    pub point_formula_2: String,
    pub dedupe_by_seed: bool,
    pub standings_server_addr: String,
    pub overlay_dir: String,
    pub store_watch_interval_ms: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            storage_path: "local_store.json".to_string(),
            point_formula_1: DEFAULT_POINT_FORMULA_1.to_string(),
            point_formula_2: DEFAULT_POINT_FORMULA_2.to_string(),
            dedupe_by_seed: false,
            standings_server_addr: "127.0.0.1:17920".to_string(),
            overlay_dir: "overlay".to_string(),
            store_watch_interval_ms: STORE_WATCH_INTERVAL_MS,
        }
    }
}

use crate::config::append_results_journal;
use crate::standings::{canonical_parameter_key, participant_key, update_point_modifier, StandingsOptions};
use crate::store::StoreHub;
use crate::types::*;
use std::{
    collections::BTreeMap,
    sync::Arc,
    thread,
    time::Duration,
};
use tracing::{debug, info};

// ── Integration seams ──────────────────────────────────────────────────

/// Callback surface toward the UI layer. Injected at construction instead
/// of reaching for ambient globals, so the core runs without a shell.
pub trait ShellNotifier: Send + Sync {
    fn winner_announced(&self, winner: &str, verbose: bool);
}

/// Invocation contract of the externally loaded simulation runtime. The
/// bridge is expected to fail while the runtime is still loading.
pub trait RuntimeBridge: Send + Sync {
    fn invoke_simulation(&self, request: &SimulationRequest) -> Result<(), String>;
}

// ── Results ingestion ──────────────────────────────────────────────────

/// Receives match outcomes from the runtime, appends them to the results
/// store, recomputes the point modifier and announces the winner.
pub struct ResultsRecorder {
    store: StoreHub,
    notifier: Arc<dyn ShellNotifier>,
    options: StandingsOptions,
}

impl ResultsRecorder {
    pub fn new(store: StoreHub, notifier: Arc<dyn ShellNotifier>, options: StandingsOptions) -> Self {
        Self { store, notifier, options }
    }

    pub fn record(&self, report: &MatchReport) -> Result<(), String> {
        if report.player_names.is_empty() {
            return Err("Match report names no players.".to_string());
        }
        if report.places.is_empty() {
            return Err("Match report records no places.".to_string());
        }
        let winner_slot = report.places[0];
        let winner = report
            .player_names
            .get(winner_slot)
            .ok_or_else(|| format!("Winner slot {winner_slot} is outside the player list."))?
            .clone();

        let bucket_key = participant_key(&report.player_names);
        let mut results: ResultsStore = self.store.read(RESULTS_KEY, ResultsStore::new());
        results
            .entry(bucket_key.clone())
            .or_default()
            .entry(canonical_parameter_key(&report.parameters))
            .or_default()
            .push(MatchResult {
                seed: report.seed.clone(),
                places: report.places.clone(),
                statistics: report.statistics.clone(),
            });
        self.store.write(RESULTS_KEY, &results);
        append_results_journal(
            &bucket_key,
            &serde_json::to_string(report).unwrap_or_default(),
        );

        update_point_modifier(&self.store, &self.options);
        debug!("recorded result seed {:?} for {bucket_key:?}", report.seed);

        self.notifier.winner_announced(&winner, report.verbose);
        Ok(())
    }
}

// ── Simulation invocation ──────────────────────────────────────────────

/// Build a headless run request: bot names resolve to their uploaded
/// payloads, `"None"` slots play with an empty payload.
pub fn headless_request(
    parameters: BTreeMap<String, String>,
    bots: &BTreeMap<String, String>,
    player_bots: &[String],
    verbose: bool,
    seed: String,
) -> SimulationRequest {
    let player_payloads = player_bots
        .iter()
        .map(|name| {
            if name == "None" {
                String::new()
            } else {
                bots.get(name).cloned().unwrap_or_default()
            }
        })
        .collect();
    SimulationRequest {
        parameters,
        player_payloads,
        player_names: player_bots.to_vec(),
        headless: true,
        interactive: false,
        verbose,
        seed,
    }
}

/// Keep handing `request` to the bridge on a fixed delay until it accepts.
/// The runtime loads at its own pace, so there is no attempt cap; callers
/// that need a bound run this on a thread via `spawn_simulation`.
pub fn run_simulation_with_retry(
    bridge: &dyn RuntimeBridge,
    request: &SimulationRequest,
    retry_delay: Duration,
) {
    loop {
        match bridge.invoke_simulation(request) {
            Ok(()) => return,
            Err(e) => {
                info!("Simulation runtime not ready ({e}), retrying in {retry_delay:?}");
                thread::sleep(retry_delay);
            }
        }
    }
}

pub fn spawn_simulation(bridge: Arc<dyn RuntimeBridge>, request: SimulationRequest) {
    thread::spawn(move || {
        run_simulation_with_retry(
            bridge.as_ref(),
            &request,
            Duration::from_millis(SIMULATION_RETRY_MS),
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        announced: Mutex<Vec<(String, bool)>>,
    }

    impl ShellNotifier for RecordingNotifier {
        fn winner_announced(&self, winner: &str, verbose: bool) {
            self.announced.lock().unwrap().push((winner.to_string(), verbose));
        }
    }

    struct FlakyBridge {
        attempts: AtomicUsize,
        failures_before_ready: usize,
    }

    impl RuntimeBridge for FlakyBridge {
        fn invoke_simulation(&self, _request: &SimulationRequest) -> Result<(), String> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures_before_ready {
                Err("runtime still loading".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn forest_report(players: &[&str], seed: &str, places: &[usize]) -> MatchReport {
        MatchReport {
            player_names: players.iter().map(|p| p.to_string()).collect(),
            seed: seed.to_string(),
            places: places.to_vec(),
            statistics: BTreeMap::new(),
            parameters: [("map".to_string(), "Forest".to_string())].into(),
            verbose: true,
        }
    }

    #[test]
    fn test_record_appends_recomputes_and_announces() {
        let store = StoreHub::in_memory();
        store.write(
            ROUNDS_KEY,
            &vec![RoundDefinition {
                players: vec!["Alpha".to_string(), "Beta".to_string()],
                parameters: [("map".to_string(), "Forest".to_string())].into(),
            }],
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let recorder = ResultsRecorder::new(
            store.clone(),
            notifier.clone(),
            StandingsOptions::default(),
        );

        recorder.record(&forest_report(&["Alpha", "Beta"], "1", &[0, 1])).unwrap();

        let results: ResultsStore = store.read(RESULTS_KEY, ResultsStore::new());
        let bucket = &results["Alpha, Beta"][r#"{"map":"Forest"}"#];
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket[0].seed, "1");

        let modifier: PointModifier = store.read(POINT_MODIFIER_KEY, PointModifier::new());
        assert_eq!(modifier.get("Alpha"), Some(&2.0));
        assert_eq!(modifier.get("Beta"), Some(&1.0));

        let announced = notifier.announced.lock().unwrap();
        assert_eq!(announced.as_slice(), &[("Alpha".to_string(), true)]);
    }

    #[test]
    fn test_record_appends_in_order_within_bucket() {
        let store = StoreHub::in_memory();
        let notifier = Arc::new(RecordingNotifier::default());
        let recorder =
            ResultsRecorder::new(store.clone(), notifier, StandingsOptions::default());

        recorder.record(&forest_report(&["Alpha", "Beta"], "1", &[0, 1])).unwrap();
        recorder.record(&forest_report(&["Alpha", "Beta"], "2", &[1, 0])).unwrap();

        let results: ResultsStore = store.read(RESULTS_KEY, ResultsStore::new());
        let bucket = &results["Alpha, Beta"][r#"{"map":"Forest"}"#];
        let seeds: Vec<&str> = bucket.iter().map(|r| r.seed.as_str()).collect();
        assert_eq!(seeds, vec!["1", "2"]);
    }

    #[test]
    fn test_record_rejects_empty_reports() {
        let store = StoreHub::in_memory();
        let notifier = Arc::new(RecordingNotifier::default());
        let recorder =
            ResultsRecorder::new(store, notifier.clone(), StandingsOptions::default());

        let mut no_places = forest_report(&["Alpha", "Beta"], "1", &[]);
        assert!(recorder.record(&no_places).is_err());
        no_places.places = vec![5];
        assert!(recorder.record(&no_places).is_err());
        assert!(notifier.announced.lock().unwrap().is_empty());
    }

    #[test]
    fn test_record_notifies_results_subscriber_in_other_context() {
        let store = StoreHub::in_memory();
        let other_context = store.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let sink = seen.clone();
        let _subscription = other_context.subscribe(RESULTS_KEY, move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        let notifier = Arc::new(RecordingNotifier::default());
        let recorder =
            ResultsRecorder::new(store, notifier, StandingsOptions::default());
        recorder.record(&forest_report(&["Alpha", "Beta"], "1", &[0, 1])).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_until_runtime_accepts() {
        let bridge = FlakyBridge { attempts: AtomicUsize::new(0), failures_before_ready: 2 };
        let request = headless_request(
            [("map".to_string(), "Forest".to_string())].into(),
            &BTreeMap::new(),
            &["Alpha".to_string(), "Beta".to_string()],
            false,
            "42".to_string(),
        );

        run_simulation_with_retry(&bridge, &request, Duration::from_millis(1));

        assert_eq!(bridge.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_headless_request_resolves_payloads() {
        let mut bots = BTreeMap::new();
        bots.insert("Crusher".to_string(), "def play(): pass".to_string());

        let request = headless_request(
            BTreeMap::new(),
            &bots,
            &["Crusher".to_string(), "None".to_string()],
            true,
            "7".to_string(),
        );

        assert_eq!(request.player_payloads, vec!["def play(): pass".to_string(), String::new()]);
        assert!(request.headless);
        assert!(!request.interactive);
        assert_eq!(request.seed, "7");
    }
}

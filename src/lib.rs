pub mod types;
pub mod config;
pub mod store;
pub mod formula;
pub mod standings;
pub mod ingest;
pub mod server;

use config::*;
use server::{start_standings_server, StandingsServerState};
use standings::{update_point_modifier, StandingsOptions};
use store::{spawn_store_watcher, StoreHub};
use types::*;

use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── Entry point ────────────────────────────────────────────────────────

pub fn run() {
    // Initialize tracing with file + stderr output
    let logs_dir = repo_root().join("logs");
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "shell.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("Tournament shell starting");

    let config = load_config_inner().unwrap_or_else(|_| ShellConfig::default());
    let store = StoreHub::open(resolve_repo_path(&config.storage_path));
    let options = StandingsOptions::from_config(&config);

    // Any writer of the results key re-triggers reconciliation: this
    // process, another context on the hub, or an external process picked
    // up by the watcher.
    let trigger_store = store.clone();
    let trigger_options = options.clone();
    let _results_subscription = store.subscribe(RESULTS_KEY, move |_| {
        update_point_modifier(&trigger_store, &trigger_options);
    });

    update_point_modifier(&store, &options);
    spawn_store_watcher(store.clone(), config.store_watch_interval_ms);

    let static_dir = resolve_repo_path(&config.overlay_dir);
    fs::create_dir_all(&static_dir).ok();
    let state = StandingsServerState { store };

    let runtime = tokio::runtime::Runtime::new().expect("error while starting async runtime");
    runtime.block_on(start_standings_server(
        state,
        static_dir,
        &config.standings_server_addr,
    ));
}

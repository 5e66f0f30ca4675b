use crate::store::StoreHub;
use crate::types::*;
use axum::{
    extract::State as AxumState,
    response::IntoResponse,
    routing::{get, get_service},
    Router,
};
use serde_json::json;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{error, info};

// ── Standings HTTP endpoint ────────────────────────────────────────────

#[derive(Clone)]
pub struct StandingsServerState {
    pub store: StoreHub,
}

pub fn standings_router(state: StandingsServerState, static_dir: PathBuf) -> Router {
    let static_files = get_service(ServeDir::new(static_dir));

    Router::new()
        .route("/standings.json", get(get_standings_json))
        .route("/state.json", get(get_state_json))
        .nest_service("/", static_files)
        .with_state(state)
}

pub async fn start_standings_server(state: StandingsServerState, static_dir: PathBuf, addr: &str) {
    let app = standings_router(state, static_dir);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("standings server failed to bind {addr}: {e}");
            return;
        }
    };
    info!("Standings server listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("standings server error: {e}");
    }
}

async fn get_standings_json(
    AxumState(state): AxumState<StandingsServerState>,
) -> impl IntoResponse {
    let rounds: Vec<RoundDefinition> = state.store.read(ROUNDS_KEY, Vec::new());
    let current_round: i64 = state.store.read(CURRENT_ROUND_KEY, 0);
    let point_modifier: PointModifier = state.store.read(POINT_MODIFIER_KEY, PointModifier::new());

    let payload = json!({
        "rounds": rounds,
        "currentRound": current_round,
        "pointModifier": point_modifier,
    });
    let body = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
    (no_store_headers(), body)
}

async fn get_state_json(AxumState(state): AxumState<StandingsServerState>) -> impl IntoResponse {
    let body = serde_json::to_string(&state.store.snapshot()).unwrap_or_else(|_| "{}".to_string());
    (no_store_headers(), body)
}

// Standings move mid-event; overlays must never see a cached copy.
fn no_store_headers() -> [(&'static str, &'static str); 4] {
    [
        ("Content-Type", "application/json"),
        ("Cache-Control", "no-store"),
        ("Pragma", "no-cache"),
        ("Expires", "0"),
    ]
}

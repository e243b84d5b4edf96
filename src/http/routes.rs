//! HTTP route definitions

use std::sync::atomic::Ordering;

use axum::{
    extract::State,
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // The game client connects from arbitrary origins (itch-style static
    // hosting), so CORS stays permissive
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    players: usize,
    active_duels: usize,
    active_lobbies: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let gauges = &state.server.gauges;
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        players: gauges.players.load(Ordering::Relaxed),
        active_duels: gauges.duels.load(Ordering::Relaxed),
        active_lobbies: gauges.lobbies.load(Ordering::Relaxed),
    })
}

//! HTTP/WebSocket surface: the session router and its shared state.

pub mod rate_limiter;
pub mod websocket;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use openpoker::{
    ActiveSessions, Broadcaster, ConnectionRegistry, Matchmaker, TableManager,
    TournamentDirectory,
};

/// Shared application state handed to every socket.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub sessions: Arc<ActiveSessions>,
    pub tables: Arc<TableManager>,
    pub matchmaker: Arc<Matchmaker>,
    pub tournaments: Arc<TournamentDirectory>,
    pub commands_per_second: usize,
}

/// Build the router: one WebSocket endpoint plus a health probe.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket::websocket_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

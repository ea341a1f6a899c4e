pub mod config;
pub mod health;
pub mod registry;
pub mod session;
pub mod state;

use axum::Router;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);

    let app = Router::new()
        .route(
            "/rooms/{room_id}/ws",
            axum::routing::get(session::ws_handler),
        )
        .route("/healthz", axum::routing::get(health::health_check))
        .with_state(state.clone());

    (app, state)
}

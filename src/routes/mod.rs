pub mod assets;
pub mod assistant;
pub mod auth;
pub mod dashboard;
pub mod directory;
pub mod graphql;
pub mod home;
pub mod language;
pub mod profile;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    database: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = state
        .db
        .get()
        .ok()
        .and_then(|conn| conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0)).ok())
        .is_some();
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}

/// Every page, fragment and stream the server answers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home::index))
        .route("/health", get(health_check))
        .route("/assets/{*path}", get(assets::serve))
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(profile::router())
        .merge(directory::router())
        .merge(assistant::router())
        .merge(language::router())
        .merge(graphql::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

use async_graphql::http::{playground_source, GraphQLPlaygroundConfig};
use axum::extract::State;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;

use crate::extractors::CurrentUser;
use crate::graphql::types::Viewer;
use crate::state::AppState;

/// Read-only GraphQL endpoint over the donor directory
async fn graphql_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    let request = req.data(state.store.clone()).data(Viewer(user.id));
    Json(state.graphql_schema.execute(request).await)
}

async fn graphql_playground(_user: CurrentUser) -> impl IntoResponse {
    Html(playground_source(GraphQLPlaygroundConfig::new("/graphql")))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/graphql/playground", get(graphql_playground))
}

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;

use crate::i18n::Language;
use crate::state::AppState;

/// POST /language/toggle: flip between English and Bengali and go back
async fn toggle(language: Language, headers: HeaderMap) -> Response {
    let next = language.toggled();
    let back = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(local_path)
        .unwrap_or_else(|| "/".to_string());

    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, back), (header::SET_COOKIE, next.cookie())],
    )
        .into_response()
}

/// Path and query of a referer, so the redirect never leaves the site.
fn local_path(referer: &str) -> Option<String> {
    let url = url::Url::parse(referer).ok()?;
    Some(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/language/toggle", post(toggle))
}

use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::i18n::Translator;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/home.html")]
pub struct HomeTemplate {
    pub tr: Translator,
    pub challenge: String,
    pub notice: Option<String>,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

#[derive(Deserialize)]
pub struct HomeQuery {
    pub reset: Option<String>,
}

/// GET / renders the auth page, or sends signed-in users to the dashboard.
pub async fn index(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    tr: Translator,
    Query(query): Query<HomeQuery>,
) -> AppResult<Response> {
    if maybe_user.0.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    let challenge = state.challenges.lock().await.issue();
    let notice = query
        .reset
        .filter(|r| r == "done")
        .map(|_| tr.t("password_updated"));

    Ok(Html(HomeTemplate {
        tr,
        challenge,
        notice,
    })
    .into_response())
}

use askama::Template;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Router};

use crate::ai::{self, AiError, ChatMessage, FaqQuery, MatchForm, MatchRequest, MatchResponse};
use crate::extractors::CurrentUser;
use crate::i18n::Translator;
use crate::routes::home::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "components/chat_messages.html")]
struct ChatMessagesTemplate {
    messages: Vec<ChatMessage>,
}

pub struct MatchRowView {
    pub name: String,
    pub blood_type: String,
    pub distance: String,
    pub contact: String,
    pub score: String,
    pub notes: String,
}

#[derive(Template)]
#[template(path = "components/match_results.html")]
struct MatchResultsTemplate {
    tr: Translator,
    rows: Vec<MatchRowView>,
    summary: String,
    error: String,
}

impl MatchResultsTemplate {
    fn from_response(tr: Translator, response: MatchResponse) -> Self {
        let rows = response
            .suggested_donors
            .into_iter()
            .map(|d| MatchRowView {
                name: d.donor_name,
                blood_type: d.donor_blood_type,
                distance: format!("{:.1} km", d.distance_km),
                contact: d.contact_information,
                score: format!("{:.0}", d.suitability_score),
                notes: d.additional_notes.unwrap_or_default(),
            })
            .collect();
        Self {
            tr,
            rows,
            summary: response.summary,
            error: String::new(),
        }
    }

    /// Results cleared, with the failure message in their place.
    fn failed(tr: Translator, message: String) -> Self {
        Self {
            tr,
            rows: Vec::new(),
            summary: String::new(),
            error: message,
        }
    }
}

/// POST /ai/faq: one question in, the question and its answer out
async fn ask_faq(
    State(state): State<AppState>,
    _user: CurrentUser,
    tr: Translator,
    Form(query): Form<FaqQuery>,
) -> Response {
    let question = query.query.trim().to_string();
    if question.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }

    let reply = match ai::faq::ask(state.llm.as_ref(), &query, state.ai_timeout()).await {
        Ok(answer) => answer.answer,
        Err(e) => {
            tracing::warn!("FAQ request failed: {}", e);
            tr.t("faq_error")
        }
    };

    Html(ChatMessagesTemplate {
        messages: vec![ChatMessage::user(question), ChatMessage::bot(reply)],
    })
    .into_response()
}

/// POST /ai/match: ask the model for donor suggestions.
///
/// Only the newest submission per user, valid or not, gets its result; a
/// superseded request answers 204 so the page keeps what the newer one left.
async fn find_matches(
    State(state): State<AppState>,
    user: CurrentUser,
    tr: Translator,
    Form(form): Form<MatchForm>,
) -> Response {
    // Even a rejected form supersedes whatever is still in flight
    let generation = state.generations.begin(&user.id).await;
    let request = match MatchRequest::from_form(&form) {
        Ok(request) => request,
        Err(e) => return (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response(),
    };

    let result = ai::matcher::find_matches(state.llm.as_ref(), &request, state.ai_timeout()).await;

    if !state.generations.is_current(&user.id, generation).await {
        tracing::debug!(user = %user.id, generation, "Discarding superseded match result");
        return StatusCode::NO_CONTENT.into_response();
    }

    match result {
        Ok(response) => {
            tracing::info!(
                user = %user.id,
                suggestions = response.suggested_donors.len(),
                "Donor matches found"
            );
            Html(MatchResultsTemplate::from_response(tr, response)).into_response()
        }
        Err(e) => {
            log_match_failure(&e);
            let message = tr.t("matcher_error");
            (
                StatusCode::BAD_GATEWAY,
                Html(MatchResultsTemplate::failed(tr, message)),
            )
                .into_response()
        }
    }
}

fn log_match_failure(e: &AiError) {
    match e {
        AiError::NotConfigured => tracing::warn!("Matcher called without an AI API key"),
        other => tracing::error!("Donor matching failed: {}", other),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ai/faq", post(ask_faq))
        .route("/ai/match", post(find_matches))
}

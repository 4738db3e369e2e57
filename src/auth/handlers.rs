use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::auth::{normalize_phone, otp, password, reset, session, AuthError, IdentitySession};
use crate::error::AppResult;
use crate::extractors::cookie_value;
use crate::i18n::Translator;
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "components/otp_verify.html")]
pub struct OtpVerifyTemplate {
    pub tr: Translator,
    pub phone: String,
    pub message: String,
    pub challenge: String,
}

#[derive(Template)]
#[template(path = "pages/reset.html")]
pub struct ResetTemplate {
    pub tr: Translator,
    pub token: String,
    pub valid: bool,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CredentialsForm {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ResetRequestForm {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetQuery {
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct ResetConfirmForm {
    pub token: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct OtpRequestForm {
    pub phone: String,
    #[serde(default)]
    pub challenge: String,
}

#[derive(Deserialize)]
pub struct OtpVerifyForm {
    pub phone: String,
    pub code: String,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

pub(crate) fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

pub(crate) fn redirect_with_cookie(location: &str, cookie: String) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, location.to_string()),
            (header::SET_COOKIE, cookie),
        ],
    )
        .into_response()
}

/// Start a session and send the browser to the dashboard.
fn signed_in(state: &AppState, account_id: &str) -> AppResult<Response> {
    let hours = state.config.auth.session_hours;
    let token = session::create_session(&state.db, account_id, hours)?;
    Ok(redirect_with_cookie(
        "/dashboard",
        session_cookie(&state.config.auth.cookie_name, &token, hours),
    ))
}

// -- Email / password --

/// POST /auth/signup
pub async fn sign_up(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let account = password::sign_up(
        &state.db,
        &state.store,
        &form.email,
        &form.password,
        state.config.auth.min_password_len,
    )?;
    signed_in(&state, &account.id)
}

/// POST /auth/login
pub async fn log_in(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let account = password::sign_in(&state.db, &form.email, &form.password)?;
    tracing::info!(account_id = %account.id, "Signed in with email");
    signed_in(&state, &account.id)
}

// -- Password reset --

/// POST /auth/password-reset
///
/// Responds identically whether or not the account exists.
pub async fn request_password_reset(
    State(state): State<AppState>,
    tr: Translator,
    Form(form): Form<ResetRequestForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_string();
    let token = reset::request_reset(&state.db, &email, state.config.auth.reset_ttl_minutes)?;

    if let Some(token) = token {
        let link = format!(
            "{}/auth/password-reset?token={}",
            state.config.server.base_url(),
            token
        );
        if let Err(e) = state.notifier.send_password_reset(&email, &link).await {
            tracing::error!("Failed to deliver password reset: {}", e);
        }
    }

    let message = tr.t_with("reset_sent", &[("email", &email)]);
    Ok((StatusCode::OK, message).into_response())
}

/// GET /auth/password-reset?token=
pub async fn reset_page(
    State(state): State<AppState>,
    tr: Translator,
    Query(query): Query<ResetQuery>,
) -> AppResult<Response> {
    let token = query.token.unwrap_or_default();
    let valid = !token.is_empty() && reset::lookup(&state.db, &token)?.is_some();
    let status = if valid {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Html(ResetTemplate { tr, token, valid })).into_response())
}

/// POST /auth/password-reset/confirm
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Form(form): Form<ResetConfirmForm>,
) -> AppResult<Response> {
    reset::confirm_reset(
        &state.db,
        &form.token,
        &form.password,
        state.config.auth.min_password_len,
    )?;
    Ok((StatusCode::SEE_OTHER, [(header::LOCATION, "/?reset=done")]).into_response())
}

// -- Phone OTP --

/// POST /auth/otp/request
pub async fn request_otp(
    State(state): State<AppState>,
    tr: Translator,
    Form(form): Form<OtpRequestForm>,
) -> AppResult<Response> {
    let phone = normalize_phone(&form.phone)?;

    let passed = {
        let mut challenges = state.challenges.lock().await;
        challenges.consume(form.challenge.trim())
    };
    if !passed {
        return Err(AuthError::ChallengeFailed.into());
    }

    let code = otp::issue(&state.otps, &phone).await?;
    state.notifier.send_otp(&phone, &code).await?;
    tracing::info!(phone = %phone, "OTP requested");

    let challenge = state.challenges.lock().await.issue();
    let message = tr.t_with("otp_sent", &[("phone", &phone)]);
    Ok(Html(OtpVerifyTemplate {
        tr,
        phone,
        message,
        challenge,
    })
    .into_response())
}

/// POST /auth/otp/verify
pub async fn verify_otp(
    State(state): State<AppState>,
    Form(form): Form<OtpVerifyForm>,
) -> AppResult<Response> {
    let phone = normalize_phone(&form.phone)?;
    otp::verify(&state.otps, &phone, &form.code).await?;
    let account = otp::sign_in_with_phone(&state.db, &state.store, &phone)?;
    tracing::info!(account_id = %account.id, "Signed in with phone");
    signed_in(&state, &account.id)
}

// -- Logout --

/// POST /auth/logout: delete the session and return to the auth page
pub async fn logout(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> AppResult<Response> {
    let (parts, _body) = request.into_parts();
    let cookie_name = state.config.auth.cookie_name.clone();

    let mut identity = IdentitySession::new(state.db.clone(), state.store.clone());
    identity.resolve(cookie_value(&parts, &cookie_name))?;
    identity.logout()?;

    Ok(redirect_with_cookie("/", clear_session_cookie(&cookie_name)))
}

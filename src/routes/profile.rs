use std::convert::Infallible;
use std::time::Duration;

use askama::Template;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::auth::handlers::{clear_session_cookie, redirect_with_cookie};
use crate::auth::identity::DeleteError;
use crate::auth::{IdentitySession, ProfileState, SessionState};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::i18n::Translator;
use crate::profile::{self, format_geolocation, BloodType, DonorProfile, FieldErrors, ProfileForm};
use crate::routes::home::Html;
use crate::state::AppState;

/// Values and errors shown in the profile form.
#[derive(Debug, Clone, Default)]
pub struct ProfileFormView {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub gender: String,
    pub blood_type: String,
    pub last_donation_date: String,
    pub city: String,
    pub mobile_visibility: bool,
    pub geolocation: String,
    /// Email is locked once stored
    pub email_locked: bool,
    pub errors: FieldErrors,
    pub saved: bool,
    pub blood_types: Vec<&'static str>,
    pub max_date: String,
}

impl ProfileFormView {
    pub fn from_profile(profile: &DonorProfile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone().unwrap_or_default(),
            gender: profile
                .gender
                .map(|g| g.as_str().to_string())
                .unwrap_or_default(),
            blood_type: profile
                .blood_type
                .map(|b| b.as_str().to_string())
                .unwrap_or_default(),
            last_donation_date: profile
                .last_donation_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            city: profile.city.clone(),
            mobile_visibility: profile.mobile_visibility,
            geolocation: profile.geolocation.clone().unwrap_or_default(),
            email_locked: !profile.email.is_empty(),
            ..Self::blank()
        }
    }

    /// Echo a rejected submission back with its errors.
    pub fn from_submission(form: &ProfileForm, errors: FieldErrors, email_locked: bool) -> Self {
        Self {
            name: form.name.clone(),
            email: form.email.clone(),
            phone: form.phone.clone(),
            gender: form.gender.clone(),
            blood_type: form.blood_type.clone(),
            last_donation_date: form.last_donation_date.clone(),
            city: form.city.clone(),
            mobile_visibility: form.mobile_visibility.is_some(),
            geolocation: form.geolocation.clone(),
            email_locked,
            errors,
            ..Self::blank()
        }
    }

    fn blank() -> Self {
        Self {
            mobile_visibility: true,
            blood_types: BloodType::ALL.iter().map(BloodType::as_str).collect(),
            max_date: chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string(),
            ..Default::default()
        }
    }

    pub fn error(&self, field: &str) -> &str {
        self.errors.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn gender_is(&self, gender: &str) -> bool {
        self.gender == gender
    }

    pub fn blood_type_is(&self, blood_type: &str) -> bool {
        self.blood_type == blood_type
    }
}

#[derive(Template)]
#[template(path = "components/profile_form.html")]
pub struct ProfileFormTemplate {
    pub tr: Translator,
    pub form: ProfileFormView,
}

#[derive(Deserialize)]
pub struct LocationForm {
    pub latitude: String,
    pub longitude: String,
}

/// POST /profile: validate, then merge into the profile document
async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    tr: Translator,
    Form(form): Form<ProfileForm>,
) -> AppResult<Response> {
    let today = chrono::Utc::now().date_naive();
    match profile::submit(&state.store, &user.id, &form, today) {
        Ok(doc) => {
            let mut view = ProfileFormView::from_profile(&DonorProfile::from_document(&user.id, &doc));
            view.saved = true;
            Ok(Html(ProfileFormTemplate { tr, form: view }).into_response())
        }
        Err(profile::SubmitError::Invalid(errors)) => {
            let email_locked = state
                .store
                .get(&user.id)?
                .and_then(|doc| profile::types::str_field(&doc, profile::fields::EMAIL))
                .is_some();
            let view = ProfileFormView::from_submission(&form, errors, email_locked);
            Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                Html(ProfileFormTemplate { tr, form: view }),
            )
                .into_response())
        }
        Err(profile::SubmitError::Store(e)) => Err(e.into()),
    }
}

/// POST /profile/location: format device coordinates for the form field
async fn format_location(
    _user: CurrentUser,
    tr: Translator,
    Form(form): Form<LocationForm>,
) -> Response {
    let coords = form
        .latitude
        .trim()
        .parse::<f64>()
        .ok()
        .zip(form.longitude.trim().parse::<f64>().ok());

    match coords.map(|(lat, lon)| format_geolocation(lat, lon)) {
        Some(Ok(formatted)) => (StatusCode::OK, formatted).into_response(),
        _ => (StatusCode::UNPROCESSABLE_ENTITY, tr.t("location_error")).into_response(),
    }
}

/// POST /profile/delete: delete the profile, then the account
async fn delete_account(
    State(state): State<AppState>,
    user: CurrentUser,
    tr: Translator,
) -> AppResult<Response> {
    let mut identity = IdentitySession::new(state.db.clone(), state.store.clone());
    identity.resolve(Some(&user.token))?;

    match identity.delete_account() {
        Ok(()) => Ok(redirect_with_cookie(
            "/",
            clear_session_cookie(&state.config.auth.cookie_name),
        )),
        Err(DeleteError::NotSignedIn) => Err(AppError::Unauthorized),
        Err(DeleteError::Identity(_)) => {
            Ok((StatusCode::INTERNAL_SERVER_ERROR, tr.t("delete_partial")).into_response())
        }
        Err(DeleteError::Profile(e)) => {
            tracing::error!(account_id = %user.id, "Profile deletion failed: {}", e);
            Ok((StatusCode::INTERNAL_SERVER_ERROR, tr.t("delete_failed")).into_response())
        }
    }
}

struct IdentityStream {
    identity: IdentitySession,
    pending: Option<SessionState>,
    recheck: Interval,
    ended: bool,
}

impl IdentityStream {
    /// Wait for the next state worth sending. `None` when the store shut down.
    async fn next_state(&mut self) -> Option<SessionState> {
        loop {
            let profile_changed = tokio::select! {
                changed = self.identity.changed() => Some(changed.is_some()),
                _ = self.recheck.tick() => None,
            };
            if profile_changed == Some(false) {
                return None;
            }

            let signed_in = self.identity.revalidate().unwrap_or_else(|e| {
                tracing::warn!("Session recheck failed: {}", e);
                true
            });
            if !signed_in {
                return Some(SessionState::Anonymous);
            }
            if profile_changed == Some(true) {
                return Some(self.identity.state());
            }
        }
    }
}

/// GET /me/events: the signed-in identity's state, re-sent on every
/// profile change. Ends with `anonymous` once the session is gone.
async fn identity_events(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let mut identity = IdentitySession::new(state.db.clone(), state.store.clone());
    let initial = identity.resolve(Some(&user.token))?;

    let period = Duration::from_secs(state.config.auth.session_recheck_secs.max(1));
    let mut recheck = interval_at(Instant::now() + period, period);
    recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let stream = stream::unfold(
        IdentityStream {
            identity,
            pending: Some(initial),
            recheck,
            ended: false,
        },
        |mut s| async move {
            if s.ended {
                return None;
            }
            let state = match s.pending.take() {
                Some(state) => state,
                None => s.next_state().await?,
            };
            s.ended = matches!(state, SessionState::Anonymous);
            let event = Event::default()
                .event("identity")
                .data(identity_payload(&state).to_string());
            Some((Ok(event), s))
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn identity_payload(state: &SessionState) -> serde_json::Value {
    match state {
        SessionState::Loading => serde_json::json!({ "state": "loading" }),
        SessionState::Anonymous => serde_json::json!({ "state": "anonymous" }),
        SessionState::Authenticated { account_id, profile } => match profile {
            ProfileState::Loading => serde_json::json!({ "state": "authenticated", "id": account_id, "profile": "loading" }),
            ProfileState::Absent => serde_json::json!({ "state": "authenticated", "id": account_id, "profile": "absent" }),
            ProfileState::Present(p) => serde_json::json!({
                "state": "authenticated",
                "id": account_id,
                "profile": "present",
                "name": p.name,
            }),
        },
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", post(update_profile))
        .route("/profile/location", post(format_location))
        .route("/profile/delete", post(delete_account))
        .route("/me/events", get(identity_events))
}

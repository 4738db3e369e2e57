use askama::Template;
use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;

use crate::ai::matcher::DEFAULT_RADIUS_KM;
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::i18n::Translator;
use crate::profile::{BloodType, DonorProfile};
use crate::routes::home::Html;
use crate::routes::profile::ProfileFormView;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/dashboard.html")]
struct DashboardTemplate {
    tr: Translator,
    display_name: String,
    form: ProfileFormView,
    blood_types: Vec<&'static str>,
    default_radius: String,
}

/// Dashboard: profile form, donor directory and the assistant panels
async fn dashboard(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    tr: Translator,
) -> AppResult<Response> {
    let Some(user) = maybe_user.0 else {
        return Ok(Redirect::to("/").into_response());
    };

    let profile = match state.store.get(&user.id)? {
        Some(doc) => DonorProfile::from_document(&user.id, &doc),
        None => DonorProfile {
            uid: user.id.clone(),
            email: user.email.clone().unwrap_or_default(),
            phone: user.phone.clone(),
            mobile_visibility: true,
            ..Default::default()
        },
    };

    let display_name = if profile.name.is_empty() {
        tr.t("anonymous_user")
    } else {
        profile.name.clone()
    };

    Ok(Html(DashboardTemplate {
        tr,
        display_name,
        form: ProfileFormView::from_profile(&profile),
        blood_types: BloodType::ALL.iter().map(BloodType::as_str).collect(),
        default_radius: DEFAULT_RADIUS_KM.to_string(),
    })
    .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

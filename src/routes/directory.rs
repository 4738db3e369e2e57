use std::convert::Infallible;
use std::sync::Arc;

use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use futures::stream::{self, Stream};
use tokio::sync::watch;

use crate::directory::{
    ContactCell, ContactField, DirectoryView, DonorFilter, FilterParams, Listing, RevealError,
    ViewGuard, ViewHandle,
};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::i18n::Translator;
use crate::routes::home::Html;
use crate::state::AppState;
use crate::store::Snapshot;

/// One contact cell as the row template shows it.
pub struct CellView {
    pub value: String,
    pub hidden: bool,
    pub disabled: bool,
}

impl From<ContactCell<'_>> for CellView {
    fn from(cell: ContactCell<'_>) -> Self {
        Self {
            value: cell.value().unwrap_or_default().to_string(),
            hidden: cell.is_hidden(),
            disabled: matches!(cell, ContactCell::Disabled),
        }
    }
}

pub struct RowView {
    pub id: String,
    pub name: String,
    pub blood_type: String,
    pub city: String,
    pub phone: CellView,
    pub email: CellView,
}

#[derive(Template)]
#[template(path = "components/donor_rows.html")]
pub struct DonorRowsTemplate {
    pub tr: Translator,
    pub view_id: String,
    pub loading: bool,
    pub rows: Vec<RowView>,
}

#[derive(Template)]
#[template(path = "components/reveal.html")]
pub struct RevealTemplate {
    pub field: String,
    pub value: String,
}

fn render_rows(tr: Translator, view_id: &str, view: &DirectoryView) -> String {
    let (loading, rows) = match view.listing() {
        Listing::Loading => (true, Vec::new()),
        Listing::Empty => (false, Vec::new()),
        Listing::Rows(rows) => (
            false,
            rows.into_iter()
                .map(|row| RowView {
                    id: row.entry.id.clone(),
                    name: row.entry.name.clone(),
                    blood_type: row.entry.blood_type.clone(),
                    city: row.entry.city.clone(),
                    phone: row.phone.into(),
                    email: row.email.into(),
                })
                .collect(),
        ),
    };

    let template = DonorRowsTemplate {
        tr,
        view_id: view_id.to_string(),
        loading,
        rows,
    };
    match template.render() {
        // SSE data lines cannot carry carriage returns
        Ok(html) => html.replace('\r', ""),
        Err(e) => {
            tracing::error!("Template render error: {}", e);
            String::new()
        }
    }
}

enum Phase {
    Open,
    Initial,
    Live,
}

struct DirectoryStream {
    phase: Phase,
    tr: Translator,
    rx: watch::Receiver<Option<Snapshot>>,
    handle: Arc<ViewHandle>,
    guard: ViewGuard,
}

impl DirectoryStream {
    async fn rows_event(&self) -> Event {
        let view = self.handle.view.lock().await;
        Event::default()
            .event("rows")
            .data(render_rows(self.tr, self.guard.id(), &view))
    }

    async fn apply_latest(&mut self) {
        let snapshot = self.rx.borrow_and_update().clone();
        if let Some(snapshot) = snapshot {
            self.handle.view.lock().await.apply_snapshot(&snapshot);
        }
    }
}

/// GET /donors/events: open a directory view and stream its rows.
///
/// The first event names the view so the page can address search and
/// reveal requests to it. Every later event is a full re-render.
async fn donor_events(
    State(state): State<AppState>,
    user: CurrentUser,
    tr: Translator,
    Query(params): Query<FilterParams>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let filter = DonorFilter::from_params(&params).map_err(AppError::BadRequest)?;
    let (handle, guard) = state.directory_views.open(&user.id, filter);

    let initial = DirectoryStream {
        phase: Phase::Open,
        tr,
        rx: state.store.subscribe(),
        handle,
        guard,
    };

    let stream = stream::unfold(initial, |mut s| async move {
        match s.phase {
            Phase::Open => {
                s.phase = Phase::Initial;
                let event = Event::default().event("view").data(s.guard.id());
                Some((Ok(event), s))
            }
            Phase::Initial => {
                s.phase = Phase::Live;
                s.apply_latest().await;
                let event = s.rows_event().await;
                Some((Ok(event), s))
            }
            Phase::Live => {
                let snapshot_changed = tokio::select! {
                    changed = s.rx.changed() => Some(changed.is_ok()),
                    _ = s.handle.dirty.notified() => None,
                };
                match snapshot_changed {
                    // Store dropped: end the stream
                    Some(false) => return None,
                    Some(true) => s.apply_latest().await,
                    None => {}
                }
                let event = s.rows_event().await;
                Some((Ok(event), s))
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn find_view(state: &AppState, view_id: &str, user: &CurrentUser) -> AppResult<Arc<ViewHandle>> {
    state
        .directory_views
        .get(view_id, &user.id)
        .ok_or(AppError::NotFound)
}

/// POST /donors/views/{view}/search: commit a new filter
async fn search(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(view_id): Path<String>,
    Form(params): Form<FilterParams>,
) -> AppResult<StatusCode> {
    let handle = find_view(&state, &view_id, &user)?;
    let filter = DonorFilter::from_params(&params).map_err(AppError::BadRequest)?;
    handle.view.lock().await.search(filter);
    handle.dirty.notify_one();
    Ok(StatusCode::NO_CONTENT)
}

/// POST /donors/views/{view}/reveal/{id}/{field}
async fn reveal(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((view_id, donor_id, field)): Path<(String, String, String)>,
) -> AppResult<Response> {
    let handle = find_view(&state, &view_id, &user)?;
    let field: ContactField = field.parse().map_err(AppError::BadRequest)?;

    let result = handle.view.lock().await.reveal(&donor_id, field);
    match result {
        Ok(value) => {
            handle.dirty.notify_one();
            tracing::debug!(viewer = %user.id, donor = %donor_id, %field, "Contact revealed");
            Ok(Html(RevealTemplate {
                field: field.to_string(),
                value,
            })
            .into_response())
        }
        Err(RevealError::UnknownDonor) => Err(AppError::NotFound),
        Err(e @ RevealError::NotVisible) => {
            Ok((StatusCode::FORBIDDEN, e.to_string()).into_response())
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/donors/events", get(donor_events))
        .route("/donors/views/{view}/search", post(search))
        .route("/donors/views/{view}/reveal/{id}/{field}", post(reveal))
}

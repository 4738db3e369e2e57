use axum::routing::{get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(handlers::sign_up))
        .route("/auth/login", post(handlers::log_in))
        .route(
            "/auth/password-reset",
            get(handlers::reset_page).post(handlers::request_password_reset),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::confirm_password_reset),
        )
        .route("/auth/otp/request", post(handlers::request_otp))
        .route("/auth/otp/verify", post(handlers::verify_otp))
        .route("/auth/logout", post(handlers::logout))
}

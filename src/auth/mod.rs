pub mod accounts;
pub mod challenge;
pub mod handlers;
pub mod identity;
pub mod notifier;
pub mod otp;
pub mod password;
pub mod reset;
pub mod session;

use axum::http::StatusCode;

use crate::store::StoreError;

pub use identity::{IdentitySession, ProfileState, SessionState};
pub use notifier::{LogNotifier, Notifier};

/// Failures of the authentication provider.
///
/// User-facing variants carry the message shown in the auth form.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("An account with this email already exists.")]
    EmailInUse,

    #[error("Password must be at least {0} characters.")]
    WeakPassword(usize),

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Please enter a phone number in international format, e.g. +8801712345678.")]
    InvalidPhone,

    #[error("Verification check failed. Please reload the page and try again.")]
    ChallengeFailed,

    #[error("The verification code has expired. Please request a new one.")]
    OtpExpired,

    #[error("The verification code is incorrect.")]
    OtpInvalid,

    #[error("Too many attempts. Please request a new code.")]
    TooManyAttempts,

    #[error("This reset link is invalid or has expired.")]
    ResetTokenInvalid,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Could not deliver message: {0}")]
    Delivery(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            AuthError::Database(_)
                | AuthError::Pool(_)
                | AuthError::Hash(_)
                | AuthError::Task(_)
                | AuthError::Store(_)
                | AuthError::Delivery(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials | AuthError::OtpInvalid | AuthError::OtpExpired => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::EmailInUse => StatusCode::CONFLICT,
            AuthError::WeakPassword(_) | AuthError::InvalidEmail | AuthError::InvalidPhone => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AuthError::ChallengeFailed => StatusCode::FORBIDDEN,
            AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            AuthError::ResetTokenInvalid => StatusCode::BAD_REQUEST,
            AuthError::AccountNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Normalize a phone number to `+` followed by 8 to 15 digits.
///
/// Spaces, dashes and parentheses are ignored.
pub fn normalize_phone(raw: &str) -> Result<String, AuthError> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = compact.strip_prefix('+').ok_or(AuthError::InvalidPhone)?;
    if (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(compact)
    } else {
        Err(AuthError::InvalidPhone)
    }
}

use async_trait::async_trait;

use super::AuthError;

/// Delivers one-time codes and reset links to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_otp(&self, phone: &str, code: &str) -> Result<(), AuthError>;

    async fn send_password_reset(&self, email: &str, link: &str) -> Result<(), AuthError>;
}

/// Writes messages to the log instead of sending them. Useful for local
/// development; replace with an SMS/email gateway in production.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_otp(&self, phone: &str, code: &str) -> Result<(), AuthError> {
        tracing::info!(phone, code, "OTP issued (log delivery)");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, link: &str) -> Result<(), AuthError> {
        tracing::info!(email, link, "Password reset link issued (log delivery)");
        Ok(())
    }
}

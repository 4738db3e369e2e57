//! Password reset by emailed one-time link.

use rusqlite::{params, OptionalExtension};

use crate::state::DbPool;

use super::{accounts, password, AuthError};

/// Create a reset token for the account with `email`.
///
/// `None` when no such account exists; callers respond identically either
/// way so account existence is not disclosed.
pub fn request_reset(
    pool: &DbPool,
    email: &str,
    ttl_minutes: i64,
) -> Result<Option<String>, AuthError> {
    let Some(account) = accounts::find_by_email(pool, email.trim())? else {
        return Ok(None);
    };

    let token = super::session::generate_token();
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO password_resets (token, account_id, expires_at) VALUES (?1, ?2, datetime('now', ?3))",
        params![token, account.id, format!("{:+} minutes", ttl_minutes)],
    )?;

    tracing::info!(account_id = %account.id, "Password reset requested");
    Ok(Some(token))
}

/// Account id behind a usable reset token.
pub fn lookup(pool: &DbPool, token: &str) -> Result<Option<String>, AuthError> {
    let conn = pool.get()?;
    let account_id = conn
        .query_row(
            "SELECT account_id FROM password_resets
             WHERE token = ?1 AND used = 0 AND expires_at > datetime('now')",
            params![token],
            |row| row.get(0),
        )
        .optional()?;
    Ok(account_id)
}

/// Set a new password and burn the token. Existing sessions are revoked.
pub fn confirm_reset(
    pool: &DbPool,
    token: &str,
    new_password: &str,
    min_len: usize,
) -> Result<String, AuthError> {
    password::check_strength(new_password, min_len)?;
    let hash = password::hash_password(new_password)?;

    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    let account_id: String = tx
        .query_row(
            "SELECT account_id FROM password_resets
             WHERE token = ?1 AND used = 0 AND expires_at > datetime('now')",
            params![token],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(AuthError::ResetTokenInvalid)?;

    tx.execute(
        "UPDATE password_resets SET used = 1 WHERE token = ?1",
        params![token],
    )?;
    tx.execute(
        "UPDATE accounts SET password_hash = ?1 WHERE id = ?2",
        params![hash, account_id],
    )?;
    tx.execute(
        "DELETE FROM sessions WHERE account_id = ?1",
        params![account_id],
    )?;
    tx.commit()?;

    tracing::info!(account_id = %account_id, "Password reset completed");
    Ok(account_id)
}

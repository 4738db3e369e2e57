use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::db::models::Account;
use crate::state::DbPool;

use super::AuthError;

/// Create a new session for an account. Returns the session token.
pub fn create_session(pool: &DbPool, account_id: &str, hours: u64) -> Result<String, AuthError> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, account_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, account_id, token, format!("+{} hours", hours)],
    )?;

    tracing::debug!(account_id, "Session created");
    Ok(token)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> Result<(), AuthError> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// The account behind an unexpired session token.
pub fn resolve_session(pool: &DbPool, token: &str) -> Result<Option<Account>, AuthError> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT {} FROM sessions s JOIN accounts a ON a.id = s.account_id \
         WHERE s.token = ?1 AND s.expires_at > datetime('now')",
        Account::COLUMNS
            .split(", ")
            .map(|c| format!("a.{}", c))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let account = conn
        .query_row(&sql, params![token], Account::from_row)
        .optional()?;
    Ok(account)
}

/// Generate a cryptographically random 32-byte hex token.
pub(crate) fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

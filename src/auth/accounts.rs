//! Account rows: the auth identity behind a profile document.

use rusqlite::{params, OptionalExtension};

use crate::db::models::Account;
use crate::state::DbPool;

use super::AuthError;

pub fn find_by_id(pool: &DbPool, id: &str) -> Result<Option<Account>, AuthError> {
    find_where(pool, "id", id)
}

pub fn find_by_email(pool: &DbPool, email: &str) -> Result<Option<Account>, AuthError> {
    find_where(pool, "email", &email.to_lowercase())
}

pub fn find_by_phone(pool: &DbPool, phone: &str) -> Result<Option<Account>, AuthError> {
    find_where(pool, "phone", phone)
}

fn find_where(pool: &DbPool, column: &str, value: &str) -> Result<Option<Account>, AuthError> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT {} FROM accounts WHERE {} = ?1",
        Account::COLUMNS,
        column
    );
    let account = conn
        .query_row(&sql, params![value], Account::from_row)
        .optional()?;
    Ok(account)
}

/// Insert an email/password account. Emails are stored lowercased.
pub fn create_with_email(
    pool: &DbPool,
    email: &str,
    password_hash: &str,
) -> Result<Account, AuthError> {
    let id = uuid::Uuid::now_v7().to_string();
    let email = email.to_lowercase();
    let conn = pool.get()?;
    let inserted = conn.execute(
        "INSERT INTO accounts (id, email, password_hash) VALUES (?1, ?2, ?3)
         ON CONFLICT(email) DO NOTHING",
        params![id, email, password_hash],
    )?;
    if inserted == 0 {
        return Err(AuthError::EmailInUse);
    }
    drop(conn);
    find_by_id(pool, &id)?.ok_or(AuthError::AccountNotFound)
}

/// Return the account for a phone number, creating it on first sign-in.
/// The flag is true when the account was created.
pub fn find_or_create_by_phone(pool: &DbPool, phone: &str) -> Result<(Account, bool), AuthError> {
    if let Some(account) = find_by_phone(pool, phone)? {
        return Ok((account, false));
    }
    let id = uuid::Uuid::now_v7().to_string();
    {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO accounts (id, phone) VALUES (?1, ?2) ON CONFLICT(phone) DO NOTHING",
            params![id, phone],
        )?;
    }
    // A concurrent sign-in may have won the insert.
    let account = find_by_phone(pool, phone)?.ok_or(AuthError::AccountNotFound)?;
    let created = account.id == id;
    Ok((account, created))
}

/// Delete the identity. Sessions and reset tokens cascade.
pub fn delete(pool: &DbPool, id: &str) -> Result<(), AuthError> {
    let conn = pool.get()?;
    let rows = conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(AuthError::AccountNotFound);
    }
    Ok(())
}

//! Email + password sign-up and sign-in.

use serde_json::Value;

use crate::db::models::Account;
use crate::profile::fields;
use crate::profile::types::is_valid_email;
use crate::state::DbPool;
use crate::store::{ProfileDocument, ProfileStore};

use super::{accounts, AuthError};

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub fn check_strength(password: &str, min_len: usize) -> Result<(), AuthError> {
    if password.chars().count() < min_len {
        return Err(AuthError::WeakPassword(min_len));
    }
    Ok(())
}

/// Create an account and write its stub profile document.
pub fn sign_up(
    pool: &DbPool,
    store: &ProfileStore,
    email: &str,
    password: &str,
    min_len: usize,
) -> Result<Account, AuthError> {
    let email = email.trim();
    if !is_valid_email(email) {
        return Err(AuthError::InvalidEmail);
    }
    check_strength(password, min_len)?;

    let hash = hash_password(password)?;
    let account = accounts::create_with_email(pool, email, &hash)?;
    let stored_email = account.email.clone().unwrap_or_default();
    store.set(&account.id, &email_stub(&account.id, &stored_email))?;

    tracing::info!(account_id = %account.id, "Account created with email");
    Ok(account)
}

pub fn sign_in(pool: &DbPool, email: &str, password: &str) -> Result<Account, AuthError> {
    let account = accounts::find_by_email(pool, email.trim())?.ok_or(AuthError::InvalidCredentials)?;
    let hash = account
        .password_hash
        .as_deref()
        .ok_or(AuthError::InvalidCredentials)?;

    if !bcrypt::verify(password, hash)? {
        tracing::warn!(account_id = %account.id, "Failed sign-in attempt");
        return Err(AuthError::InvalidCredentials);
    }
    Ok(account)
}

/// `{uid, email, name}` where name is the email's local part.
pub fn email_stub(uid: &str, email: &str) -> ProfileDocument {
    let name = email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or("New User");

    let mut doc = ProfileDocument::new();
    doc.insert(fields::UID.into(), Value::from(uid));
    doc.insert(fields::EMAIL.into(), Value::from(email));
    doc.insert(fields::NAME.into(), Value::from(name));
    doc
}

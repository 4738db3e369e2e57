use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::db::models::Account;
use crate::profile::fields;
use crate::profile::types::str_field;
use crate::state::DbPool;
use crate::store::{ProfileDocument, ProfileStore};

use super::{accounts, AuthError};

/// A one-time code waiting for confirmation. Only the bcrypt hash is kept.
struct PendingCode {
    hash: String,
    expires_at: Instant,
    attempts: u32,
}

/// In-memory one-time codes for phone sign-in, keyed by normalized phone.
///
/// Requesting a new code replaces any pending one for the same phone.
/// The store only does bookkeeping; hashing happens in [`issue`] and
/// [`verify`] with the lock released.
pub struct OtpStore {
    pending: HashMap<String, PendingCode>,
    ttl: Duration,
    max_attempts: u32,
}

impl OtpStore {
    pub fn new(ttl: Duration, max_attempts: u32) -> Self {
        Self {
            pending: HashMap::new(),
            ttl,
            max_attempts,
        }
    }

    fn insert(&mut self, phone: &str, hash: String) {
        self.clear_stale();
        self.pending.insert(
            phone.to_string(),
            PendingCode {
                hash,
                expires_at: Instant::now() + self.ttl,
                attempts: 0,
            },
        );
    }

    /// Hash of the live code for `phone`.
    fn pending_hash(&mut self, phone: &str) -> Result<String, AuthError> {
        let Some(pending) = self.pending.get(phone) else {
            return Err(AuthError::OtpExpired);
        };
        if Instant::now() >= pending.expires_at {
            self.pending.remove(phone);
            return Err(AuthError::OtpExpired);
        }
        Ok(pending.hash.clone())
    }

    /// Record the outcome of checking a code against `hash`. A match consumes
    /// the code; a miss counts against the attempt limit, after which the
    /// code is discarded. If the code was replaced or used meanwhile, the
    /// check no longer applies.
    fn settle(&mut self, phone: &str, hash: &str, matched: bool) -> Result<(), AuthError> {
        let Some(pending) = self.pending.get_mut(phone).filter(|p| p.hash == hash) else {
            return Err(AuthError::OtpExpired);
        };

        if matched {
            self.pending.remove(phone);
            return Ok(());
        }

        pending.attempts += 1;
        if pending.attempts >= self.max_attempts {
            tracing::warn!(phone, "OTP attempt limit reached");
            self.pending.remove(phone);
            return Err(AuthError::TooManyAttempts);
        }
        Err(AuthError::OtpInvalid)
    }

    pub fn is_pending(&self, phone: &str) -> bool {
        self.pending
            .get(phone)
            .map(|p| Instant::now() < p.expires_at)
            .unwrap_or(false)
    }

    fn clear_stale(&mut self) {
        let now = Instant::now();
        self.pending.retain(|_, p| now < p.expires_at);
    }
}

/// Run a bcrypt operation on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, bcrypt::BcryptError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await??)
}

/// Generate a 6-digit code for `phone` and return the plaintext to deliver.
pub async fn issue(otps: &Mutex<OtpStore>, phone: &str) -> Result<String, AuthError> {
    let code = rand::thread_rng().gen_range(100000..=999999).to_string();
    let plain = code.clone();
    let hash = blocking(move || bcrypt::hash(&plain, bcrypt::DEFAULT_COST)).await?;
    otps.lock().await.insert(phone, hash);
    Ok(code)
}

/// Check a code for `phone`. A correct code is single use.
pub async fn verify(otps: &Mutex<OtpStore>, phone: &str, code: &str) -> Result<(), AuthError> {
    let hash = otps.lock().await.pending_hash(phone)?;

    let candidate = code.trim().to_string();
    let stored = hash.clone();
    let matched = blocking(move || bcrypt::verify(&candidate, &stored)).await?;

    otps.lock().await.settle(phone, &hash, matched)
}

/// Complete a phone sign-in after the code was confirmed.
///
/// Merges `{uid, phone}` into the profile document. A placeholder name is only
/// written when the document has none.
pub fn sign_in_with_phone(
    pool: &DbPool,
    store: &ProfileStore,
    phone: &str,
) -> Result<Account, AuthError> {
    let (account, created) = accounts::find_or_create_by_phone(pool, phone)?;

    let has_name = store
        .get(&account.id)?
        .and_then(|doc| str_field(&doc, fields::NAME))
        .is_some();
    store.merge(&account.id, phone_stub(&account.id, phone, !has_name))?;

    if created {
        tracing::info!(account_id = %account.id, "Account created with phone");
    }
    Ok(account)
}

pub fn phone_stub(uid: &str, phone: &str, with_name: bool) -> ProfileDocument {
    let mut doc = ProfileDocument::new();
    doc.insert(fields::UID.into(), Value::from(uid));
    doc.insert(fields::PHONE.into(), Value::from(phone));
    if with_name {
        doc.insert(fields::NAME.into(), Value::from(placeholder_name(uid)));
    }
    doc
}

/// `User` plus the last five characters of the id. Ids are UUIDv7, whose
/// leading digits are a timestamp shared by every account made that day.
fn placeholder_name(uid: &str) -> String {
    let tail: Vec<char> = uid.chars().rev().take(5).collect();
    let suffix: String = tail.into_iter().rev().collect();
    format!("User {}", suffix)
}

//! The signed-in identity as an explicit, observable object.
//!
//! `Loading -> Anonymous | Authenticated(profile)`. Once the account is known
//! the session holds a subscription on that account's profile document; the
//! subscription is dropped on logout, on account deletion, or when the session
//! object itself is dropped.

use crate::db::models::Account;
use crate::profile::DonorProfile;
use crate::state::DbPool;
use crate::store::{DocumentState, DocumentSubscription, ProfileStore, StoreError};

use super::{accounts, session, AuthError};

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileState {
    Loading,
    Present(DonorProfile),
    Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Loading,
    Anonymous,
    Authenticated {
        account_id: String,
        profile: ProfileState,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Could not delete profile: {0}")]
    Profile(#[from] StoreError),

    /// The profile is already gone; the identity survived.
    #[error("Profile deleted but the account could not be removed: {0}")]
    Identity(AuthError),
}

pub struct IdentitySession {
    pool: DbPool,
    store: ProfileStore,
    resolved: bool,
    token: Option<String>,
    account: Option<Account>,
    profile: Option<DocumentSubscription>,
}

impl IdentitySession {
    pub fn new(pool: DbPool, store: ProfileStore) -> Self {
        Self {
            pool,
            store,
            resolved: false,
            token: None,
            account: None,
            profile: None,
        }
    }

    /// Resolve the session token. An unknown or expired token is anonymous.
    pub fn resolve(&mut self, token: Option<&str>) -> Result<SessionState, AuthError> {
        self.teardown();
        self.resolved = true;

        let account = match token {
            Some(t) => session::resolve_session(&self.pool, t)?,
            None => None,
        };
        if let Some(account) = account {
            self.profile = Some(self.store.watch_document(account.id.clone()));
            self.token = token.map(str::to_string);
            self.account = Some(account);
        }
        Ok(self.state())
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn state(&self) -> SessionState {
        if !self.resolved {
            return SessionState::Loading;
        }
        match (&self.account, &self.profile) {
            (Some(account), Some(sub)) => SessionState::Authenticated {
                account_id: account.id.clone(),
                profile: profile_state(&account.id, sub.current()),
            },
            _ => SessionState::Anonymous,
        }
    }

    /// Wait for the next change of the profile document.
    /// `None` when anonymous or the store has shut down.
    pub async fn changed(&mut self) -> Option<SessionState> {
        let sub = self.profile.as_mut()?;
        sub.changed().await?;
        Some(self.state())
    }

    /// Re-check the session token against the database. When it no longer
    /// resolves (signed out elsewhere, account deleted) the session becomes
    /// anonymous and `false` is returned.
    pub fn revalidate(&mut self) -> Result<bool, AuthError> {
        let Some(token) = self.token.clone() else {
            return Ok(false);
        };
        if session::resolve_session(&self.pool, &token)?.is_some() {
            return Ok(true);
        }
        if let Some(account) = &self.account {
            tracing::debug!(account_id = %account.id, "Session no longer valid");
        }
        self.teardown();
        Ok(false)
    }

    /// Delete the session token and become anonymous.
    pub fn logout(&mut self) -> Result<(), AuthError> {
        if let Some(token) = self.token.take() {
            session::delete_session(&self.pool, &token)?;
        }
        if let Some(account) = &self.account {
            tracing::info!(account_id = %account.id, "Signed out");
        }
        self.teardown();
        Ok(())
    }

    /// Delete the profile document, then the auth identity.
    ///
    /// There is no rollback: if the second step fails the profile stays
    /// deleted and [`DeleteError::Identity`] is returned.
    pub fn delete_account(&mut self) -> Result<(), DeleteError> {
        let account_id = self
            .account
            .as_ref()
            .map(|a| a.id.clone())
            .ok_or(DeleteError::NotSignedIn)?;

        self.store.delete(&account_id)?;

        if let Err(e) = accounts::delete(&self.pool, &account_id) {
            tracing::error!(
                account_id = %account_id,
                "Profile deleted but account removal failed: {}",
                e
            );
            return Err(DeleteError::Identity(e));
        }

        tracing::info!(account_id = %account_id, "Account deleted");
        self.token = None;
        self.teardown();
        Ok(())
    }

    fn teardown(&mut self) {
        self.profile = None;
        self.account = None;
        self.token = None;
    }
}

fn profile_state(uid: &str, doc: DocumentState) -> ProfileState {
    match doc {
        DocumentState::Loading => ProfileState::Loading,
        DocumentState::Present(doc) => ProfileState::Present(DonorProfile::from_document(uid, &doc)),
        DocumentState::Absent => ProfileState::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password;
    use crate::db::test_pool;
    use serde_json::json;

    fn signed_in() -> (DbPool, ProfileStore, String, String) {
        let pool = test_pool();
        let store = ProfileStore::new(pool.clone());
        let account = password::sign_up(&pool, &store, "ayesha@example.com", "secret1", 6).unwrap();
        let token = session::create_session(&pool, &account.id, 1).unwrap();
        (pool, store, account.id, token)
    }

    #[test]
    fn starts_loading_then_resolves() {
        let pool = test_pool();
        let store = ProfileStore::new(pool.clone());
        let mut identity = IdentitySession::new(pool, store);
        assert_eq!(identity.state(), SessionState::Loading);

        assert_eq!(identity.resolve(None).unwrap(), SessionState::Anonymous);
        assert_eq!(
            identity.resolve(Some("bogus")).unwrap(),
            SessionState::Anonymous
        );
    }

    #[test]
    fn authenticated_state_carries_profile() {
        let (pool, store, id, token) = signed_in();
        let mut identity = IdentitySession::new(pool, store);

        match identity.resolve(Some(&token)).unwrap() {
            SessionState::Authenticated {
                account_id,
                profile: ProfileState::Present(profile),
            } => {
                assert_eq!(account_id, id);
                assert_eq!(profile.name, "ayesha");
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn profile_changes_are_observed() {
        let (pool, store, id, token) = signed_in();
        let mut identity = IdentitySession::new(pool, store.clone());
        identity.resolve(Some(&token)).unwrap();

        let update = json!({"city": "Sylhet"});
        store
            .merge(&id, update.as_object().unwrap().clone())
            .unwrap();

        match identity.changed().await {
            Some(SessionState::Authenticated {
                profile: ProfileState::Present(profile),
                ..
            }) => assert_eq!(profile.city, "Sylhet"),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn logout_deletes_token_and_tears_down() {
        let (pool, store, _id, token) = signed_in();
        let mut identity = IdentitySession::new(pool.clone(), store);
        identity.resolve(Some(&token)).unwrap();

        identity.logout().unwrap();
        assert_eq!(identity.state(), SessionState::Anonymous);
        assert!(session::resolve_session(&pool, &token).unwrap().is_none());
    }

    #[tokio::test]
    async fn anonymous_session_has_no_changes() {
        let pool = test_pool();
        let store = ProfileStore::new(pool.clone());
        let mut identity = IdentitySession::new(pool, store);
        identity.resolve(None).unwrap();
        assert_eq!(identity.changed().await, None);
    }

    #[test]
    fn delete_account_removes_profile_then_identity() {
        let (pool, store, id, token) = signed_in();
        let mut identity = IdentitySession::new(pool.clone(), store.clone());
        identity.resolve(Some(&token)).unwrap();

        identity.delete_account().unwrap();
        assert_eq!(store.get(&id).unwrap(), None);
        assert!(accounts::find_by_id(&pool, &id).unwrap().is_none());
        assert!(session::resolve_session(&pool, &token).unwrap().is_none());
        assert_eq!(identity.state(), SessionState::Anonymous);
    }

    #[test]
    fn failed_identity_step_leaves_profile_deleted() {
        let (pool, store, id, token) = signed_in();
        let mut identity = IdentitySession::new(pool.clone(), store.clone());
        identity.resolve(Some(&token)).unwrap();

        // Identity disappears out from under the session
        accounts::delete(&pool, &id).unwrap();

        match identity.delete_account() {
            Err(DeleteError::Identity(AuthError::AccountNotFound)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(store.get(&id).unwrap(), None);
    }

    #[test]
    fn anonymous_cannot_delete() {
        let pool = test_pool();
        let store = ProfileStore::new(pool.clone());
        let mut identity = IdentitySession::new(pool, store);
        identity.resolve(None).unwrap();
        assert!(matches!(
            identity.delete_account(),
            Err(DeleteError::NotSignedIn)
        ));
    }

    #[test]
    fn revalidate_notices_logout_elsewhere() {
        let (pool, store, _id, token) = signed_in();
        let mut identity = IdentitySession::new(pool.clone(), store.clone());
        identity.resolve(Some(&token)).unwrap();
        assert!(identity.revalidate().unwrap());

        let mut other_tab = IdentitySession::new(pool, store);
        other_tab.resolve(Some(&token)).unwrap();
        other_tab.logout().unwrap();

        assert!(!identity.revalidate().unwrap());
        assert!(matches!(identity.state(), SessionState::Anonymous));
        assert!(identity.account().is_none());
    }

    #[test]
    fn revalidate_notices_deleted_account() {
        let (pool, store, _id, token) = signed_in();
        let mut identity = IdentitySession::new(pool.clone(), store.clone());
        identity.resolve(Some(&token)).unwrap();

        let mut other_tab = IdentitySession::new(pool, store);
        other_tab.resolve(Some(&token)).unwrap();
        other_tab.delete_account().unwrap();

        assert!(!identity.revalidate().unwrap());
        assert!(matches!(identity.state(), SessionState::Anonymous));
    }
}

use std::collections::HashMap;
use std::time::{Duration, Instant};

const CHALLENGE_TTL_SECS: u64 = 600; // 10 minutes

/// Single-use bot-challenge tokens.
///
/// A token is issued with every rendering of the phone sign-in form and must
/// accompany an OTP request. Each token can be consumed once.
pub struct ChallengeStore {
    tokens: HashMap<String, Instant>,
    ttl: Duration,
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(CHALLENGE_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            tokens: HashMap::new(),
            ttl,
        }
    }

    pub fn issue(&mut self) -> String {
        self.clear_stale();
        let token = super::session::generate_token();
        self.tokens.insert(token.clone(), Instant::now() + self.ttl);
        token
    }

    /// Validate and remove a token. False if unknown, expired or already used.
    pub fn consume(&mut self, token: &str) -> bool {
        match self.tokens.remove(token) {
            Some(expires_at) => Instant::now() < expires_at,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn clear_stale(&mut self) {
        let now = Instant::now();
        self.tokens.retain(|_, expires_at| now < *expires_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_single_use() {
        let mut store = ChallengeStore::new();
        let token = store.issue();
        assert!(store.consume(&token));
        assert!(!store.consume(&token));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let mut store = ChallengeStore::new();
        assert!(!store.consume("forged"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut store = ChallengeStore::with_ttl(Duration::ZERO);
        let token = store.issue();
        assert!(!store.consume(&token));
    }

    #[test]
    fn stale_tokens_are_cleared_on_issue() {
        let mut store = ChallengeStore::with_ttl(Duration::ZERO);
        store.issue();
        store.issue();
        assert_eq!(store.len(), 1);
    }
}

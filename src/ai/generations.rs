use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Per-user matcher request counter. Only the newest request's result is
/// delivered; anything older is discarded when it completes.
#[derive(Clone, Default)]
pub struct MatchGenerations {
    current: Arc<Mutex<HashMap<String, u64>>>,
}

impl MatchGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request for `user_id`, superseding any in flight.
    pub async fn begin(&self, user_id: &str) -> u64 {
        let mut current = self.current.lock().await;
        let generation = current.entry(user_id.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    pub async fn is_current(&self, user_id: &str, generation: u64) -> bool {
        let current = self.current.lock().await;
        current.get(user_id).copied() == Some(generation)
    }
}

//! Registry of open directory views.
//!
//! Each SSE connection to the donor directory owns one [`DirectoryView`].
//! Search and reveal requests address the view by id and wake the stream so
//! it re-renders. A view is removed when its [`ViewGuard`] drops, which
//! happens when the client disconnects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, Notify};

use super::{DirectoryView, DonorFilter};

pub struct ViewHandle {
    pub owner: String,
    pub view: Mutex<DirectoryView>,
    /// Signalled after search or reveal so the stream re-renders.
    pub dirty: Notify,
}

#[derive(Clone, Default)]
pub struct DirectoryViews {
    views: Arc<StdMutex<HashMap<String, Arc<ViewHandle>>>>,
}

impl DirectoryViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, owner: &str, filter: DonorFilter) -> (Arc<ViewHandle>, ViewGuard) {
        let id = uuid::Uuid::now_v7().to_string();
        let handle = Arc::new(ViewHandle {
            owner: owner.to_string(),
            view: Mutex::new(DirectoryView::new(filter)),
            dirty: Notify::new(),
        });
        self.lock().insert(id.clone(), handle.clone());
        tracing::debug!(view = %id, owner, "Directory view opened");

        let guard = ViewGuard {
            id,
            views: self.clone(),
        };
        (handle, guard)
    }

    /// Look up a view, only for the user that opened it.
    pub fn get(&self, id: &str, owner: &str) -> Option<Arc<ViewHandle>> {
        self.lock()
            .get(id)
            .filter(|handle| handle.owner == owner)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: &str) {
        self.lock().remove(id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<ViewHandle>>> {
        self.views.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes its view from the registry on drop.
pub struct ViewGuard {
    id: String,
    views: DirectoryViews,
}

impl ViewGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for ViewGuard {
    fn drop(&mut self) {
        self.views.remove(&self.id);
        tracing::debug!(view = %self.id, "Directory view closed");
    }
}

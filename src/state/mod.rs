use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::controller::WindowController;
use crate::error::{Error, Result};
use self::window::WindowId;

pub mod window;

/// Process-wide table of live controllers, keyed by window id.
///
/// Touched from the UI thread and from engine callback threads, so every
/// operation goes through one mutex. Entries are small and every call is O(1).
pub struct WindowRegistry {
    windows: Mutex<HashMap<WindowId, Arc<WindowController>>>,
    next_id: AtomicU64,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    #[cfg(test)]
    fn starting_at(first: WindowId) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(first),
        }
    }

    /// Allocate the next window id. Ids are never handed out twice; a 64-bit
    /// counter does not wrap within a process lifetime.
    pub fn next_id(&self) -> WindowId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a controller. Fails if the id is already taken.
    pub fn put(&self, id: WindowId, controller: Arc<WindowController>) -> Result<()> {
        let mut windows = self.lock();
        if windows.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        windows.insert(id, controller);
        Ok(())
    }

    pub fn get(&self, id: WindowId) -> Option<Arc<WindowController>> {
        self.lock().get(&id).cloned()
    }

    /// Drop the entry for `id`. Removing an absent id does nothing.
    pub fn remove(&self, id: WindowId) -> Option<Arc<WindowController>> {
        self.lock().remove(&id)
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<WindowId> {
        let mut ids: Vec<WindowId> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Empty the table, handing back what was registered.
    pub fn clear(&self) -> Vec<Arc<WindowController>> {
        self.lock().drain().map(|(_, controller)| controller).collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WindowId, Arc<WindowController>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

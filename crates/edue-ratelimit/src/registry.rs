//! Per-user lock table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use edue_core::UserId;
use tokio::sync::Mutex as AsyncMutex;

use crate::window::UserWindows;

/// A user's lock and the cache it protects. `None` means not loaded yet.
pub(crate) type UserSlot = Arc<AsyncMutex<Option<UserWindows>>>;

/// Registry of per-user locks.
///
/// Entries are created on first use and never removed, so two racing callers
/// can never end up holding different locks for the same user. The table
/// therefore grows with the number of distinct users seen by the process.
#[derive(Debug, Default)]
pub(crate) struct LockRegistry {
    slots: Mutex<HashMap<UserId, UserSlot>>,
}

impl LockRegistry {
    /// Create an empty registry.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Get the slot for `user`, creating it if needed.
    pub(crate) fn get_or_create(&self, user: &UserId) -> UserSlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(user) {
            return Arc::clone(slot);
        }
        let slot = UserSlot::default();
        slots.insert(user.clone(), Arc::clone(&slot));
        slot
    }

    /// Number of users with a lock entry.
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

//! Latest-value-wins frame handoff.

use std::sync::Arc;

use parking_lot::Mutex;

/// Single-value handoff where the newest value wins.
///
/// `publish` replaces whatever is in the slot and `take` empties it, each
/// as one swap under the lock, so a value is handed out at most once.
pub struct FrameSlot<T> {
    value: Arc<Mutex<Option<T>>>,
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
        }
    }

    /// Store `value`, returning the previous one if nobody took it.
    pub fn publish(&self, value: T) -> Option<T> {
        self.value.lock().replace(value)
    }

    /// Remove and return the current value, if any.
    pub fn take(&self) -> Option<T> {
        self.value.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.value.lock().is_none()
    }
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for FrameSlot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> std::fmt::Debug for FrameSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSlot")
            .field("full", &!self.is_empty())
            .finish()
    }
}

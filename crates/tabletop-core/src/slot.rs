//! Single-slot frame hand-off between a sensor callback and the pipeline.
//!
//! The producer overwrites whatever frame is pending; the consumer always
//! takes the most recent one. Frames are never queued, so a slow pipeline
//! drops frames instead of building a backlog.

use std::sync::{Mutex, MutexGuard, PoisonError};

struct SlotState<T> {
    pending: Option<T>,
    published: u64,
    dropped: u64,
}

pub struct LatestFrameSlot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> LatestFrameSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                published: 0,
                dropped: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        // A panicking producer cannot leave the slot in a torn state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `frame`, replacing any frame not yet taken.
    ///
    /// Returns `true` if a pending frame was dropped.
    pub fn publish(&self, frame: T) -> bool {
        let mut state = self.lock();
        state.published += 1;
        let replaced = state.pending.replace(frame).is_some();
        if replaced {
            state.dropped += 1;
        }
        replaced
    }

    /// Take the latest pending frame, if any.
    pub fn take(&self) -> Option<T> {
        self.lock().pending.take()
    }

    pub fn published(&self) -> u64 {
        self.lock().published
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

impl<T> Default for LatestFrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

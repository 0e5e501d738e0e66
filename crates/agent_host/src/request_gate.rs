//! Single-slot token guarding calls to the model.
//!
//! Manual sends, session analysis and proactive ticks all share one gate, so at
//! most one request is outstanding at a time. The slot is released when the
//! [`RequestPermit`] drops, on success, error and cancellation alike.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct RequestGate {
    busy: Arc<AtomicBool>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot, or `None` if a request is already in flight
    pub fn try_acquire(&self) -> Option<RequestPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RequestPermit {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of one request
#[must_use = "the gate is released as soon as the permit drops"]
pub struct RequestPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for RequestPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

//! Session Liveness
//!
//! Generation counter shared by everything that belongs to one purchase.
//! Callbacks capture a [`LivenessGuard`] when they are created and must
//! check it before every state write; retiring the session bumps the
//! generation so every outstanding guard goes stale at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Liveness token owned by one session.
#[derive(Debug, Clone)]
pub struct Liveness {
    generation: Arc<AtomicU64>,
}

impl Liveness {
    /// Create a live token at generation zero.
    pub fn new() -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Capture the current generation.
    pub fn guard(&self) -> LivenessGuard {
        LivenessGuard {
            generation: self.generation.clone(),
            captured: self.generation.load(Ordering::Acquire),
        }
    }

    /// Retire every guard captured so far.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Generation captured at callback creation.
#[derive(Debug, Clone)]
pub struct LivenessGuard {
    generation: Arc<AtomicU64>,
    captured: u64,
}

impl LivenessGuard {
    /// True while the owning session has not been retired.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.generation.load(Ordering::Acquire) == self.captured
    }

    /// Generation this guard was captured at.
    pub fn captured(&self) -> u64 {
        self.captured
    }
}

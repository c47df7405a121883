//! Admission control for mutating requests.
//!
//! A counting semaphore caps in-flight PutObject work; acquisition is
//! non-blocking so excess load is rejected immediately with 429 rather than
//! queued.  The gate lives in the shared application state, one per process.

use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};

/// Maximum concurrent PutObject requests.
pub const MAX_CONCURRENT: usize = 100;

/// Deadline applied to each PutObject handler.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Non-blocking counting semaphore guarding object writes.
#[derive(Debug)]
pub struct AdmissionGate {
    permits: Semaphore,
}

impl AdmissionGate {
    /// Create a gate with `capacity` permits.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Semaphore::new(capacity),
        }
    }

    /// Try to claim a permit without waiting.
    ///
    /// Returns `None` when the gate is saturated.  The permit releases its
    /// slot when dropped, on every exit path.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        match self.permits.try_acquire() {
            Ok(permit) => Some(permit),
            Err(TryAcquireError::NoPermits) => None,
            // The semaphore is never closed while the gate is alive.
            Err(TryAcquireError::Closed) => None,
        }
    }

    /// Number of free slots, for logging.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(MAX_CONCURRENT)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

//! Process-wide deployment lock.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Guards "at most one deployment run active at a time".
///
/// A one-permit semaphore. Acquisition never waits: a held lock means the
/// caller is superseded by the run already in flight.
#[derive(Debug, Clone)]
pub struct DeploymentLock {
    permits: Arc<Semaphore>,
}

/// Held for the lifetime of a run. Dropping it releases the lock, so every
/// exit path (success, failure, panic unwind, task cancellation) releases.
#[derive(Debug)]
pub struct DeploymentGuard {
    _permit: OwnedSemaphorePermit,
}

impl DeploymentLock {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the lock if it is free.
    pub fn try_acquire(&self) -> Option<DeploymentGuard> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| DeploymentGuard { _permit: permit })
    }

    pub fn is_held(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

impl Default for DeploymentLock {
    fn default() -> Self {
        Self::new()
    }
}

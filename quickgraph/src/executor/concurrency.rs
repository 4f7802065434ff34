//! Root-field concurrency gate.
//!
//! Queries dispatch their root commands concurrently up to a configured
//! limit; once the gate is saturated, remaining commands still run (just
//! serialized behind the semaphore) rather than being rejected — the gate
//! bounds concurrency, not request width.

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
}

/// Whether a root command acquired a slot behind the gate, or is running
/// inline because the gate was saturated. Carries the permit (when one was
/// acquired) so it's held for the command's duration.
pub enum Admission<'a> {
    Gated(#[allow(dead_code, reason = "held only to keep the permit alive")] SemaphorePermit<'a>),
    Inline,
}

impl ConcurrencyGate {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Never blocks: a saturated gate immediately yields `Inline` rather
    /// than queuing, so a slow command can't starve siblings waiting on a
    /// permit that will never free up before the request deadline.
    pub fn try_admit(&self) -> Admission<'_> {
        match self.semaphore.try_acquire() {
            Ok(permit) => Admission::Gated(permit),
            Err(_) => Admission::Inline,
        }
    }
}

//! Bounded initialization queue
//!
//! Services are initialized in batches. A service whose initialization only
//! failed because an injection target does not exist yet is re-queued for
//! the next batch. The loop stops when the queue is empty, when a batch
//! initializes nothing, or when the batch limit is hit; whatever is still
//! queued at that point keeps its last errors.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SchemaError;

/// Result of draining the queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitOutcome {
    /// Successfully initialized services, in completion order
    pub initialized: Vec<String>,
    /// Services that could not be initialized, with their errors
    pub failed: BTreeMap<String, Vec<SchemaError>>,
    /// Number of batches run
    pub batches: usize,
    /// Attempts made per service
    pub attempts: BTreeMap<String, usize>,
}

/// Work queue for service initialization.
#[derive(Debug, Clone, Default)]
pub struct InitQueue {
    pending: Vec<String>,
    max_batches: Option<usize>,
}

impl InitQueue {
    pub fn new(services: impl IntoIterator<Item = String>) -> Self {
        Self {
            pending: services.into_iter().collect(),
            max_batches: None,
        }
    }

    pub fn with_max_batches(mut self, max_batches: Option<usize>) -> Self {
        self.max_batches = max_batches;
        self
    }

    /// Drain the queue with `init`, which receives a service name and the
    /// set of services initialized so far.
    pub fn run<F>(self, mut init: F) -> InitOutcome
    where
        F: FnMut(&str, &BTreeSet<String>) -> Result<(), Vec<SchemaError>>,
    {
        let mut outcome = InitOutcome::default();
        let mut done: BTreeSet<String> = BTreeSet::new();
        let mut pending = self.pending;
        let mut last_errors: BTreeMap<String, Vec<SchemaError>> = BTreeMap::new();

        while !pending.is_empty() {
            if self.max_batches.is_some_and(|max| outcome.batches >= max) {
                tracing::warn!(
                    batches = outcome.batches,
                    remaining = pending.len(),
                    "Initialization batch limit reached"
                );
                break;
            }
            outcome.batches += 1;

            let before = pending.len();
            let mut retry = Vec::new();
            for name in pending {
                *outcome.attempts.entry(name.clone()).or_default() += 1;
                match init(&name, &done) {
                    Ok(()) => {
                        done.insert(name.clone());
                        last_errors.remove(&name);
                        outcome.initialized.push(name);
                    }
                    Err(errors) if errors.iter().all(SchemaError::is_injection_target_missing) => {
                        tracing::debug!(service = %name, "Injection target missing, re-queueing");
                        last_errors.insert(name.clone(), errors);
                        retry.push(name);
                    }
                    Err(errors) => {
                        last_errors.remove(&name);
                        outcome.failed.insert(name, errors);
                    }
                }
            }

            // every remaining service hit the same missing targets again
            if retry.len() == before {
                tracing::warn!(
                    remaining = retry.len(),
                    "Initialization made no progress, giving up"
                );
                pending = retry;
                break;
            }
            pending = retry;
        }

        for name in pending {
            let errors = last_errors.remove(&name).unwrap_or_default();
            outcome.failed.insert(name, errors);
        }
        outcome
    }
}

//! Debouncer (C8, spec §4.8): the most recent `debounce_run` call for a key
//! replaces any previously scheduled call with the same key. A superseded
//! call still sleeps out its delay but finds itself stale and skips running
//! `f` — effectively "cancelled" without needing a `JoinHandle` registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::IngestError;

#[derive(Clone, Default)]
pub struct Debouncer {
    generations: Arc<Mutex<HashMap<String, u64>>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `f` to run once after `delay`, collapsing any call already
    /// pending for `key`. `f`'s error is logged, never propagated — a
    /// rejected debounced run must not crash the process (spec §4.8).
    pub fn debounce_run<F, Fut>(&self, key: impl Into<String>, delay: Duration, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), IngestError>> + Send + 'static,
    {
        let key = key.into();
        let generations = self.generations.clone();
        let my_generation = {
            let mut gens = generations.lock().unwrap();
            let slot = gens.entry(key.clone()).or_insert(0);
            *slot += 1;
            *slot
        };

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_current = {
                let gens = generations.lock().unwrap();
                gens.get(&key).copied() == Some(my_generation)
            };
            if !still_current {
                return;
            }
            if let Err(err) = f().await {
                tracing::warn!(key = %key, error = %err, "debounced run failed");
            }
        });
    }
}

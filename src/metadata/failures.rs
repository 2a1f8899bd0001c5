use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Number of recorded failures an address may accumulate before it is banned.
pub const DEFAULT_BAN_THRESHOLD: usize = 5;

/// Process-wide record of failed gateway fetches keyed by normalized address.
///
/// Counts only ever grow: an address whose count exceeds the threshold stays
/// banned for the lifetime of the tracker. Clones share the same state.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    failures: Arc<Mutex<HashMap<String, usize>>>,
    threshold: usize,
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_BAN_THRESHOLD)
    }
}

impl FailureTracker {
    pub fn new(threshold: usize) -> Self {
        Self {
            failures: Arc::new(Mutex::new(HashMap::new())),
            threshold,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// True once more than `threshold` failures were recorded for `address`.
    pub fn is_banned(&self, address: &str) -> bool {
        self.failures(address) > self.threshold
    }

    /// Increments the failure count for `address` and returns the new value.
    pub fn record_failure(&self, address: &str) -> usize {
        let mut failures = self.failures.lock().expect("failure tracker mutex poisoned");
        let count = failures.entry(address.to_owned()).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;

        if count == self.threshold.saturating_add(1) {
            tracing::warn!(
                address,
                failures = count,
                "gateway address banned after repeated failures"
            );
        }

        count
    }

    pub fn failures(&self, address: &str) -> usize {
        self.failures
            .lock()
            .expect("failure tracker mutex poisoned")
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn banned_count(&self) -> usize {
        self.failures
            .lock()
            .expect("failure tracker mutex poisoned")
            .values()
            .filter(|count| **count > self.threshold)
            .count()
    }

    /// Copy of every tracked address with its failure count, sorted by address.
    pub fn snapshot(&self) -> Vec<(String, usize)> {
        let failures = self.failures.lock().expect("failure tracker mutex poisoned");
        let mut entries: Vec<_> = failures
            .iter()
            .map(|(address, count)| (address.clone(), *count))
            .collect();
        entries.sort();
        entries
    }
}

//! # Fibonacci Backoff
//!
//! Progressive retry delays for failed reconciliations.
//!
//! Delays follow the Fibonacci sequence in whole minutes (1m, 1m, 2m, 3m, 5m,
//! 8m, ...) capped at a configured ceiling. State is kept per resource and
//! reset after the first successful pass.
//!
//! ```
//! use telemetry_agent_operator::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 10);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 120);
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Fibonacci backoff calculator working in minutes
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min_minutes` and never exceeding `max_minutes`
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        let min_minutes = min_minutes.max(1);
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes: max_minutes.max(min_minutes),
        }
    }

    /// Return the current delay in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result_seconds = self.current_minutes * 60;

        let next_minutes = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = next_minutes.min(self.max_minutes);

        result_seconds
    }

    /// Return the current delay as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Restart the sequence from the floor
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

/// Backoff state for a single TelemetryAgent
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
        }
    }
}

/// Per-resource backoff bookkeeping shared between reconcile and error policy
///
/// Keys are `namespace/name`. Each resource advances its own sequence so a
/// single broken agent never slows down retries for the others.
#[derive(Debug)]
pub struct BackoffRegistry {
    min_minutes: u64,
    max_minutes: u64,
    states: Mutex<HashMap<String, BackoffState>>,
}

impl BackoffRegistry {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            max_minutes,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure and return `(delay, error_count)` for the resource
    pub fn record_failure(&self, resource_key: &str) -> (Duration, u32) {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = states
            .entry(resource_key.to_string())
            .or_insert_with(|| BackoffState::new(self.min_minutes, self.max_minutes));
        state.error_count += 1;
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Forget any failures for the resource; returns true if it was backing off
    pub fn record_success(&self, resource_key: &str) -> bool {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        states
            .remove(resource_key)
            .is_some_and(|state| state.error_count > 0)
    }

    /// Drop all state for a resource that no longer exists; returns true if
    /// there was any
    pub fn forget(&self, resource_key: &str) -> bool {
        self.states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(resource_key)
            .is_some()
    }

    /// Current error count for the resource (0 if healthy)
    #[must_use]
    pub fn error_count(&self, resource_key: &str) -> u32 {
        self.states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(resource_key)
            .map_or(0, |state| state.error_count)
    }
}

//! # Fibonacci Backoff
//!
//! Progressive backoff for failed reconciliations.
//!
//! The sequence (in minutes) is 1, 1, 2, 3, 5, 8, ... capped at the configured maximum.
//! Each resource keeps its own instance so one failing resource never slows another.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibonacciBackoff {
    max_minutes: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        let min_minutes = min_minutes.max(1);
        Self {
            max_minutes: max_minutes.max(min_minutes),
            previous: 0,
            current: min_minutes,
        }
    }

    /// Current backoff in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let minutes = self.current.min(self.max_minutes);
        let next = self
            .previous
            .saturating_add(self.current)
            .min(self.max_minutes);
        self.previous = self.current;
        self.current = next;
        minutes * 60
    }
}

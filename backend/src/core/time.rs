//! Cadence timers for the multi-rate scheduler
//!
//! The pipeline runs three independent cadences (sampling, aggregation,
//! control) on top of the simulator's own step clock. Each cadence is a
//! `CadenceTimer` that fires when simulated time reaches its next scheduled
//! instant and then advances that instant by a fixed interval.
//!
//! The next fire time is never re-based on the current time. A missed
//! boundary therefore produces a skipped firing instead of accumulated drift.

use serde::{Deserialize, Serialize};

/// Fixed-interval timer driven by simulated time (seconds)
///
/// # Example
/// ```
/// use perimeter_control_core_rs::CadenceTimer;
///
/// let mut timer = CadenceTimer::new(0.0, 10.0); // fires at 0, 10, 20, ...
/// assert!(timer.is_due(0.0));
/// timer.advance();
/// assert!(!timer.is_due(9.0));
/// assert!(timer.is_due(10.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceTimer {
    /// Simulated time of the next firing
    next_fire: f64,
    /// Seconds between firings
    interval: f64,
    /// Number of times the timer has fired
    fired: usize,
}

impl CadenceTimer {
    /// Create a timer whose first firing is at `first_fire`
    ///
    /// # Arguments
    /// * `first_fire` - Simulated time of the first firing
    /// * `interval` - Seconds between consecutive firings
    ///
    /// # Example
    /// ```
    /// use perimeter_control_core_rs::CadenceTimer;
    ///
    /// let timer = CadenceTimer::new(50.0, 50.0);
    /// assert_eq!(timer.next_fire(), 50.0);
    /// ```
    pub fn new(first_fire: f64, interval: f64) -> Self {
        assert!(interval > 0.0, "interval must be positive");
        Self {
            next_fire: first_fire,
            interval,
            fired: 0,
        }
    }

    /// Check whether the timer is due at simulated time `now`
    pub fn is_due(&self, now: f64) -> bool {
        now >= self.next_fire
    }

    /// Move the next firing forward by exactly one interval
    ///
    /// # Example
    /// ```
    /// use perimeter_control_core_rs::CadenceTimer;
    ///
    /// let mut timer = CadenceTimer::new(0.0, 10.0);
    /// // A late check at t=25 still only moves the boundary to 10
    /// assert!(timer.is_due(25.0));
    /// timer.advance();
    /// assert_eq!(timer.next_fire(), 10.0);
    /// ```
    pub fn advance(&mut self) {
        self.next_fire += self.interval;
        self.fired += 1;
    }

    /// Fire if due: returns true and advances when `now` has reached the boundary
    ///
    /// Fires at most once per call.
    pub fn poll(&mut self, now: f64) -> bool {
        if self.is_due(now) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Simulated time of the next firing
    pub fn next_fire(&self) -> f64 {
        self.next_fire
    }

    /// Seconds between firings
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Number of firings so far
    pub fn fired(&self) -> usize {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "interval must be positive")]
    fn test_zero_interval_panics() {
        CadenceTimer::new(0.0, 0.0);
    }

    #[test]
    fn test_poll_fires_once_per_call() {
        let mut timer = CadenceTimer::new(0.0, 10.0);
        assert!(timer.poll(35.0));
        assert_eq!(timer.next_fire(), 10.0);
        assert_eq!(timer.fired(), 1);
    }
}

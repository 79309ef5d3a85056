//! Time sources and the anchored master clock.
//!
//! Every coordinator reads real time through a [`Clock`] so tests can swap in
//! a [`ManualClock`] and step time by hand.

use std::{
    cell::Cell,
    rc::Rc,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

/// Source of "now" in milliseconds. Only differences between readings are
/// meaningful for the monotonic clocks.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Monotonic clock backed by [`Instant`], reporting milliseconds since it was
/// created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Wall clock reporting milliseconds since the Unix epoch. Used for event
/// timestamps that leave the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpochClock;

impl Clock for EpochClock {
    fn now_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as f64)
            .unwrap_or(0.0)
    }
}

/// Hand-driven clock. Clones share the same reading, so a test can keep one
/// handle while the coordinator owns another.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(ms)),
        }
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }

    pub fn advance(&self, delta_ms: f64) {
        self.now.set(self.now.get() + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

/// Virtual playback position derived from two anchors: the real time at which
/// playback last (re)started and the virtual position at that instant.
///
/// While running, `position = now - start_real + offset`. While stopped the
/// last sampled position is held.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MasterClock {
    current_ms: f64,
    start_real_ms: f64,
    offset_ms: f64,
    running: bool,
}

impl MasterClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last computed virtual position.
    pub fn current_ms(&self) -> f64 {
        self.current_ms
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts advancing from the held position. Returns `false` if the clock
    /// was already running.
    pub fn start(&mut self, now_ms: f64) -> bool {
        if self.running {
            return false;
        }
        self.start_real_ms = now_ms;
        self.offset_ms = self.current_ms;
        self.running = true;
        true
    }

    /// Stops advancing and keeps the last sampled position. Returns `false`
    /// if the clock was already stopped.
    pub fn freeze(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        true
    }

    /// Jumps to `position_ms` and re-anchors so later sampling continues from
    /// there, whether running or not.
    pub fn reanchor(&mut self, now_ms: f64, position_ms: f64) {
        self.current_ms = position_ms;
        self.offset_ms = position_ms;
        self.start_real_ms = now_ms;
    }

    /// Recomputes the position from the anchors and stores it. A stopped
    /// clock returns the held value unchanged.
    pub fn sample(&mut self, now_ms: f64) -> f64 {
        if self.running {
            let elapsed = (now_ms - self.start_real_ms).max(0.0);
            // Guard against a clock source stepping backwards.
            self.current_ms = (elapsed + self.offset_ms).max(self.current_ms);
        }
        self.current_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(12.5);
        assert_eq!(other.now_ms(), 12.5);
        other.set(3.0);
        assert_eq!(clock.now_ms(), 3.0);
    }

    #[test]
    fn system_clock_never_goes_backwards() {
        let clock = SystemClock::new();
        let first = clock.now_ms();
        let second = clock.now_ms();
        assert!(second >= first);
    }

    #[test]
    fn epoch_clock_is_after_2020() {
        assert!(EpochClock.now_ms() > 1_577_836_800_000.0);
    }

    #[test]
    fn running_clock_tracks_elapsed_time_from_offset() {
        let mut clock = MasterClock::new();
        clock.reanchor(0.0, 500.0);
        assert!(clock.start(1_000.0));
        assert_eq!(clock.sample(1_250.0), 750.0);
    }

    #[test]
    fn frozen_clock_holds_its_value() {
        let mut clock = MasterClock::new();
        clock.start(0.0);
        clock.sample(40.0);
        assert!(clock.freeze());
        assert_eq!(clock.sample(10_000.0), 40.0);
        assert!(!clock.freeze());
    }

    #[test]
    fn restart_resumes_from_held_position() {
        let mut clock = MasterClock::new();
        clock.start(0.0);
        clock.sample(100.0);
        clock.freeze();
        assert!(clock.start(5_000.0));
        assert!(!clock.start(5_001.0));
        assert_eq!(clock.sample(5_050.0), 150.0);
    }

    #[test]
    fn source_stepping_backwards_does_not_rewind() {
        let mut clock = MasterClock::new();
        clock.start(100.0);
        assert_eq!(clock.sample(160.0), 60.0);
        assert_eq!(clock.sample(150.0), 60.0);
    }
}

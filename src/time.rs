//! Wall-clock timing of a run.
//!
//! Ticks of the simulation are not tied to real time; [`RunTimer`] only
//! measures how long the tick loop took and how fast it went.
//!
//! # Example
//!
//! ```
//! use pflock::time::RunTimer;
//!
//! let mut timer = RunTimer::start();
//! for _ in 0..10 {
//!     timer.tick();
//! }
//! timer.stop();
//! assert_eq!(timer.ticks(), 10);
//! ```

use std::time::{Duration, Instant};

/// Measures the window between the start and end barriers of a run.
#[derive(Debug, Clone)]
pub struct RunTimer {
    /// When the window opened.
    start: Instant,
    /// Fixed once the window closes.
    stopped: Option<Duration>,
    /// Ticks completed inside the window.
    ticks: u64,
}

impl RunTimer {
    /// Open the window now.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            stopped: None,
            ticks: 0,
        }
    }

    /// Record one completed tick.
    #[inline]
    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    /// Close the window. Further calls keep the first measurement.
    pub fn stop(&mut self) -> Duration {
        *self.stopped.get_or_insert_with(|| self.start.elapsed())
    }

    /// Time since start, or the measured window once stopped.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.stopped.unwrap_or_else(|| self.start.elapsed())
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    /// Average ticks per second over the window.
    pub fn ticks_per_second(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.ticks as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for RunTimer {
    fn default() -> Self {
        Self::start()
    }
}

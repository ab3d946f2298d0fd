use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Monotonic millisecond time source read once per frame.
///
/// Implementations must never go backwards between two `restart` calls.
pub trait MonotonicClock: Send {
    /// Milliseconds since the last restart.
    fn now_ms(&mut self) -> f64;

    /// Restarts the clock at zero.
    fn restart(&mut self);
}

/// Wall-clock independent time source backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SteadyClock {
    origin: Instant,
}

impl SteadyClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SteadyClock {
    fn default() -> Self {
        Self::start()
    }
}

impl MonotonicClock for SteadyClock {
    fn now_ms(&mut self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn restart(&mut self) {
        self.origin = Instant::now();
    }
}

/// Frame-locked clock: every read advances time by one frame period.
///
/// Used for offline replay and tests, where frames arrive faster than real
/// time but must be timed as if captured at a fixed rate.
#[derive(Debug, Clone)]
pub struct SyntheticClock {
    period_ms: f64,
    frames: u64,
}

impl SyntheticClock {
    pub fn new(period_ms: f64) -> Self {
        Self {
            period_ms,
            frames: 0,
        }
    }

    pub fn from_fps(fps: f64) -> Self {
        Self::new(1000.0 / fps.max(f64::EPSILON))
    }

    /// Skips `frames` frame periods without producing a reading.
    pub fn skip(&mut self, frames: u64) {
        self.frames += frames;
    }
}

impl MonotonicClock for SyntheticClock {
    fn now_ms(&mut self) -> f64 {
        let now = self.frames as f64 * self.period_ms;
        self.frames += 1;
        now
    }

    fn restart(&mut self) {
        self.frames = 0;
    }
}

/// Snapshot produced by each [`SessionTimer::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTick {
    pub elapsed_secs: u32,
    pub remaining_secs: Option<u32>,
    pub finished: bool,
}

/// Low-frequency (1 Hz) elapsed-time counter for a measurement session.
#[derive(Debug, Clone, Default)]
pub struct SessionTimer {
    elapsed_secs: u32,
    target_secs: Option<u32>,
    running: bool,
}

impl SessionTimer {
    pub fn new(target_secs: Option<u32>) -> Self {
        Self {
            target_secs,
            ..Default::default()
        }
    }

    pub fn start(&mut self) {
        self.elapsed_secs = 0;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn set_target(&mut self, target_secs: Option<u32>) {
        self.target_secs = target_secs;
    }

    /// Advances the counter by one second if the timer is running.
    pub fn tick(&mut self) -> SessionTick {
        if self.running {
            self.elapsed_secs = self.elapsed_secs.saturating_add(1);
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> SessionTick {
        let remaining_secs = self
            .target_secs
            .map(|target| target.saturating_sub(self.elapsed_secs));
        SessionTick {
            elapsed_secs: self.elapsed_secs,
            remaining_secs,
            finished: remaining_secs == Some(0),
        }
    }
}

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use serde::{Deserialize, Serialize};

use crate::{
    clock::{MonotonicClock, SessionTick},
    metrics::{self, HrvMetrics},
    observer::{self, EventStream},
    pipeline::{FrameOutcome, PulsePipeline},
    roi::LumaPlane,
    rr::RrSeries,
    PipelineConfig, PulseError, Result,
};

/// Point-in-time view of the pipeline for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub finger_present: bool,
    pub session_active: bool,
    pub display_bpm: Option<u32>,
    pub signal_quality: f64,
    pub beats: usize,
    pub elapsed_secs: u32,
}

/// Shared handle to a [`PulsePipeline`].
///
/// Frame delivery never waits: if a previous frame is still being processed
/// the new one is dropped. Session control and the 1 Hz tick take the same
/// lock, so they never interleave with a frame.
#[derive(Clone)]
pub struct PulseMonitor {
    shared: Arc<Mutex<PulsePipeline>>,
}

impl PulseMonitor {
    /// Validates `config` and builds a monitor plus the stream its events
    /// are published on.
    pub fn new(config: PipelineConfig, clock: Box<dyn MonotonicClock>) -> Result<(Self, EventStream)> {
        let (sink, stream) = observer::channel(config.observer.capacity);
        let pipeline = PulsePipeline::with_clock(config, clock, sink)?;
        Ok((
            Self {
                shared: Arc::new(Mutex::new(pipeline)),
            },
            stream,
        ))
    }

    /// Processes `plane`, or returns `Ok(None)` if the pipeline is busy.
    pub fn push_frame(&self, plane: &LumaPlane<'_>) -> Result<Option<FrameOutcome>> {
        match self.shared.try_lock() {
            Ok(mut pipeline) => Ok(Some(pipeline.process_frame(plane))),
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("pipeline busy, dropping frame");
                Ok(None)
            }
            Err(TryLockError::Poisoned(_)) => Err(poisoned()),
        }
    }

    pub fn start(&self) -> Result<()> {
        self.lock()?.start();
        Ok(())
    }

    /// Ends the session and returns its frozen RR sequence.
    pub fn stop(&self) -> Result<RrSeries> {
        Ok(self.lock()?.stop())
    }

    pub fn reset(&self) -> Result<()> {
        self.lock()?.reset();
        Ok(())
    }

    pub fn tick_second(&self) -> Result<SessionTick> {
        Ok(self.lock()?.tick_second())
    }

    pub fn set_session_target(&self, target_secs: Option<u32>) -> Result<()> {
        self.lock()?.set_session_target(target_secs);
        Ok(())
    }

    pub fn status(&self) -> Result<MonitorStatus> {
        let pipeline = self.lock()?;
        Ok(MonitorStatus {
            finger_present: pipeline.finger_present(),
            session_active: pipeline.session_active(),
            display_bpm: pipeline.display_bpm(),
            signal_quality: pipeline.signal_quality(),
            beats: pipeline.session_intervals().len(),
            elapsed_secs: pipeline.elapsed_secs(),
        })
    }

    /// Stops the session and computes metrics over the frozen sequence
    /// outside the lock.
    pub fn finish(&self) -> Result<(RrSeries, HrvMetrics)> {
        let (series, config) = {
            let mut pipeline = self.lock()?;
            (pipeline.stop(), pipeline.config().metrics.clone())
        };
        let metrics = metrics::compute(&series, &config);
        Ok((series, metrics))
    }

    fn lock(&self) -> Result<MutexGuard<'_, PulsePipeline>> {
        self.shared.lock().map_err(|_| poisoned())
    }
}

fn poisoned() -> PulseError {
    PulseError::msg("pulse pipeline has been poisoned")
}

impl std::fmt::Debug for PulseMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseMonitor").finish()
    }
}

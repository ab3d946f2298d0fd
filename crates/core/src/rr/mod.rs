use std::{ops::Deref, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    buffer::RingBuffer,
    config::{OutlierRule, RrConfig},
    peaks::PeakEvent,
};

/// What the validator did with one peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RrOutcome {
    /// First peak after a reset; only sets the anchor.
    Anchored,
    Accepted {
        rr_ms: f64,
        bpm: f64,
        display_bpm: u32,
        /// Whether the interval was appended to the session sequence.
        recorded: bool,
    },
    /// Interval outside the physiological band; anchor kept.
    OutOfBand { rr_ms: f64 },
    /// Instantaneous rate too far from the running average; anchor kept.
    Artifact { rr_ms: f64, bpm: f64 },
    /// Probable finger lift; BPM history cleared and anchor moved.
    SignalGap { gap_ms: f64 },
}

/// Immutable RR sequence frozen at the end of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RrSeries(Arc<[f64]>);

impl Default for RrSeries {
    fn default() -> Self {
        Self::from(Vec::new())
    }
}

impl RrSeries {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for RrSeries {
    fn from(value: Vec<f64>) -> Self {
        Self(value.into())
    }
}

impl Deref for RrSeries {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

/// Turns peak times into RR intervals and gates them for plausibility.
#[derive(Debug, Clone)]
pub struct RrValidator {
    config: RrConfig,
    anchor_ms: Option<f64>,
    bpm_buffer: RingBuffer<f64>,
    session: Vec<f64>,
}

impl RrValidator {
    pub fn new(config: RrConfig) -> Self {
        Self {
            bpm_buffer: RingBuffer::new(config.bpm_buffer_size),
            anchor_ms: None,
            session: Vec::new(),
            config,
        }
    }

    pub fn observe(&mut self, peak: PeakEvent, session_active: bool) -> RrOutcome {
        let now = peak.exact_timestamp_ms;
        let Some(anchor) = self.anchor_ms else {
            self.anchor_ms = Some(now);
            return RrOutcome::Anchored;
        };

        let rr_ms = now - anchor;
        if rr_ms > self.config.gap_threshold_ms {
            tracing::debug!(gap_ms = rr_ms, "signal gap, re-anchoring");
            self.bpm_buffer.clear();
            self.anchor_ms = Some(now);
            return RrOutcome::SignalGap { gap_ms: rr_ms };
        }

        if rr_ms < self.config.min_rr_ms || rr_ms > self.config.max_rr_ms {
            tracing::trace!(rr_ms, "rr interval outside physiological band");
            return RrOutcome::OutOfBand { rr_ms };
        }

        let bpm = 60_000.0 / rr_ms;
        if let Some(average) = self.bpm_buffer.mean() {
            let allowed = self.allowed_deviation();
            if (bpm - average).abs() > allowed {
                tracing::trace!(bpm, average, allowed, "rejecting rate artifact");
                return RrOutcome::Artifact { rr_ms, bpm };
            }
        }

        let recorded = session_active;
        if recorded {
            self.session.push(rr_ms);
        }
        self.bpm_buffer.push(bpm);
        self.anchor_ms = Some(now);

        RrOutcome::Accepted {
            rr_ms,
            bpm,
            display_bpm: self.display_bpm().unwrap_or(0),
            recorded,
        }
    }

    fn allowed_deviation(&self) -> f64 {
        match self.config.outlier_rule {
            OutlierRule::Fixed { max_deviation_bpm } => max_deviation_bpm,
            OutlierRule::Adaptive {
                floor_bpm,
                sigma_multiplier,
            } => {
                let sigma = self.bpm_buffer.std_dev().unwrap_or(0.0);
                floor_bpm.max(sigma_multiplier * sigma)
            }
        }
    }

    /// Rounded mean of the BPM window, for live display.
    pub fn display_bpm(&self) -> Option<u32> {
        self.bpm_buffer.mean().map(|bpm| bpm.round() as u32)
    }

    pub fn bpm_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.bpm_buffer.iter().copied()
    }

    /// Intervals recorded during the current (or last) session.
    pub fn session_intervals(&self) -> &[f64] {
        &self.session
    }

    /// Hands the recorded intervals over and empties the sequence.
    pub fn take_session(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.session)
    }

    /// Forgets the anchor and display history, keeping recorded intervals.
    pub fn reset(&mut self) {
        self.anchor_ms = None;
        self.bpm_buffer.clear();
    }

    pub fn clear_session(&mut self) {
        self.session.clear();
    }
}

impl Default for RrValidator {
    fn default() -> Self {
        Self::new(RrConfig::default())
    }
}

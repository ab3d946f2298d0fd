use serde::{Deserialize, Serialize};

use crate::{buffer::RingBuffer, config::ConditionerConfig};

/// One detrended sample ready for peak detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionedSample {
    pub timestamp_ms: f64,
    pub filtered: f64,
}

/// Smooths the raw intensity stream and removes slow baseline wander.
///
/// `filtered = mean(last 5 raw) - mean(last 30 raw)`; until the baseline
/// window fills up the smoothed value doubles as its own baseline, so the
/// output starts at zero.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    config: ConditionerConfig,
    raw: RingBuffer<f64>,
    filtered: RingBuffer<f64>,
}

impl SignalConditioner {
    pub fn new(config: ConditionerConfig) -> Self {
        Self {
            raw: RingBuffer::new(config.capacity),
            filtered: RingBuffer::new(config.capacity),
            config,
        }
    }

    /// Feeds one raw intensity; returns `None` while history is too short.
    pub fn push(&mut self, timestamp_ms: f64, raw: f64) -> Option<ConditionedSample> {
        self.raw.push(raw);
        if self.raw.len() < self.config.smoothing_window {
            return None;
        }

        let smoothed = self.raw.tail_mean(self.config.smoothing_window)?;
        let baseline = if self.raw.len() >= self.config.baseline_window {
            self.raw.tail_mean(self.config.baseline_window)?
        } else {
            smoothed
        };

        let filtered = smoothed - baseline;
        self.filtered.push(filtered);
        Some(ConditionedSample {
            timestamp_ms,
            filtered,
        })
    }

    /// Filtered history, oldest first.
    pub fn filtered(&self) -> &RingBuffer<f64> {
        &self.filtered
    }

    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    /// Peak-to-peak amplitude of recent filtered samples mapped onto [0, 1].
    pub fn signal_quality(&self) -> f64 {
        match self.filtered.tail_range(self.config.quality_window) {
            Some((min, max)) => ((max - min) / self.config.quality_scale).clamp(0.0, 1.0),
            None => 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.raw.clear();
        self.filtered.clear();
    }
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new(ConditionerConfig::default())
    }
}

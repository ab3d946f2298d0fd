use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{PulseError, Result};

/// Nominal camera rate the thresholds below are tuned for.
pub const NOMINAL_FPS: f64 = 30.0;

/// Largest accepted ROI half-width, well beyond any camera plane.
pub const MAX_ROI_HALF_RANGE: usize = 8192;

/// Top-level configuration structure for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub roi: RoiConfig,
    pub presence: PresenceConfig,
    pub conditioner: ConditionerConfig,
    pub peaks: PeakConfig,
    pub rr: RrConfig,
    pub metrics: MetricsConfig,
    pub spectrum: SpectrumConfig,
    pub observer: ObserverConfig,
}

impl PipelineConfig {
    /// Parses a (possibly partial) JSON document and validates the result.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.roi.step == 0 {
            return Err(PulseError::config("roi.step must be at least 1"));
        }
        if self.roi.half_range == 0 || self.roi.half_range > MAX_ROI_HALF_RANGE {
            return Err(PulseError::config(format!(
                "roi.half_range must be between 1 and {MAX_ROI_HALF_RANGE} (got {})",
                self.roi.half_range
            )));
        }

        let presence = &self.presence;
        if presence.min_brightness > presence.max_brightness {
            return Err(PulseError::config(format!(
                "presence brightness band is inverted ({} > {})",
                presence.min_brightness, presence.max_brightness
            )));
        }
        if presence.max_std_dev <= 0.0 {
            return Err(PulseError::config("presence.max_std_dev must be positive"));
        }
        if presence.loss_hold_frames == 0 {
            return Err(PulseError::config("presence.loss_hold_frames must be at least 1"));
        }

        let cond = &self.conditioner;
        if cond.smoothing_window == 0 || cond.baseline_window == 0 || cond.quality_window == 0 {
            return Err(PulseError::config("conditioner windows must be non-zero"));
        }
        if cond.baseline_window > cond.capacity || cond.quality_window > cond.capacity {
            return Err(PulseError::config(
                "conditioner windows cannot exceed the buffer capacity",
            ));
        }
        if cond.quality_scale <= 0.0 {
            return Err(PulseError::config("conditioner.quality_scale must be positive"));
        }

        if self.peaks.frame_duration_ms <= 0.0 {
            return Err(PulseError::config("peaks.frame_duration_ms must be positive"));
        }
        if self.peaks.threshold_window < 3 {
            return Err(PulseError::config("peaks.threshold_window must cover three samples"));
        }

        let rr = &self.rr;
        if rr.min_rr_ms <= 0.0 || rr.min_rr_ms >= rr.max_rr_ms {
            return Err(PulseError::config(format!(
                "rr band must satisfy 0 < min < max (got {}..{})",
                rr.min_rr_ms, rr.max_rr_ms
            )));
        }
        if rr.gap_threshold_ms < rr.max_rr_ms {
            return Err(PulseError::config(
                "rr.gap_threshold_ms must not be shorter than rr.max_rr_ms",
            ));
        }
        if !(5..=8).contains(&rr.bpm_buffer_size) {
            return Err(PulseError::config(format!(
                "rr.bpm_buffer_size must be between 5 and 8 (got {})",
                rr.bpm_buffer_size
            )));
        }

        if self.metrics.min_clean_samples < 2 || self.metrics.min_samples < 2 {
            return Err(PulseError::config("metrics sample minimums must be at least 2"));
        }
        if self.spectrum.min_bpm >= self.spectrum.max_bpm {
            return Err(PulseError::config("spectrum band is inverted"));
        }
        if self.observer.capacity == 0 {
            return Err(PulseError::config("observer.capacity must be non-zero"));
        }

        Ok(())
    }
}

/// Geometry of the sampled region of interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    /// Pixels sampled on each side of the plane centre.
    pub half_range: usize,
    /// Sub-sampling stride on both axes.
    pub step: usize,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            half_range: 50,
            step: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub min_brightness: f64,
    pub max_brightness: f64,
    /// Upper bound on ROI standard deviation for a fully occluded lens.
    pub max_std_dev: f64,
    /// Consecutive uncovered frames before the finger counts as lifted.
    pub loss_hold_frames: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            min_brightness: 30.0,
            max_brightness: 255.0,
            max_std_dev: 25.0,
            loss_hold_frames: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionerConfig {
    pub capacity: usize,
    pub smoothing_window: usize,
    pub baseline_window: usize,
    pub quality_window: usize,
    /// Peak-to-peak filtered amplitude that maps to a quality of 1.0.
    pub quality_scale: f64,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            smoothing_window: 5,
            baseline_window: 30,
            quality_window: 60,
            quality_scale: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Frames that must elapse after a peak before the next one may fire.
    pub refractory_frames: usize,
    pub threshold_window: usize,
    /// Fraction of the trailing range above the trailing minimum.
    pub threshold_ratio: f64,
    pub frame_duration_ms: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            refractory_frames: 12,
            threshold_window: 60,
            threshold_ratio: 0.5,
            frame_duration_ms: 1000.0 / NOMINAL_FPS,
        }
    }
}

/// How far an instantaneous BPM may stray from the running average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutlierRule {
    Fixed { max_deviation_bpm: f64 },
    /// `max(floor_bpm, sigma_multiplier * stddev(buffer))`
    Adaptive {
        floor_bpm: f64,
        sigma_multiplier: f64,
    },
}

impl Default for OutlierRule {
    fn default() -> Self {
        Self::Fixed {
            max_deviation_bpm: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RrConfig {
    pub min_rr_ms: f64,
    pub max_rr_ms: f64,
    /// Intervals longer than this are treated as a finger lift.
    pub gap_threshold_ms: f64,
    pub bpm_buffer_size: usize,
    pub outlier_rule: OutlierRule,
}

impl Default for RrConfig {
    fn default() -> Self {
        Self {
            min_rr_ms: 375.0,
            max_rr_ms: 1500.0,
            gap_threshold_ms: 2000.0,
            bpm_buffer_size: 5,
            outlier_rule: OutlierRule::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub min_samples: usize,
    pub min_clean_samples: usize,
    pub iqr_multiplier: f64,
    pub nn50_threshold_ms: f64,
    pub histogram_bin_ms: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            min_samples: 20,
            min_clean_samples: 10,
            iqr_multiplier: 1.5,
            nn50_threshold_ms: 50.0,
            histogram_bin_ms: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub enabled: bool,
    pub interval_frames: usize,
    pub min_samples: usize,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_frames: 30,
            min_samples: 128,
            min_bpm: 40.0,
            max_bpm: 200.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Events buffered before new ones are dropped.
    pub capacity: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self { capacity: 512 }
    }
}

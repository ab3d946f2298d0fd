use serde::{Deserialize, Serialize};

use crate::config::RoiConfig;

/// Borrowed single-channel intensity plane as delivered by the camera.
#[derive(Debug, Clone, Copy)]
pub struct LumaPlane<'a> {
    pub data: &'a [u8],
    pub width: usize,
    pub height: usize,
    /// Bytes between the starts of two consecutive rows.
    pub stride: usize,
}

impl<'a> LumaPlane<'a> {
    pub fn new(data: &'a [u8], width: usize, height: usize, stride: usize) -> Self {
        Self {
            data,
            width,
            height,
            stride,
        }
    }

    fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.stride + x).copied()
    }
}

/// Brightness statistics for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub timestamp_ms: f64,
    pub mean_intensity: f64,
    pub std_dev: f64,
}

/// Reduces a frame to the mean and spread of a centred, sub-sampled box.
#[derive(Debug, Clone)]
pub struct RoiSampler {
    half_range: usize,
    step: usize,
}

impl RoiSampler {
    pub fn new(config: &RoiConfig) -> Self {
        Self {
            half_range: config.half_range,
            step: config.step.max(1),
        }
    }

    /// Returns `None` when the region contains no readable pixel.
    pub fn sample(&self, plane: &LumaPlane<'_>, timestamp_ms: f64) -> Option<FrameSample> {
        if plane.width == 0 || plane.height == 0 {
            return None;
        }

        let (cx, cy) = (plane.width / 2, plane.height / 2);
        let span = |centre: usize, limit: usize| {
            centre.saturating_sub(self.half_range)..centre.saturating_add(self.half_range).min(limit)
        };
        let (x_range, y_range) = (span(cx, plane.width), span(cy, plane.height));

        let mut count = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for y in y_range.step_by(self.step) {
            for x in x_range.clone().step_by(self.step) {
                if let Some(value) = plane.pixel(x, y) {
                    let value = f64::from(value);
                    sum += value;
                    sum_sq += value * value;
                    count += 1;
                }
            }
        }

        if count == 0 {
            return None;
        }

        let mean = sum / count as f64;
        let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
        Some(FrameSample {
            timestamp_ms,
            mean_intensity: mean,
            std_dev: variance.sqrt(),
        })
    }
}

impl Default for RoiSampler {
    fn default() -> Self {
        Self::new(&RoiConfig::default())
    }
}

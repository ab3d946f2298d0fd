use serde::{Deserialize, Serialize};

use crate::{config::PresenceConfig, roi::FrameSample};

/// Presence decision for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub present: bool,
    /// Set only on the frame where `present` flipped.
    pub changed: bool,
    /// Whether this frame on its own looked like a covered lens. Differs from
    /// `present` while a loss is being held off.
    pub covered: bool,
}

impl PresenceUpdate {
    /// True when the finger has just been lifted.
    pub fn lost(&self) -> bool {
        self.changed && !self.present
    }
}

/// Decides whether a fingertip fully covers the lens.
///
/// A covered lens is bright enough (torch shining through tissue) and nearly
/// uniform; an uncovered lens sees a mixed scene with a large spread.
#[derive(Debug, Clone)]
pub struct PresenceClassifier {
    config: PresenceConfig,
    present: bool,
    misses: u32,
}

impl PresenceClassifier {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            present: false,
            misses: 0,
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn classify(&mut self, sample: &FrameSample) -> PresenceUpdate {
        let bright = sample.mean_intensity >= self.config.min_brightness
            && sample.mean_intensity <= self.config.max_brightness;
        let uniform = sample.std_dev < self.config.max_std_dev;
        let covered = bright && uniform;

        // acquisition is immediate; loss needs `loss_hold_frames` misses in a row
        let present = if covered {
            self.misses = 0;
            true
        } else {
            self.misses = self.misses.saturating_add(1);
            self.present && self.misses < self.config.loss_hold_frames
        };

        let changed = present != self.present;
        self.present = present;
        if changed {
            tracing::debug!(
                present,
                mean = sample.mean_intensity,
                std_dev = sample.std_dev,
                "finger presence changed"
            );
        }

        PresenceUpdate {
            present,
            changed,
            covered,
        }
    }

    pub fn reset(&mut self) {
        self.present = false;
        self.misses = 0;
    }
}

impl Default for PresenceClassifier {
    fn default() -> Self {
        Self::new(PresenceConfig::default())
    }
}

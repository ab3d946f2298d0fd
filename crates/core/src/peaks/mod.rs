use serde::{Deserialize, Serialize};

use crate::{buffer::RingBuffer, config::PeakConfig};

/// A detected systolic peak, timed to sub-frame precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakEvent {
    pub exact_timestamp_ms: f64,
}

/// Vertex offset of the parabola through three equally spaced samples.
///
/// The result is expressed in sample periods relative to `curr` and lies in
/// `[-0.5, 0.5]` whenever `curr` is a local maximum. An exact plateau has no
/// defined vertex and yields `0.0`.
pub fn parabolic_offset(prev: f64, curr: f64, next: f64) -> f64 {
    let denom = 2.0 * (prev - 2.0 * curr + next);
    if denom != 0.0 {
        (prev - next) / denom
    } else {
        0.0
    }
}

/// Adaptive-threshold local-maximum detector with a refractory period.
///
/// Each call inspects the middle of the newest three filtered samples. The
/// threshold sits halfway through the trailing window's range, so it follows
/// slow amplitude drift without calibration.
#[derive(Debug, Clone)]
pub struct PeakDetector {
    config: PeakConfig,
    frames_since_last_peak: usize,
    last_peak_ms: Option<f64>,
}

impl PeakDetector {
    pub fn new(config: PeakConfig) -> Self {
        Self {
            frames_since_last_peak: config.refractory_frames + 1,
            last_peak_ms: None,
            config,
        }
    }

    pub fn last_peak_ms(&self) -> Option<f64> {
        self.last_peak_ms
    }

    pub fn frames_since_last_peak(&self) -> usize {
        self.frames_since_last_peak
    }

    /// Evaluates the newest filtered sample; `now_ms` is the clock reading
    /// for the frame that produced it.
    pub fn observe(&mut self, filtered: &RingBuffer<f64>, now_ms: f64) -> Option<PeakEvent> {
        self.frames_since_last_peak = self.frames_since_last_peak.saturating_add(1);
        if filtered.len() < 3 {
            return None;
        }

        let mut newest = filtered.tail(3).copied();
        let (prev, curr, next) = (newest.next()?, newest.next()?, newest.next()?);
        if !(curr > prev && curr > next) {
            return None;
        }

        let (min, max) = filtered.tail_range(self.config.threshold_window)?;
        let threshold = min + self.config.threshold_ratio * (max - min);
        if curr <= threshold || self.frames_since_last_peak <= self.config.refractory_frames {
            return None;
        }

        let frame = self.config.frame_duration_ms;
        let delta = parabolic_offset(prev, curr, next);
        let exact_timestamp_ms = now_ms - frame + delta * frame;

        if let Some(last) = self.last_peak_ms {
            if exact_timestamp_ms <= last {
                tracing::trace!(exact_timestamp_ms, last, "dropping non-monotonic peak");
                return None;
            }
        }

        self.frames_since_last_peak = 0;
        self.last_peak_ms = Some(exact_timestamp_ms);
        tracing::trace!(exact_timestamp_ms, delta, threshold, "peak detected");
        Some(PeakEvent { exact_timestamp_ms })
    }

    /// Re-arms the refractory counter after a signal interruption.
    pub fn rearm(&mut self) {
        self.frames_since_last_peak = self.config.refractory_frames + 1;
    }

    /// Forgets every previous peak, used when the clock restarts.
    pub fn reset(&mut self) {
        self.rearm();
        self.last_peak_ms = None;
    }
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self::new(PeakConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::TAU;

    use super::*;
    use crate::clock::{MonotonicClock, SyntheticClock};

    const FPS: f64 = 30.0;

    fn run(values: &[f64]) -> Vec<PeakEvent> {
        let mut detector = PeakDetector::default();
        let mut clock = SyntheticClock::from_fps(FPS);
        let mut filtered = RingBuffer::new(256);
        values
            .iter()
            .filter_map(|&value| {
                filtered.push(value);
                detector.observe(&filtered, clock.now_ms())
            })
            .collect()
    }

    #[test]
    fn recovers_parabola_vertex() {
        let y = |x: f64| -(x - 0.3) * (x - 0.3);
        let delta = parabolic_offset(y(-1.0), y(0.0), y(1.0));
        assert!((delta - 0.3).abs() < 1e-12);
    }

    #[test]
    fn plateau_has_zero_offset() {
        assert_eq!(parabolic_offset(1.0, 1.0, 1.0), 0.0);
        assert_eq!(parabolic_offset(0.0, 2.0, 0.0), 0.0);
    }

    #[test]
    fn emits_one_peak_per_maximum() {
        let peaks = run(&[0.0, 1.0, 3.0, 1.0, 0.0, 0.0]);
        assert_eq!(peaks.len(), 1);
        // curr sits at frame 2, read while frame 3 arrived.
        assert!((peaks[0].exact_timestamp_ms - 2.0 * 1000.0 / FPS).abs() < 1e-9);
    }

    #[test]
    fn ignores_plateaus_and_sub_threshold_ripple() {
        assert!(run(&[0.0, 2.0, 2.0, 0.0]).is_empty());
        // the ripple at 0.2 stays below the midpoint of the 0..4 range
        assert!(run(&[0.0, 4.0, 0.0, 0.1, 0.2, 0.1, 0.0]).len() == 1);
    }

    #[test]
    fn refractory_period_suppresses_double_trigger() {
        let mut values = vec![0.0, 5.0, 0.0];
        values.extend([4.0, 0.0]);
        let peaks = run(&values);
        assert_eq!(peaks.len(), 1);

        let mut spaced = vec![0.0, 5.0, 0.0];
        spaced.extend(std::iter::repeat(0.0).take(12));
        spaced.extend([5.0, 0.0]);
        assert_eq!(run(&spaced).len(), 2);
    }

    #[test]
    fn clean_sinusoid_at_60_bpm() {
        let period_frames = FPS;
        let phase = 0.013;
        let values: Vec<f64> = (0..(10.0 * FPS) as usize)
            .map(|k| (TAU * (k as f64 / period_frames + phase)).sin())
            .collect();

        let peaks = run(&values);
        assert!((9..=11).contains(&peaks.len()), "peaks: {}", peaks.len());

        for pair in peaks.windows(2) {
            let rr = pair[1].exact_timestamp_ms - pair[0].exact_timestamp_ms;
            assert!(rr > 0.0);
            assert!((rr - 1000.0).abs() < 5.0, "rr = {rr}");
        }

        // sin peaks where the phase reaches a quarter turn.
        let true_first_ms = (0.25 - phase) * 1000.0;
        assert!((peaks[0].exact_timestamp_ms - true_first_ms).abs() < 5.0);
    }

    #[test]
    fn peak_times_strictly_increase() {
        let values: Vec<f64> = (0..600)
            .map(|k| {
                let t = k as f64 / FPS;
                (TAU * 1.3 * t).sin() + 0.3 * (TAU * 2.9 * t).sin()
            })
            .collect();

        let peaks = run(&values);
        assert!(peaks.len() > 5);
        assert!(peaks
            .windows(2)
            .all(|pair| pair[1].exact_timestamp_ms > pair[0].exact_timestamp_ms));
    }

    #[test]
    fn reset_forgets_previous_peak() {
        let mut detector = PeakDetector::default();
        let mut filtered = RingBuffer::new(16);
        for (i, value) in [0.0, 5.0, 0.0].into_iter().enumerate() {
            filtered.push(value);
            detector.observe(&filtered, i as f64 * 33.0);
        }
        assert!(detector.last_peak_ms().is_some());
        assert_eq!(detector.frames_since_last_peak(), 0);

        detector.reset();
        assert!(detector.last_peak_ms().is_none());
        assert!(detector.frames_since_last_peak() > 12);
    }
}

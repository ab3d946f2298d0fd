use std::{f64::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex64, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{config::SpectrumConfig, Result};

/// Dominant pulse frequency of the filtered signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralEstimate {
    pub bpm: f64,
    /// Power of the dominant bin against the rest of the heart-rate band.
    pub snr_db: f64,
}

/// FFT cross-check for the time-domain peak detector. Informational only.
///
/// Only the plan for the current window length is cached; it is rebuilt when
/// the filtered history grows, which stops once the buffer is full.
pub struct SpectralEstimator {
    config: SpectrumConfig,
    fft: Option<FftResources>,
}

impl SpectralEstimator {
    pub fn new(config: SpectrumConfig) -> Self {
        Self { config, fft: None }
    }

    pub fn config(&self) -> &SpectrumConfig {
        &self.config
    }

    /// Estimates the pulse rate of `samples` taken at `sample_rate_hz`.
    ///
    /// Returns `Ok(None)` when the window is too short or no bin inside the
    /// configured band carries energy.
    pub fn estimate(&mut self, samples: &[f64], sample_rate_hz: f64) -> Result<Option<SpectralEstimate>> {
        let len = samples.len();
        if len < self.config.min_samples.max(4) || sample_rate_hz <= 0.0 {
            return Ok(None);
        }

        let bin_hz = sample_rate_hz / len as f64;
        let min_hz = self.config.min_bpm / 60.0;
        let max_hz = self.config.max_bpm / 60.0;

        let fft = self.prepare_fft(len);
        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }
        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let mut total = 0.0;
        let mut best: Option<(usize, f64)> = None;
        for (bin, value) in fft.spectrum.iter().enumerate().skip(1) {
            let hz = bin as f64 * bin_hz;
            if hz < min_hz || hz > max_hz {
                continue;
            }
            let power = value.norm_sqr();
            total += power;
            if best.map_or(true, |(_, best_power)| power > best_power) {
                best = Some((bin, power));
            }
        }

        let Some((bin, peak)) = best.filter(|(_, power)| *power > f64::EPSILON) else {
            return Ok(None);
        };

        let noise = total - peak;
        let snr_db = if noise > f64::EPSILON {
            10.0 * (peak / noise).log10()
        } else {
            0.0
        };

        Ok(Some(SpectralEstimate {
            bpm: bin as f64 * bin_hz * 60.0,
            snr_db,
        }))
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let rebuild = self
            .fft
            .as_ref()
            .map(|fft| fft.size != size)
            .unwrap_or(true);

        if rebuild {
            self.fft = None;
        }
        self.fft.get_or_insert_with(|| FftResources::plan(size))
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f64>>,
    scratch: Vec<Complex64>,
    spectrum: Vec<Complex64>,
    input: Vec<f64>,
}

impl FftResources {
    fn plan(size: usize) -> Self {
        let plan = RealFftPlanner::<f64>::new().plan_fft_forward(size);
        Self {
            size,
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

impl fmt::Debug for SpectralEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralEstimator")
            .field("config", &self.config)
            .field("fft_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f64 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f64) / (len as f64 - 1.0)).cos()
}

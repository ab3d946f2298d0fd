use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{self, HrvMetrics};

/// Exportable summary of one measurement session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub avg_bpm: u32,
    pub metrics: HrvMetrics,
    pub stress_index: f64,
    pub beats: usize,
    pub created_at: DateTime<Utc>,
}

impl SessionReport {
    pub fn new(rr: &[f64], metrics: HrvMetrics, created_at: DateTime<Utc>) -> Self {
        Self {
            avg_bpm: metrics::average_bpm(rr).round() as u32,
            stress_index: metrics.stress_index(),
            metrics,
            beats: rr.len(),
            created_at,
        }
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        writeln!(f, "Avg BPM: {}", self.avg_bpm)?;
        writeln!(f, "SDNN: {:.1} ms", m.sdnn)?;
        writeln!(f, "RMSSD: {:.1} ms", m.rmssd)?;
        writeln!(f, "pNN50: {:.1} %", m.pnn50)?;
        writeln!(f, "MxDMn: {:.0} ms", m.mxdmn)?;
        writeln!(f, "AMo50: {:.1} %", m.amo50)?;
        writeln!(f, "Stress index: {:.1}", self.stress_index)?;
        writeln!(f, "Beats: {}", self.beats)?;
        write!(
            f,
            "Timestamp: {}",
            self.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

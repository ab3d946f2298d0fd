//! Core library for the fingertip pulse and HRV pipeline.
//!
//! Frames flow strictly forward through five stages, one frame at a time:
//! ROI sampling ([`roi`]), finger presence ([`presence`]), detrending
//! ([`conditioner`]), peak detection ([`peaks`]) and RR validation ([`rr`]).
//! [`PulsePipeline`] owns all of that state; [`PulseMonitor`] is the shared
//! handle external layers hold. HRV statistics are computed on demand by the
//! pure [`metrics::compute`] over a frozen [`RrSeries`].

pub mod buffer;
pub mod clock;
pub mod conditioner;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod observer;
pub mod peaks;
pub mod pipeline;
pub mod presence;
pub mod report;
pub mod roi;
pub mod rr;
pub mod spectrum;

pub use buffer::RingBuffer;
pub use clock::{MonotonicClock, SessionTick, SessionTimer, SteadyClock, SyntheticClock};
pub use conditioner::{ConditionedSample, SignalConditioner};
pub use config::{
    ConditionerConfig, MetricsConfig, ObserverConfig, OutlierRule, PeakConfig, PipelineConfig,
    PresenceConfig, RoiConfig, RrConfig, SpectrumConfig,
};
pub use error::{PulseError, Result};
pub use metrics::HrvMetrics;
pub use monitor::{MonitorStatus, PulseMonitor};
pub use observer::{EventSink, EventStream, PipelineEvent};
pub use peaks::{parabolic_offset, PeakDetector, PeakEvent};
pub use pipeline::{FrameOutcome, PulsePipeline};
pub use presence::{PresenceClassifier, PresenceUpdate};
pub use report::SessionReport;
pub use roi::{FrameSample, LumaPlane, RoiSampler};
pub use rr::{RrOutcome, RrSeries, RrValidator};
pub use spectrum::{SpectralEstimate, SpectralEstimator};

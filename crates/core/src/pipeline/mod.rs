use std::fmt;

use crate::{
    clock::{MonotonicClock, SessionTick, SessionTimer, SteadyClock},
    conditioner::{ConditionedSample, SignalConditioner},
    metrics::{self, HrvMetrics},
    observer::{EventSink, PipelineEvent},
    peaks::{PeakDetector, PeakEvent},
    presence::{PresenceClassifier, PresenceUpdate},
    roi::{FrameSample, LumaPlane, RoiSampler},
    rr::{RrOutcome, RrSeries, RrValidator},
    spectrum::SpectralEstimator,
    PipelineConfig, Result,
};

/// Everything one frame produced, stage by stage. Later stages are `None`
/// when an earlier one had nothing to pass on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameOutcome {
    pub sample: Option<FrameSample>,
    pub presence: Option<PresenceUpdate>,
    pub conditioned: Option<ConditionedSample>,
    pub peak: Option<PeakEvent>,
    pub rr: Option<RrOutcome>,
}

/// Owns every piece of mutable pipeline state and runs stages 1→5 for one
/// frame at a time.
pub struct PulsePipeline {
    config: PipelineConfig,
    clock: Box<dyn MonotonicClock>,
    sampler: RoiSampler,
    presence: PresenceClassifier,
    conditioner: SignalConditioner,
    detector: PeakDetector,
    validator: RrValidator,
    spectral: SpectralEstimator,
    sink: EventSink,
    timer: SessionTimer,
    session_active: bool,
    last_session: Option<RrSeries>,
    frames_since_spectrum: usize,
}

impl PulsePipeline {
    /// Pipeline timed by the system's monotonic clock, without an observer.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_clock(config, Box::new(SteadyClock::start()), EventSink::disconnected())
    }

    /// Validates `config` and builds a pipeline around `clock` and `sink`.
    pub fn with_clock(
        config: PipelineConfig,
        clock: Box<dyn MonotonicClock>,
        sink: EventSink,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            clock,
            sampler: RoiSampler::new(&config.roi),
            presence: PresenceClassifier::new(config.presence.clone()),
            conditioner: SignalConditioner::new(config.conditioner.clone()),
            detector: PeakDetector::new(config.peaks.clone()),
            validator: RrValidator::new(config.rr.clone()),
            spectral: SpectralEstimator::new(config.spectrum.clone()),
            sink,
            timer: SessionTimer::default(),
            session_active: false,
            last_session: None,
            frames_since_spectrum: 0,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs one frame through the pipeline. Never fails: frames that cannot
    /// contribute are skipped at the stage where they stop being useful.
    pub fn process_frame(&mut self, plane: &LumaPlane<'_>) -> FrameOutcome {
        let now_ms = self.clock.now_ms();
        let mut outcome = FrameOutcome::default();

        let Some(sample) = self.sampler.sample(plane, now_ms) else {
            tracing::trace!(width = plane.width, height = plane.height, "empty roi, skipping frame");
            return outcome;
        };
        outcome.sample = Some(sample);

        let presence = self.presence.classify(&sample);
        outcome.presence = Some(presence);
        if presence.changed {
            self.sink.publish(PipelineEvent::PresenceChanged(presence.present));
        }
        if presence.lost() {
            self.clear_signal();
        }
        if !presence.present || !presence.covered {
            return outcome;
        }

        let Some(conditioned) = self.conditioner.push(now_ms, sample.mean_intensity) else {
            return outcome;
        };
        outcome.conditioned = Some(conditioned);
        self.sink
            .publish(PipelineEvent::ChartSample(conditioned.filtered as f32));
        self.sink.publish(PipelineEvent::SignalQuality(
            self.conditioner.signal_quality() as f32,
        ));
        self.update_spectrum();

        let Some(peak) = self.detector.observe(self.conditioner.filtered(), now_ms) else {
            return outcome;
        };
        outcome.peak = Some(peak);

        let rr = self.validator.observe(peak, self.session_active);
        if let RrOutcome::Accepted {
            rr_ms, display_bpm, ..
        } = rr
        {
            tracing::debug!(rr_ms, display_bpm, "beat accepted");
            self.sink.publish(PipelineEvent::DisplayBpm(display_bpm));
        }
        outcome.rr = Some(rr);
        outcome
    }

    fn update_spectrum(&mut self) {
        let spectrum = self.spectral.config();
        if !spectrum.enabled {
            return;
        }
        self.frames_since_spectrum += 1;
        if self.frames_since_spectrum < spectrum.interval_frames {
            return;
        }
        self.frames_since_spectrum = 0;

        let window: Vec<f64> = self.conditioner.filtered().iter().copied().collect();
        let sample_rate_hz = 1000.0 / self.config.peaks.frame_duration_ms;
        match self.spectral.estimate(&window, sample_rate_hz) {
            Ok(Some(estimate)) => {
                self.sink.publish(PipelineEvent::Spectral(estimate));
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(%err, "spectral estimate failed"),
        }
    }

    /// Drops every rolling buffer and the RR anchor after the finger left the
    /// lens. Recorded session intervals are kept.
    fn clear_signal(&mut self) {
        tracing::debug!("finger lost, clearing signal buffers");
        self.conditioner.reset();
        self.detector.rearm();
        self.validator.reset();
        self.frames_since_spectrum = 0;
    }

    /// Begins a measurement session: clears the RR sequence and restarts the
    /// clock so every recorded peak shares one time base.
    pub fn start(&mut self) {
        tracing::info!("measurement session started");
        self.clock.restart();
        self.detector.reset();
        self.validator.reset();
        self.validator.clear_session();
        self.timer.start();
        self.session_active = true;
        self.last_session = None;
    }

    /// Ends the session and freezes its RR sequence. Calling `stop` again
    /// returns the same frozen series.
    pub fn stop(&mut self) -> RrSeries {
        if !self.session_active {
            return self.last_session.clone().unwrap_or_default();
        }

        self.session_active = false;
        self.timer.stop();
        let series = RrSeries::from(self.validator.take_session());
        tracing::info!(beats = series.len(), "measurement session stopped");
        self.last_session = Some(series.clone());
        series
    }

    /// Abandons any session and returns every stage to its initial state.
    pub fn reset(&mut self) {
        tracing::info!("pipeline reset");
        self.session_active = false;
        self.timer = SessionTimer::default();
        self.last_session = None;
        self.presence.reset();
        self.conditioner.reset();
        self.detector.reset();
        self.validator.reset();
        self.validator.clear_session();
        self.frames_since_spectrum = 0;
    }

    /// Advances the 1 Hz session counter.
    pub fn tick_second(&mut self) -> SessionTick {
        let tick = self.timer.tick();
        if self.session_active {
            self.sink.publish(PipelineEvent::SessionTick(tick));
        }
        tick
    }

    pub fn set_session_target(&mut self, target_secs: Option<u32>) {
        self.timer.set_target(target_secs);
    }

    pub fn session_active(&self) -> bool {
        self.session_active
    }

    pub fn finger_present(&self) -> bool {
        self.presence.is_present()
    }

    pub fn display_bpm(&self) -> Option<u32> {
        self.validator.display_bpm()
    }

    pub fn signal_quality(&self) -> f64 {
        self.conditioner.signal_quality()
    }

    /// Intervals recorded so far in the running session.
    pub fn session_intervals(&self) -> &[f64] {
        self.validator.session_intervals()
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.timer.elapsed_secs()
    }

    /// Metrics over the running session, without freezing it.
    pub fn live_metrics(&self) -> HrvMetrics {
        metrics::compute(self.validator.session_intervals(), &self.config.metrics)
    }
}

impl fmt::Debug for PulsePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulsePipeline")
            .field("session_active", &self.session_active)
            .field("finger_present", &self.presence.is_present())
            .field("filtered", &self.conditioner.filtered().len())
            .field("beats", &self.validator.session_intervals().len())
            .field("elapsed_secs", &self.timer.elapsed_secs())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::f64::consts::TAU;

    use super::*;
    use crate::{clock::SyntheticClock, observer, PipelineConfig};

    pub(crate) const WIDTH: usize = 64;
    pub(crate) const HEIGHT: usize = 48;
    const FPS: f64 = 30.0;

    /// Renders a fingertip frame whose mean brightness follows a pulse wave.
    /// A per-pixel dither keeps sub-integer brightness changes visible.
    pub(crate) fn fingertip_frame(t_secs: f64, bpm: f64) -> Vec<u8> {
        let level = 150.0 + 3.0 * (TAU * bpm / 60.0 * t_secs + 0.3).sin();
        (0..WIDTH * HEIGHT)
            .map(|i| {
                let (x, y) = (i % WIDTH, i / WIDTH);
                let dither = ((x / 2 + (y / 2) * (WIDTH / 2)) % 256) as f64 / 256.0;
                (level + dither).floor() as u8
            })
            .collect()
    }

    pub(crate) fn dark_frame() -> Vec<u8> {
        vec![5; WIDTH * HEIGHT]
    }

    fn pipeline() -> (PulsePipeline, observer::EventStream) {
        let config = PipelineConfig::default();
        let (sink, stream) = observer::channel(100_000);
        let clock = Box::new(SyntheticClock::from_fps(FPS));
        (PulsePipeline::with_clock(config, clock, sink).unwrap(), stream)
    }

    fn feed(pipeline: &mut PulsePipeline, frames: std::ops::Range<usize>, bpm: f64) -> Vec<FrameOutcome> {
        frames
            .map(|k| {
                let frame = fingertip_frame(k as f64 / FPS, bpm);
                pipeline.process_frame(&LumaPlane::new(&frame, WIDTH, HEIGHT, WIDTH))
            })
            .collect()
    }

    #[test]
    fn clean_pulse_yields_regular_intervals() {
        let (mut pipeline, stream) = pipeline();
        pipeline.start();
        feed(&mut pipeline, 0..(30.0 * FPS) as usize, 60.0);
        let series = pipeline.stop();

        assert!(series.len() >= 20, "only {} intervals", series.len());
        for rr in series.iter() {
            assert!((rr - 1000.0).abs() < 15.0, "rr = {rr}");
        }
        assert_eq!(pipeline.display_bpm(), Some(60));

        let metrics = metrics::compute(&series, &pipeline.config().metrics);
        assert!(metrics.is_valid());
        assert!(metrics.sdnn < 10.0);

        let events = stream.drain();
        assert_eq!(events[0], PipelineEvent::PresenceChanged(true));
        assert!(events.contains(&PipelineEvent::DisplayBpm(60)));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Spectral(s) if (s.bpm - 60.0).abs() < 8.0)));
    }

    #[test]
    fn uncovered_lens_produces_no_signal() {
        let (mut pipeline, stream) = pipeline();
        let frame = dark_frame();
        for _ in 0..60 {
            let outcome = pipeline.process_frame(&LumaPlane::new(&frame, WIDTH, HEIGHT, WIDTH));
            assert!(outcome.sample.is_some());
            assert!(outcome.conditioned.is_none());
        }
        assert!(!pipeline.finger_present());
        assert!(stream.drain().is_empty());
    }

    #[test]
    fn degenerate_frame_is_skipped() {
        let (mut pipeline, _stream) = pipeline();
        let outcome = pipeline.process_frame(&LumaPlane::new(&[], 0, 0, 0));
        assert_eq!(outcome, FrameOutcome::default());
    }

    fn lift(pipeline: &mut PulsePipeline, frames: usize) -> Vec<FrameOutcome> {
        let dark = dark_frame();
        (0..frames)
            .map(|_| pipeline.process_frame(&LumaPlane::new(&dark, WIDTH, HEIGHT, WIDTH)))
            .collect()
    }

    fn anchors(outcomes: &[FrameOutcome]) -> usize {
        outcomes
            .iter()
            .filter(|o| o.rr == Some(RrOutcome::Anchored))
            .count()
    }

    #[test]
    fn finger_lift_resets_and_recovers() {
        let (mut pipeline, stream) = pipeline();
        pipeline.start();

        let mut outcomes = feed(&mut pipeline, 0..300, 60.0);
        outcomes.extend(lift(&mut pipeline, 90));
        assert_eq!(pipeline.display_bpm(), None);
        outcomes.extend(feed(&mut pipeline, 390..900, 60.0));

        // the anchor goes with the lift, so the return starts a fresh one
        assert_eq!(anchors(&outcomes), 2);
        assert!(!outcomes
            .iter()
            .any(|o| matches!(o.rr, Some(RrOutcome::SignalGap { .. }))));

        let events = stream.drain();
        assert!(events.contains(&PipelineEvent::PresenceChanged(false)));
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == PipelineEvent::PresenceChanged(true))
                .count(),
            2
        );

        let series = pipeline.stop();
        assert!(series.len() >= 15);
        assert!(series.iter().all(|rr| (375.0..=1500.0).contains(rr)));
        let near_nominal = series.iter().filter(|rr| (*rr - 1000.0).abs() < 15.0).count();
        assert!(near_nominal + 2 >= series.len());
    }

    #[test]
    fn brief_lift_does_not_lock_onto_half_rate() {
        for start in [300, 309, 318, 327, 336] {
            for frames in [2, 4, 6, 8] {
                let (mut pipeline, _stream) = pipeline();
                pipeline.start();

                feed(&mut pipeline, 0..start, 100.0);
                let mut outcomes = lift(&mut pipeline, frames);
                let resume = start + frames;
                outcomes.extend(feed(&mut pipeline, resume..resume + 600, 100.0));
                assert_eq!(anchors(&outcomes), 1, "lift at {start} for {frames}");

                let series = pipeline.stop();
                let off = |rr: &f64| (rr - 600.0).abs() > 100.0;
                assert!(series.len() >= 35, "lift at {start} for {frames}: {series:?}");
                assert!(
                    series.iter().all(|rr| *rr < 900.0),
                    "lift at {start} for {frames}: {series:?}"
                );
                assert!(
                    series.iter().filter(|rr| off(rr)).count() <= 1,
                    "lift at {start} for {frames}: {series:?}"
                );
                assert!(
                    !series[series.len() - 10..].iter().any(off),
                    "lift at {start} for {frames}: {series:?}"
                );
            }
        }
    }

    #[test]
    fn held_dropout_skips_frames_without_clearing() {
        let mut config = PipelineConfig::default();
        config.presence.loss_hold_frames = 5;
        let (sink, stream) = observer::channel(100_000);
        let clock = Box::new(SyntheticClock::from_fps(FPS));
        let mut pipeline = PulsePipeline::with_clock(config, clock, sink).unwrap();
        pipeline.start();

        feed(&mut pipeline, 0..300, 60.0);
        let display = pipeline.display_bpm();
        for outcome in lift(&mut pipeline, 3) {
            assert!(outcome.presence.is_some_and(|p| p.present && !p.covered));
            assert!(outcome.conditioned.is_none());
        }
        assert!(pipeline.finger_present());
        assert_eq!(pipeline.display_bpm(), display);
        assert!(!stream
            .drain()
            .contains(&PipelineEvent::PresenceChanged(false)));

        lift(&mut pipeline, 5);
        assert!(!pipeline.finger_present());
        assert_eq!(pipeline.display_bpm(), None);
    }

    #[test]
    fn constructors_validate_the_config() {
        let mut config = PipelineConfig::default();
        config.rr.bpm_buffer_size = 2;
        assert!(PulsePipeline::new(config).is_err());
    }

    #[test]
    fn stop_freezes_the_sequence() {
        let (mut pipeline, _stream) = pipeline();
        pipeline.start();
        feed(&mut pipeline, 0..450, 60.0);
        let frozen = pipeline.stop();
        assert!(!frozen.is_empty());

        feed(&mut pipeline, 450..900, 60.0);
        assert!(pipeline.session_intervals().is_empty());
        assert_eq!(pipeline.stop(), frozen);
        assert!(pipeline.display_bpm().is_some());
    }

    #[test]
    fn peaks_before_start_are_not_recorded() {
        let (mut pipeline, _stream) = pipeline();
        let outcomes = feed(&mut pipeline, 0..300, 60.0);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o.rr, Some(RrOutcome::Accepted { recorded: false, .. }))));
        assert!(pipeline.session_intervals().is_empty());
    }

    #[test]
    fn reset_discards_everything() {
        let (mut pipeline, _stream) = pipeline();
        pipeline.start();
        feed(&mut pipeline, 0..300, 60.0);
        pipeline.tick_second();

        pipeline.reset();
        assert!(!pipeline.session_active());
        assert!(!pipeline.finger_present());
        assert!(pipeline.session_intervals().is_empty());
        assert_eq!(pipeline.elapsed_secs(), 0);
        assert!(pipeline.stop().is_empty());
        assert_eq!(pipeline.live_metrics(), HrvMetrics::default());
    }

    #[test]
    fn session_ticks_are_published_while_active() {
        let (mut pipeline, stream) = pipeline();
        pipeline.set_session_target(Some(2));
        pipeline.tick_second();
        assert!(stream.drain().is_empty());

        pipeline.start();
        pipeline.tick_second();
        let tick = pipeline.tick_second();
        assert!(tick.finished);
        assert_eq!(stream.drain().len(), 2);
    }
}

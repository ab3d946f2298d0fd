use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use pulse_hrv_core::{
    metrics, EventStream, LumaPlane, PipelineConfig, PipelineEvent, PulseError, PulseMonitor,
    SessionReport, SyntheticClock,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

const FRAME_WIDTH: usize = 160;
const FRAME_HEIGHT: usize = 120;
const FRAME_STRIDE: usize = 176;

fn main() -> pulse_hrv_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            bpm,
            seconds,
            fps,
            seed,
            config,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            run_simulation(config, &SimulationParams { bpm, seconds, fps, seed }, json)
        }
        Commands::Analyze {
            input,
            config,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            run_analyze(&input, &config, json)
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
            Ok(())
        }
    }
}

struct SimulationParams {
    bpm: f64,
    seconds: u32,
    fps: f64,
    seed: u64,
}

fn run_simulation(
    config: PipelineConfig,
    params: &SimulationParams,
    json: bool,
) -> pulse_hrv_core::Result<()> {
    tracing::info!(bpm = params.bpm, seconds = params.seconds, fps = params.fps, "starting simulation");

    let (monitor, events) = PulseMonitor::new(config, Box::new(SyntheticClock::from_fps(params.fps)))?;
    monitor.set_session_target(Some(params.seconds))?;

    let mut finger = SyntheticFinger::new(params.bpm, params.seed);
    let mut frame = vec![0u8; FRAME_STRIDE * FRAME_HEIGHT];
    let frames_per_second = params.fps.round().max(1.0) as u64;
    let lead_in = frames_per_second;
    let mut session_frames = 0u64;
    let mut session_started = false;
    let mut k = 0u64;

    loop {
        let t = k as f64 / params.fps;
        finger.render(&mut frame, t, k >= lead_in);
        let plane = LumaPlane::new(&frame, FRAME_WIDTH, FRAME_HEIGHT, FRAME_STRIDE);
        monitor.push_frame(&plane)?;

        if log_events(&events) && !session_started {
            monitor.start()?;
            session_started = true;
        }

        if session_started {
            session_frames += 1;
            if session_frames % frames_per_second == 0 {
                let tick = monitor.tick_second()?;
                if tick.finished {
                    break;
                }
            }
        }

        k += 1;
        if k > (u64::from(params.seconds) + 10) * frames_per_second {
            return Err(PulseError::msg("finger was never detected"));
        }
    }

    let (series, hrv) = monitor.finish()?;
    log_events(&events);
    let report = SessionReport::new(&series, hrv, chrono::Utc::now());
    print_report(&report, json)
}

/// Logs queued events; returns true if the finger was placed on the lens.
fn log_events(events: &EventStream) -> bool {
    let mut placed = false;
    for event in events.drain() {
        match event {
            PipelineEvent::PresenceChanged(present) => {
                tracing::info!(present, "finger presence changed");
                placed |= present;
            }
            PipelineEvent::DisplayBpm(bpm) => tracing::info!(bpm, "heart rate"),
            PipelineEvent::Spectral(estimate) => {
                tracing::debug!(bpm = estimate.bpm, snr_db = estimate.snr_db, "spectral estimate")
            }
            PipelineEvent::SessionTick(tick) => {
                tracing::debug!(elapsed = tick.elapsed_secs, remaining = ?tick.remaining_secs, "session tick")
            }
            PipelineEvent::SignalQuality(quality) => tracing::trace!(quality, "signal quality"),
            PipelineEvent::ChartSample(value) => tracing::trace!(value, "chart sample"),
        }
    }
    placed
}

fn run_analyze(input: &Path, config: &PipelineConfig, json: bool) -> pulse_hrv_core::Result<()> {
    tracing::info!(?input, "analysing rr intervals");
    let rr = read_rr_intervals(input)?;
    let hrv = metrics::compute(&rr, &config.metrics);
    if !hrv.is_valid() {
        tracing::warn!(
            intervals = rr.len(),
            required = config.metrics.min_samples,
            "not enough intervals for hrv metrics"
        );
    }
    print_report(&SessionReport::new(&rr, hrv, chrono::Utc::now()), json)
}

/// Accepts either a JSON array or one interval (ms) per line.
fn read_rr_intervals(path: &Path) -> pulse_hrv_core::Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)?;
    if text.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(&text)?);
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            line.parse::<f64>()
                .map_err(|err| PulseError::msg(format!("invalid rr interval `{line}`: {err}")))
        })
        .collect()
}

fn print_report(report: &SessionReport, json: bool) -> pulse_hrv_core::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> pulse_hrv_core::Result<PipelineConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            PipelineConfig::load(path)
        }
        None => Ok(PipelineConfig::default()),
    }
}

/// Renders torch-lit fingertip frames with a beating pulse, slow baseline
/// drift and sensor noise. Before the finger is placed the camera sees a
/// noisy, high-contrast scene.
struct SyntheticFinger {
    rng: StdRng,
    mean_rr_ms: f64,
    beat_start_s: f64,
    beat_len_s: f64,
}

impl SyntheticFinger {
    fn new(bpm: f64, seed: u64) -> Self {
        let mean_rr_ms = 60_000.0 / bpm.clamp(40.0, 200.0);
        Self {
            rng: StdRng::seed_from_u64(seed),
            mean_rr_ms,
            beat_start_s: 0.0,
            beat_len_s: mean_rr_ms / 1000.0,
        }
    }

    fn pulse(&mut self, t: f64) -> f64 {
        while t >= self.beat_start_s + self.beat_len_s {
            self.beat_start_s += self.beat_len_s;
            let jitter = self.rng.gen_range(-0.04..0.04);
            self.beat_len_s = self.mean_rr_ms * (1.0 + jitter) / 1000.0;
        }
        let u = (t - self.beat_start_s) / self.beat_len_s;
        let tau = std::f64::consts::TAU;
        (tau * u).sin() + 0.25 * (2.0 * tau * u + 0.8).sin()
    }

    fn render(&mut self, frame: &mut [u8], t: f64, finger_on: bool) {
        if !finger_on {
            for pixel in frame.iter_mut() {
                *pixel = self.rng.gen();
            }
            return;
        }

        let drift = 4.0 * (std::f64::consts::TAU * 0.05 * t).sin();
        let level = 140.0 + drift + 2.5 * self.pulse(t);
        for row in frame.chunks_mut(FRAME_STRIDE) {
            for pixel in row.iter_mut().take(FRAME_WIDTH) {
                let noise: f64 = self.rng.gen_range(-1.0..1.0);
                *pixel = (level + noise).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Fingertip pulse and HRV pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline over synthetic fingertip footage and print a report.
    Simulate {
        /// Mean heart rate of the simulated pulse.
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        /// Session length once the finger is detected.
        #[arg(long, default_value_t = 60)]
        seconds: u32,
        /// Camera frame rate.
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        /// Seed for beat jitter and sensor noise.
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Compute HRV metrics from a recorded RR interval file.
    Analyze {
        /// JSON array or newline-separated intervals in milliseconds.
        input: PathBuf,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the default configuration as JSON.
    Config,
}

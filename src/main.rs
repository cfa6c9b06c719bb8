use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dance_tracker::config::{CameraSettings, Config};
use dance_tracker::detector::LandmarkReplay;
use dance_tracker::recording;
use dance_tracker::report::TracingSink;
use dance_tracker::session::{CalibrationSettings, SessionConfig, SessionController, StopHandle};
use dance_tracker::video::FrameSource;
use dance_tracker::{SessionState, Topology};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let topology = Arc::new(load_topology(&config)?);

    match cli.command {
        Commands::Run {
            reference,
            landmarks,
            no_save,
        } => run_session(config, topology, reference, landmarks, no_save).await,
        Commands::Calibrate { landmarks } => run_calibration(config, topology, landmarks).await,
        Commands::Record {
            output,
            landmarks,
            duration,
        } => run_record(config, topology, output, landmarks, duration).await,
        Commands::Inspect { recording } => inspect(&topology, &recording),
    }
}

async fn run_session(
    config: Config,
    topology: Arc<Topology>,
    reference: PathBuf,
    landmarks: Option<PathBuf>,
    no_save: bool,
) -> Result<()> {
    let mut session = SessionConfig::from_config(&config, reference);
    if no_save {
        session.persist = false;
    }
    let stop = stop_on_ctrl_c();

    let outcome = tokio::task::spawn_blocking(move || -> Result<_> {
        let source = open_source(&config.camera)?;
        let detector = open_detector(landmarks.as_deref())?;
        let mut controller = SessionController::new(source, detector, topology).with_stop_handle(stop);
        let outcome = controller
            .run(&session, &mut TracingSink)
            .with_context(|| format!("starting session against {}", session.reference.display()))?;
        Ok(outcome)
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    if let Some(path) = &outcome.recording {
        tracing::info!(path = %path.display(), "live take saved");
    }
    if outcome.state == SessionState::Faulted {
        bail!(
            "{}",
            outcome.summary.fault.as_deref().unwrap_or("camera unavailable")
        );
    }
    Ok(())
}

async fn run_calibration(
    config: Config,
    topology: Arc<Topology>,
    landmarks: Option<PathBuf>,
) -> Result<()> {
    let stop = stop_on_ctrl_c();
    let settings = CalibrationSettings::from(&config.calibration);

    let outcome = tokio::task::spawn_blocking(move || -> Result<_> {
        let source = open_source(&config.camera)?;
        let detector = open_detector(landmarks.as_deref())?;
        let mut controller = SessionController::new(source, detector, topology).with_stop_handle(stop);
        Ok(controller.calibrate(settings, &mut TracingSink))
    })
    .await??;

    if let Some(fault) = outcome.fault {
        bail!(fault);
    }
    if !outcome.passed {
        bail!(
            "no steady detection for {}s within {}s",
            settings.window_secs,
            settings.timeout_secs
        );
    }
    println!("calibration passed after {} frames", outcome.frames);
    Ok(())
}

async fn run_record(
    config: Config,
    topology: Arc<Topology>,
    output: PathBuf,
    landmarks: Option<PathBuf>,
    duration: Option<f64>,
) -> Result<()> {
    let duration = duration.unwrap_or(config.record.duration_secs);
    if !(duration > 0.0) {
        bail!("duration must be positive");
    }
    let mode = config.session.mode;
    let stop = stop_on_ctrl_c();

    let outcome = tokio::task::spawn_blocking(move || -> Result<_> {
        let source = open_source(&config.camera)?;
        let detector = open_detector(landmarks.as_deref())?;
        let mut controller = SessionController::new(source, detector, topology).with_stop_handle(stop);
        let outcome = controller
            .record(duration, mode, &output)
            .with_context(|| format!("recording to {}", output.display()))?;
        Ok(outcome)
    })
    .await??;

    match (outcome.state, outcome.path) {
        (SessionState::Faulted, _) => bail!("camera unavailable, recording discarded"),
        (_, Some(path)) => println!("saved {} frames to {}", outcome.frames, path.display()),
        (_, None) => println!("nothing captured"),
    }
    Ok(())
}

fn inspect(topology: &Topology, path: &Path) -> Result<()> {
    let timeline = recording::load_recording(path, topology)
        .with_context(|| format!("reading {}", path.display()))?;
    let empty = timeline.iter().filter(|s| s.is_empty()).count();

    println!("name:     {}", timeline.name());
    println!("frames:   {}", timeline.len());
    println!("empty:    {empty}");
    println!("duration: {:.3}s", timeline.duration().unwrap_or(0.0));
    println!("joints:   {}", topology.len());
    Ok(())
}

fn load_topology(config: &Config) -> Result<Topology> {
    match &config.paths.topology {
        Some(path) => {
            Topology::load(path).with_context(|| format!("loading topology {}", path.display()))
        }
        None => Topology::bundled().context("loading bundled topology"),
    }
}

fn open_detector(landmarks: Option<&Path>) -> Result<LandmarkReplay> {
    match landmarks {
        Some(path) => Ok(LandmarkReplay::load(path)?),
        None => {
            tracing::warn!("no landmark file given, every frame will report no person");
            Ok(LandmarkReplay::new(Vec::new()))
        }
    }
}

#[cfg(feature = "camera")]
fn open_source(camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let camera = dance_tracker::video::Camera::open(camera.index, camera.width, camera.height, camera.fps)?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "camera"))]
fn open_source(camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    tracing::warn!("built without camera support, using blank frames");
    Ok(Box::new(dance_tracker::video::BlankSource::new(
        camera.width,
        camera.height,
        camera.fps,
    )))
}

fn stop_on_ctrl_c() -> StopHandle {
    let stop = StopHandle::default();
    let handle = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stop requested");
            handle.request_stop();
        }
    });
    stop
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Score live dancing against a recorded reference", long_about = None)]
struct Cli {
    /// Settings file; defaults apply when it does not exist.
    #[arg(short, long, global = true, default_value = "dance_tracker.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Practice against a reference recording.
    Run {
        /// Reference recording (CSV).
        #[arg(short, long)]
        reference: PathBuf,
        /// Pre-computed landmarks to replay as detector output.
        #[arg(short, long)]
        landmarks: Option<PathBuf>,
        /// Do not save the live take.
        #[arg(long)]
        no_save: bool,
    },
    /// Check that the camera sees a person steadily.
    Calibrate {
        #[arg(short, long)]
        landmarks: Option<PathBuf>,
    },
    /// Capture a new reference recording.
    Record {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        landmarks: Option<PathBuf>,
        /// Seconds to record; taken from the config when omitted.
        #[arg(short, long)]
        duration: Option<f64>,
    },
    /// Print a summary of a recording.
    Inspect { recording: PathBuf },
}

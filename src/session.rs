// src/session.rs - Capture, reconstruct and score loop
use crate::compare::{Comparator, ComparatorKind};
use crate::config::Config;
use crate::detector::{Detection, PoseDetector};
use crate::error::{Result, TrackerError};
use crate::recording::{self, RecordingStore};
use crate::report::{ScoreSink, SessionSummary};
use crate::skeleton::{DimensionMode, Skeleton};
use crate::timeline::PoseTimeline;
use crate::topology::Topology;
use crate::video::FrameSource;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic seconds from an arbitrary origin.
pub trait Clock {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Stop flag shared with whoever controls the session. Polled once per
/// iteration, so one more frame may be processed after a request.
///
/// A request made before a loop starts ends it at the first poll. The flag
/// clears when a loop ends.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Running,
    /// Ended by an external stop request.
    Stopped,
    /// Reference duration exhausted.
    Finished,
    /// Camera read failed. Not retried.
    Faulted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Stopped | SessionState::Finished | SessionState::Faulted
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Finished => "finished",
            SessionState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Everything a run needs, fixed when the run starts.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub reference: PathBuf,
    pub mode: DimensionMode,
    pub comparator: ComparatorKind,
    pub require_complete: bool,
    /// Save the live timeline on Stopped/Finished.
    pub persist: bool,
    pub output_dir: PathBuf,
}

impl SessionConfig {
    pub fn new(reference: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            reference: reference.into(),
            mode: DimensionMode::default(),
            comparator: ComparatorKind::default(),
            require_complete: false,
            persist: false,
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &Config, reference: impl Into<PathBuf>) -> Self {
        Self {
            reference: reference.into(),
            mode: config.session.mode,
            comparator: config.session.comparator,
            require_complete: config.session.require_complete,
            persist: config.session.persist,
            output_dir: config.paths.output_dir.clone(),
        }
    }
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub summary: SessionSummary,
    pub live: PoseTimeline,
    /// Where the live take was saved, if it was.
    pub recording: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSettings {
    pub window_secs: f64,
    pub timeout_secs: f64,
}

impl From<&crate::config::CalibrationSettings> for CalibrationSettings {
    fn from(c: &crate::config::CalibrationSettings) -> Self {
        Self {
            window_secs: c.window_secs,
            timeout_secs: c.timeout_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    pub passed: bool,
    pub frames: usize,
    /// Times a missed detection restarted the window.
    pub resets: usize,
    pub fault: Option<String>,
}

#[derive(Debug)]
pub struct RecordOutcome {
    pub state: SessionState,
    pub frames: usize,
    pub path: Option<PathBuf>,
}

/// State of one run: reference, live take and the playback origin.
struct Session {
    reference: PoseTimeline,
    live: PoseTimeline,
    comparator: Comparator,
    started: f64,
    summary: SessionSummary,
}

/// Owns the camera for its lifetime; one session at a time.
pub struct SessionController<S, D, C = WallClock> {
    source: S,
    detector: D,
    clock: C,
    topology: Arc<Topology>,
    state: SessionState,
    stop: StopHandle,
}

impl<S: FrameSource, D: PoseDetector> SessionController<S, D, WallClock> {
    pub fn new(source: S, detector: D, topology: Arc<Topology>) -> Self {
        Self::with_clock(source, detector, topology, WallClock::new())
    }
}

impl<S: FrameSource, D: PoseDetector, C: Clock> SessionController<S, D, C> {
    pub fn with_clock(source: S, detector: D, topology: Arc<Topology>, clock: C) -> Self {
        Self {
            source,
            detector,
            clock,
            topology,
            state: SessionState::Idle,
            stop: StopHandle::default(),
        }
    }

    /// Shares an existing stop flag, e.g. one raised from a signal handler.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Plays a session against the reference recording until the reference
    /// runs out, a stop is requested, or the camera fails.
    ///
    /// Load problems abort before the session starts and come back as `Err`.
    /// A camera failure ends the session in [`SessionState::Faulted`].
    pub fn run(&mut self, config: &SessionConfig, sink: &mut dyn ScoreSink) -> Result<SessionOutcome> {
        let mut session = match self.start(config) {
            Ok(session) => session,
            Err(e) => {
                self.state = SessionState::Idle;
                return Err(e);
            }
        };
        let duration = session.reference.duration()?;

        tracing::info!(
            reference = %config.reference.display(),
            frames = session.reference.len(),
            duration,
            mode = %config.mode,
            comparator = ?config.comparator,
            "session running"
        );

        let mut fault = None;
        let end_state = loop {
            if self.stop.is_requested() {
                break SessionState::Stopped;
            }
            if self.clock.now() - session.started >= duration {
                break SessionState::Finished;
            }

            let skeleton = match self.capture(session.started, config.mode) {
                Ok(skeleton) => skeleton,
                Err(e) => {
                    fault = Some(e.to_string());
                    break SessionState::Faulted;
                }
            };

            let timestamp = skeleton.timestamp();
            let target = session.reference.nearest(timestamp)?;
            let score = session.comparator.compare(&skeleton, target);
            sink.report_score(timestamp, &score);
            session.summary.record(&score);
            session.live.append(skeleton);
        };

        self.state = end_state;
        self.stop.reset();
        session.summary.state = end_state.to_string();
        tracing::info!(
            state = %end_state,
            frames = session.summary.frames,
            mean_error = ?session.summary.mean_error,
            "session ended"
        );

        if let Some(message) = &fault {
            let message = camera_unavailable(message);
            sink.report_fault(&message);
            session.summary.fault = Some(message);
        }

        let recording = if config.persist && end_state != SessionState::Faulted && !session.live.is_empty() {
            self.persist(&session, &config.output_dir)
        } else {
            None
        };

        Ok(SessionOutcome {
            state: end_state,
            summary: session.summary,
            live: session.live,
            recording,
        })
    }

    fn start(&mut self, config: &SessionConfig) -> Result<Session> {
        self.state = SessionState::Loading;
        let reference = recording::load_recording(&config.reference, &self.topology)?;
        if reference.is_empty() {
            return Err(TrackerError::data_file(&config.reference, "recording has no frames"));
        }

        let comparator =
            Comparator::new(config.comparator).with_require_complete(config.require_complete);
        let summary = SessionSummary::new(reference.name());

        self.state = SessionState::Running;
        Ok(Session {
            reference,
            live: PoseTimeline::new(Vec::new(), "live"),
            comparator,
            started: self.clock.now(),
            summary,
        })
    }

    fn persist(&self, session: &Session, output_dir: &Path) -> Option<PathBuf> {
        let store = RecordingStore::new(output_dir);
        let saved = store.save(&session.live, &self.topology).and_then(|path| {
            store.write_summary(&session.summary, &path)?;
            Ok(path)
        });
        match saved {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!(error = %e, "failed to save live take");
                None
            }
        }
    }

    /// Checks that a person stays detected for a full window.
    ///
    /// Any frame without a person restarts the window. Fails when no window
    /// completes before the timeout, on stop, or on a camera failure.
    pub fn calibrate(
        &mut self,
        settings: CalibrationSettings,
        sink: &mut dyn ScoreSink,
    ) -> CalibrationOutcome {
        let started = self.clock.now();
        let mut window_start = started;
        let mut in_window = 0usize;
        let mut outcome = CalibrationOutcome {
            passed: false,
            frames: 0,
            resets: 0,
            fault: None,
        };

        tracing::info!(window = settings.window_secs, timeout = settings.timeout_secs, "calibrating");

        loop {
            if self.stop.is_requested() {
                break;
            }
            let now = self.clock.now();
            if in_window > 0 && now - window_start >= settings.window_secs {
                outcome.passed = true;
                break;
            }
            if now - started >= settings.timeout_secs {
                break;
            }

            let frame = match self.source.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    let message = camera_unavailable(&e.to_string());
                    sink.report_fault(&message);
                    outcome.fault = Some(message);
                    break;
                }
            };
            outcome.frames += 1;

            if self.detect(&frame).is_person() {
                in_window += 1;
            } else {
                window_start = self.clock.now();
                in_window = 0;
                outcome.resets += 1;
                tracing::debug!(frame = frame.sequence, "no person, calibration window restarted");
            }
        }

        self.stop.reset();
        sink.report_calibration(outcome.passed);
        outcome
    }

    /// Captures a new reference take of `duration_secs` and saves it at `output`.
    pub fn record(&mut self, duration_secs: f64, mode: DimensionMode, output: &Path) -> Result<RecordOutcome> {
        let name = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "take".to_string());
        let mut take = PoseTimeline::new(Vec::new(), name);

        self.state = SessionState::Running;
        let started = self.clock.now();
        tracing::info!(output = %output.display(), duration_secs, %mode, "recording reference");

        let end_state = loop {
            if self.stop.is_requested() {
                break SessionState::Stopped;
            }
            if self.clock.now() - started >= duration_secs {
                break SessionState::Finished;
            }
            match self.capture(started, mode) {
                Ok(skeleton) => {
                    take.append(skeleton);
                }
                Err(e) => {
                    tracing::error!(error = %e, "recording aborted");
                    break SessionState::Faulted;
                }
            }
        };
        self.state = end_state;
        self.stop.reset();

        let path = if end_state != SessionState::Faulted && !take.is_empty() {
            recording::save_recording(&take, &self.topology, output)?;
            Some(output.to_path_buf())
        } else {
            None
        };

        Ok(RecordOutcome {
            state: end_state,
            frames: take.len(),
            path,
        })
    }

    /// Reads, detects and reconstructs one frame. Only a failed read is an error.
    fn capture(&mut self, started: f64, mode: DimensionMode) -> Result<Skeleton> {
        let frame = self.source.read_frame().map_err(|e| match e {
            TrackerError::CameraFault(_) => e,
            other => TrackerError::CameraFault(other.to_string()),
        })?;
        let timestamp = self.clock.now() - started;

        let skeleton = match self.detect(&frame) {
            Detection::NoPerson => Skeleton::empty(&self.topology, timestamp),
            Detection::Person(raw) => {
                let result = Skeleton::reconstruct(&self.topology, &raw, timestamp, mode);
                if !result.degraded.is_empty() {
                    tracing::debug!(
                        frame = frame.sequence,
                        degraded = result.degraded.len(),
                        "partial skeleton"
                    );
                }
                result.skeleton
            }
        };
        Ok(skeleton)
    }

    fn detect(&mut self, frame: &crate::video::Frame) -> Detection {
        match self.detector.detect(frame) {
            Ok(detection) => detection,
            Err(e) => {
                tracing::warn!(frame = frame.sequence, error = %e, "detector failed, treating as no person");
                Detection::NoPerson
            }
        }
    }
}

fn camera_unavailable(reason: &str) -> String {
    if reason.starts_with("camera unavailable") {
        reason.to_string()
    } else {
        format!("camera unavailable: {reason}")
    }
}

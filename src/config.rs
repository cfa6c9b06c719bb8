// src/config.rs
use crate::compare::ComparatorKind;
use crate::error::{Result, TrackerError};
use crate::skeleton::DimensionMode;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub calibration: CalibrationSettings,
    #[serde(default)]
    pub record: RecordSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub camera: CameraSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// "2D" drops depth everywhere, "3D" keeps it
    #[serde(default)]
    pub mode: DimensionMode,
    #[serde(default)]
    pub comparator: ComparatorKind,
    /// Score only frames where every joint is seen on both sides
    #[serde(default)]
    pub require_complete: bool,
    /// Save the live take when the session ends
    #[serde(default = "default_true")]
    pub persist: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationSettings {
    /// Seconds of uninterrupted detection needed to pass
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,
    /// Give up after this many seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordSettings {
    #[serde(default = "default_record_secs")]
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathSettings {
    /// Bone table; the bundled one is used when unset
    #[serde(default)]
    pub topology: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraSettings {
    #[serde(default)]
    pub index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_true() -> bool { true }
fn default_window_secs() -> f64 { 3.0 }
fn default_timeout_secs() -> f64 { 30.0 }
fn default_record_secs() -> f64 { 10.0 }
fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_fps() -> u32 { 30 }

fn default_output_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(|p| p.join("DanceTracker")))
        .unwrap_or_else(|| PathBuf::from("./output"))
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode: DimensionMode::default(),
            comparator: ComparatorKind::default(),
            require_complete: false,
            persist: default_true(),
        }
    }
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RecordSettings {
    fn default() -> Self {
        Self {
            duration_secs: default_record_secs(),
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            topology: None,
            output_dir: default_output_dir(),
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::parse(&content)
            .map_err(|e| TrackerError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Falls back to defaults when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<()> {
        let cal = &self.calibration;
        if !(cal.window_secs > 0.0) || !(cal.timeout_secs >= cal.window_secs) {
            return Err(TrackerError::Config(format!(
                "calibration window {}s must be positive and within timeout {}s",
                cal.window_secs, cal.timeout_secs
            )));
        }
        if !(self.record.duration_secs > 0.0) {
            return Err(TrackerError::Config("record duration must be positive".into()));
        }
        Ok(())
    }
}

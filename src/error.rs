// src/error.rs
use std::path::PathBuf;

/// Result alias carrying [`TrackerError`].
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors surfaced by the tracker library.
///
/// A detector reporting no person is not an error; it is
/// [`crate::detector::Detection::NoPerson`].
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Topology or recording resource missing or malformed.
    #[error("data file {path}: {reason}")]
    DataFile { path: PathBuf, reason: String },

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Device read failure. Terminal for a running session.
    #[error("camera unavailable: {0}")]
    CameraFault(String),

    /// `nearest`/`last` called on a timeline with no skeletons.
    #[error("timeline '{0}' is empty")]
    TimelineEmpty(String),

    #[error("detector: {0}")]
    Detector(String),

    #[error("config: {0}")]
    Config(String),
}

impl TrackerError {
    pub fn data_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DataFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Why a single joint could not be reconstructed in a frame.
///
/// The affected joint and its descendants become empty; the frame goes on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconstructionError {
    #[error("raw joint {0} was not reported by the detector")]
    MissingRawJoint(i32),

    #[error("bone {parent} -> {child} has zero raw length")]
    DegenerateBone { child: i32, parent: i32 },

    #[error("anchor reference joints {0} and {1} are not both present")]
    UnresolvedAnchor(i32, i32),
}

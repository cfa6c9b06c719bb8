pub mod compare;
pub mod config;
pub mod detector;
pub mod error;
pub mod landmark;
pub mod recording;
pub mod report;
pub mod session;
pub mod skeleton;
pub mod timeline;
pub mod topology;
pub mod video;

pub use compare::{Comparator, ComparatorKind, FrameScore, Score};
pub use error::{ReconstructionError, Result, TrackerError};
pub use session::{SessionConfig, SessionController, SessionState, StopHandle};
pub use skeleton::{DimensionMode, Skeleton};
pub use timeline::PoseTimeline;
pub use topology::Topology;

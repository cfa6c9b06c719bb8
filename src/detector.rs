// src/detector.rs - Detector boundary
use crate::error::{Result, TrackerError};
use crate::landmark::RawJoint;
use crate::video::Frame;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

/// What the detector saw in one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    NoPerson,
    /// Raw points indexed by the topology's joint-id scheme.
    Person(Vec<RawJoint>),
}

impl Detection {
    pub fn is_person(&self) -> bool {
        matches!(self, Detection::Person(_))
    }
}

/// Body-pose detector. Constructed explicitly and handed to each session.
pub trait PoseDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Detection>;
}

impl<D: PoseDetector + ?Sized> PoseDetector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Detection> {
        (**self).detect(frame)
    }
}

/// About nine hours at 30 fps.
const MAX_REPLAY_FRAMES: usize = 1_000_000;

#[derive(Debug, Deserialize)]
struct LandmarkRow {
    frame: usize,
    id: i32,
    x: f64,
    y: f64,
    z: f64,
}

/// Replays pre-computed landmarks, one frame per `detect` call.
///
/// The image content is ignored. Frames without rows and calls past the
/// end report no person.
pub struct LandmarkReplay {
    frames: Vec<Detection>,
    cursor: usize,
}

impl LandmarkReplay {
    pub fn new(frames: Vec<Detection>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Reads a `frame,id,x,y,z` table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| TrackerError::data_file(path, format!("cannot open landmarks: {e}")))?;
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

        let mut frames: Vec<Vec<RawJoint>> = Vec::new();
        for (row, record) in reader.deserialize::<LandmarkRow>().enumerate() {
            let lm = record
                .map_err(|e| TrackerError::data_file(path, format!("row {}: {e}", row + 1)))?;
            if lm.frame >= MAX_REPLAY_FRAMES {
                return Err(TrackerError::data_file(
                    path,
                    format!("row {}: frame {} exceeds {MAX_REPLAY_FRAMES}", row + 1, lm.frame),
                ));
            }
            if frames.len() <= lm.frame {
                frames.resize_with(lm.frame + 1, Vec::new);
            }
            frames[lm.frame].push(RawJoint::new(lm.id, lm.x, lm.y, lm.z));
        }

        tracing::info!(path = %path.display(), frames = frames.len(), "landmark replay loaded");
        Ok(Self::new(
            frames
                .into_iter()
                .map(|joints| {
                    if joints.is_empty() {
                        Detection::NoPerson
                    } else {
                        Detection::Person(joints)
                    }
                })
                .collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.frames.len().saturating_sub(self.cursor)
    }
}

impl PoseDetector for LandmarkReplay {
    fn detect(&mut self, _frame: &Frame) -> Result<Detection> {
        let detection = self
            .frames
            .get(self.cursor)
            .cloned()
            .unwrap_or(Detection::NoPerson);
        self.cursor += 1;
        Ok(detection)
    }
}

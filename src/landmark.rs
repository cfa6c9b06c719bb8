// src/landmark.rs
use nalgebra::Vector3;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Id of the synthetic root joint. Always at the origin.
pub const ANCHOR_ID: i32 = -1;
pub const ANCHOR_NAME: &str = "anchor";

/// MediaPipe Pose landmark names, indexed by detector id.
pub const LANDMARK_NAMES: [&str; 33] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

pub const LEFT_HIP: i32 = 23;
pub const RIGHT_HIP: i32 = 24;

static IDS_BY_NAME: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    let mut ids: HashMap<&'static str, i32> = LANDMARK_NAMES
        .iter()
        .enumerate()
        .map(|(id, name)| (*name, id as i32))
        .collect();
    ids.insert(ANCHOR_NAME, ANCHOR_ID);
    ids
});

pub fn landmark_name(id: i32) -> Option<&'static str> {
    if id == ANCHOR_ID {
        return Some(ANCHOR_NAME);
    }
    usize::try_from(id)
        .ok()
        .and_then(|idx| LANDMARK_NAMES.get(idx).copied())
}

pub fn landmark_id(name: &str) -> Option<i32> {
    IDS_BY_NAME.get(name).copied()
}

/// Detector-native point, unnormalized. One set per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawJoint {
    pub id: i32,
    pub position: Vector3<f64>,
}

impl RawJoint {
    pub fn new(id: i32, x: f64, y: f64, z: f64) -> Self {
        Self {
            id,
            position: Vector3::new(x, y, z),
        }
    }
}

/// Reconstructed joint in the normalized skeleton frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    pub id: i32,
    pub position: Vector3<f64>,
    pub name: &'static str,
}

impl Joint {
    pub(crate) fn new(id: i32, position: Vector3<f64>, name: &'static str) -> Self {
        Self { id, position, name }
    }

    pub fn anchor() -> Self {
        Self::new(ANCHOR_ID, Vector3::zeros(), ANCHOR_NAME)
    }

    pub fn x(&self) -> f64 {
        self.position.x
    }

    pub fn y(&self) -> f64 {
        self.position.y
    }

    pub fn z(&self) -> f64 {
        self.position.z
    }
}

/// A joint as seen in one frame: observed, or not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointSlot {
    Present(Joint),
    Empty { id: i32 },
}

impl JointSlot {
    pub fn id(&self) -> i32 {
        match self {
            JointSlot::Present(joint) => joint.id,
            JointSlot::Empty { id } => *id,
        }
    }

    pub fn joint(&self) -> Option<&Joint> {
        match self {
            JointSlot::Present(joint) => Some(joint),
            JointSlot::Empty { .. } => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, JointSlot::Present(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_lookup_both_ways() {
        assert_eq!(landmark_name(0), Some("nose"));
        assert_eq!(landmark_name(LEFT_HIP), Some("left_hip"));
        assert_eq!(landmark_name(ANCHOR_ID), Some("anchor"));
        assert_eq!(landmark_name(33), None);
        assert_eq!(landmark_name(-7), None);

        assert_eq!(landmark_id("right_hip"), Some(RIGHT_HIP));
        assert_eq!(landmark_id("anchor"), Some(ANCHOR_ID));
        assert_eq!(landmark_id("tail"), None);
    }

    #[test]
    fn test_empty_slot_is_not_present() {
        let empty = JointSlot::Empty { id: 3 };
        assert!(!empty.is_present());
        assert!(empty.joint().is_none());
        assert_eq!(empty.id(), 3);

        let present = JointSlot::Present(Joint::anchor());
        assert!(present.is_present());
        assert_eq!(present.id(), ANCHOR_ID);
    }
}

// src/skeleton.rs - Normalized skeleton reconstruction
use crate::error::ReconstructionError;
use crate::landmark::{landmark_name, Joint, JointSlot, RawJoint, ANCHOR_ID};
use crate::topology::Topology;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Two skeletons whose timestamps differ by less than this are the same frame.
pub const TIMESTAMP_TOLERANCE: f64 = 1e-6;
/// Per-coordinate tolerance used by skeleton equality.
pub const POSITION_TOLERANCE: f64 = 1e-9;

const MIN_BONE_LENGTH: f64 = 1e-12;

/// Whether depth takes part in reconstruction. Fixed per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DimensionMode {
    #[default]
    #[serde(rename = "2D", alias = "2d")]
    TwoD,
    #[serde(rename = "3D", alias = "3d")]
    ThreeD,
}

impl DimensionMode {
    fn project(self, v: Vector3<f64>) -> Vector3<f64> {
        match self {
            DimensionMode::TwoD => Vector3::new(v.x, v.y, 0.0),
            DimensionMode::ThreeD => v,
        }
    }
}

impl std::fmt::Display for DimensionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionMode::TwoD => write!(f, "2D"),
            DimensionMode::ThreeD => write!(f, "3D"),
        }
    }
}

/// One frame's joints in the normalized frame, keyed by joint id.
///
/// Always holds a slot for the anchor and for every topology joint.
#[derive(Debug, Clone)]
pub struct Skeleton {
    timestamp: f64,
    joints: BTreeMap<i32, JointSlot>,
}

/// Result of reconstructing one frame.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub skeleton: Skeleton,
    /// Root causes of every degraded subtree, in topological order.
    pub degraded: Vec<ReconstructionError>,
}

impl Skeleton {
    /// Skeleton where every joint, the anchor included, is unobserved.
    pub fn empty(topology: &Topology, timestamp: f64) -> Self {
        let joints = std::iter::once(ANCHOR_ID)
            .chain(topology.joint_ids().iter().copied())
            .map(|id| (id, JointSlot::Empty { id }))
            .collect();
        Self { timestamp, joints }
    }

    /// Builds a skeleton from already-normalized slots, e.g. a loaded recording.
    /// Slots missing for topology joints are filled as empty.
    pub(crate) fn from_slots(
        topology: &Topology,
        timestamp: f64,
        slots: impl IntoIterator<Item = JointSlot>,
    ) -> Self {
        let mut skeleton = Self::empty(topology, timestamp);
        for slot in slots {
            skeleton.joints.insert(slot.id(), slot);
        }
        skeleton
    }

    /// Re-expresses every bone of the raw detection at its rest length,
    /// walking the topology from the anchor outwards.
    ///
    /// A joint whose bone cannot be computed, and all its descendants, come
    /// out empty; the causes are listed in [`Reconstruction::degraded`].
    pub fn reconstruct(
        topology: &Topology,
        raw_joints: &[RawJoint],
        timestamp: f64,
        mode: DimensionMode,
    ) -> Reconstruction {
        let raw: HashMap<i32, Vector3<f64>> = raw_joints
            .iter()
            .filter(|j| j.id != ANCHOR_ID)
            .map(|j| (j.id, mode.project(j.position)))
            .collect();

        let (left, right) = topology.anchor_refs();
        let raw_anchor = match (raw.get(&left), raw.get(&right)) {
            (Some(l), Some(r)) => (l + r) / 2.0,
            _ => {
                return Reconstruction {
                    skeleton: Self::empty(topology, timestamp),
                    degraded: vec![ReconstructionError::UnresolvedAnchor(left, right)],
                }
            }
        };

        let mut joints = BTreeMap::new();
        joints.insert(ANCHOR_ID, JointSlot::Present(Joint::anchor()));
        let mut degraded = Vec::new();

        for bone in topology.bones() {
            let child = bone.child_id;
            let name = landmark_name(child).unwrap_or("unknown");

            let parent_pos = match joints.get(&bone.parent_id) {
                Some(JointSlot::Present(parent)) => parent.position,
                // Parent already degraded; its root cause is recorded.
                _ => {
                    joints.insert(child, JointSlot::Empty { id: child });
                    continue;
                }
            };

            match normalized_offset(&raw, raw_anchor, child, bone.parent_id, bone.rest_length) {
                Ok(offset) => {
                    let joint = Joint::new(child, parent_pos + offset, name);
                    joints.insert(child, JointSlot::Present(joint));
                }
                Err(e) => {
                    tracing::debug!(joint = child, error = %e, "joint degraded to empty");
                    degraded.push(e);
                    joints.insert(child, JointSlot::Empty { id: child });
                }
            }
        }

        let skeleton = Self { timestamp, joints };
        if skeleton.present_count() <= 1 {
            // Only the anchor resolved: nothing was actually observed.
            return Reconstruction {
                skeleton: Self::empty(topology, timestamp),
                degraded,
            };
        }
        Reconstruction { skeleton, degraded }
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn joint(&self, id: i32) -> Option<&JointSlot> {
        self.joints.get(&id)
    }

    /// Slots ordered by joint id, anchor first.
    pub fn joints(&self) -> impl Iterator<Item = &JointSlot> {
        self.joints.values()
    }

    /// Position of `id` if it was observed this frame.
    pub fn position(&self, id: i32) -> Option<Vector3<f64>> {
        self.joints
            .get(&id)
            .and_then(JointSlot::joint)
            .map(|j| j.position)
    }

    /// True when nothing at all was observed (no person in frame).
    pub fn is_empty(&self) -> bool {
        self.joints.values().all(|slot| !slot.is_present())
    }

    pub fn present_count(&self) -> usize {
        self.joints.values().filter(|slot| slot.is_present()).count()
    }
}

fn normalized_offset(
    raw: &HashMap<i32, Vector3<f64>>,
    raw_anchor: Vector3<f64>,
    child: i32,
    parent: i32,
    rest_length: f64,
) -> Result<Vector3<f64>, ReconstructionError> {
    let raw_child = raw
        .get(&child)
        .ok_or(ReconstructionError::MissingRawJoint(child))?;
    // Zero rest length pins the child onto its parent.
    if rest_length == 0.0 {
        return Ok(Vector3::zeros());
    }
    let raw_parent = if parent == ANCHOR_ID {
        raw_anchor
    } else {
        *raw.get(&parent)
            .ok_or(ReconstructionError::MissingRawJoint(parent))?
    };

    let direction = raw_child - raw_parent;
    let raw_length = direction.norm();
    if !raw_length.is_finite() || raw_length < MIN_BONE_LENGTH {
        return Err(ReconstructionError::DegenerateBone { child, parent });
    }

    Ok(direction * (rest_length / raw_length))
}

impl PartialEq for Skeleton {
    fn eq(&self, other: &Self) -> bool {
        if (self.timestamp - other.timestamp).abs() > TIMESTAMP_TOLERANCE {
            return false;
        }
        if self.joints.len() != other.joints.len() {
            return false;
        }
        self.joints
            .iter()
            .zip(other.joints.iter())
            .all(|((id_a, a), (id_b, b))| id_a == id_b && slots_match(a, b))
    }
}

fn slots_match(a: &JointSlot, b: &JointSlot) -> bool {
    match (a, b) {
        (JointSlot::Present(a), JointSlot::Present(b)) => {
            (a.position - b.position)
                .iter()
                .all(|d| d.abs() <= POSITION_TOLERANCE)
        }
        (JointSlot::Empty { id: a }, JointSlot::Empty { id: b }) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::BoneSpec;

    fn hip_head_topology() -> Topology {
        // left_hip doubles as anchor reference; nose stands in for the head.
        let bones = vec![
            BoneSpec::new(23, ANCHOR_ID, 0.0),
            BoneSpec::new(0, 23, 1.0),
        ];
        Topology::new(bones, (23, 23)).unwrap()
    }

    fn sample_raw() -> Vec<RawJoint> {
        // Loosely a person a couple of metres from the camera.
        vec![
            RawJoint::new(0, 0.51, 0.18, -0.30),
            RawJoint::new(11, 0.58, 0.32, -0.12),
            RawJoint::new(12, 0.43, 0.31, -0.10),
            RawJoint::new(13, 0.63, 0.45, -0.05),
            RawJoint::new(14, 0.38, 0.46, -0.02),
            RawJoint::new(15, 0.66, 0.57, -0.08),
            RawJoint::new(16, 0.35, 0.58, -0.04),
            RawJoint::new(23, 0.55, 0.61, 0.01),
            RawJoint::new(24, 0.46, 0.60, -0.01),
            RawJoint::new(25, 0.56, 0.78, 0.03),
            RawJoint::new(26, 0.45, 0.79, 0.02),
            RawJoint::new(27, 0.57, 0.95, 0.09),
            RawJoint::new(28, 0.44, 0.96, 0.08),
        ]
    }

    fn body_topology() -> Topology {
        let bones = vec![
            BoneSpec::new(23, ANCHOR_ID, 0.1),
            BoneSpec::new(24, ANCHOR_ID, 0.1),
            BoneSpec::new(11, 23, 0.5),
            BoneSpec::new(12, 24, 0.5),
            BoneSpec::new(13, 11, 0.3),
            BoneSpec::new(14, 12, 0.3),
            BoneSpec::new(15, 13, 0.25),
            BoneSpec::new(16, 14, 0.25),
            BoneSpec::new(25, 23, 0.45),
            BoneSpec::new(26, 24, 0.45),
            BoneSpec::new(27, 25, 0.42),
            BoneSpec::new(28, 26, 0.42),
            BoneSpec::new(0, ANCHOR_ID, 0.7),
        ];
        Topology::new(bones, (23, 24)).unwrap()
    }

    #[test]
    fn test_head_lands_at_rest_length_above_hip() {
        let topology = hip_head_topology();
        let raw = vec![RawJoint::new(23, 0.0, 0.0, 0.0), RawJoint::new(0, 0.0, 2.0, 0.0)];

        let result = Skeleton::reconstruct(&topology, &raw, 0.0, DimensionMode::ThreeD);
        assert!(result.degraded.is_empty());

        let hip = result.skeleton.position(23).unwrap();
        let head = result.skeleton.position(0).unwrap();
        let relative = head - hip;
        assert!((relative - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_every_bone_has_rest_length() {
        let topology = body_topology();
        for mode in [DimensionMode::TwoD, DimensionMode::ThreeD] {
            let result = Skeleton::reconstruct(&topology, &sample_raw(), 0.5, mode);
            assert!(result.degraded.is_empty());
            for bone in topology.bones() {
                let child = result.skeleton.position(bone.child_id).unwrap();
                let parent = result.skeleton.position(bone.parent_id).unwrap();
                assert!(
                    ((child - parent).norm() - bone.rest_length).abs() < 1e-9,
                    "bone {} -> {} in {mode}",
                    bone.parent_id,
                    bone.child_id
                );
            }
        }
    }

    #[test]
    fn test_translation_does_not_change_result() {
        let topology = body_topology();
        let shift = Vector3::new(3.5, -1.25, 0.75);
        let moved: Vec<RawJoint> = sample_raw()
            .into_iter()
            .map(|j| RawJoint {
                id: j.id,
                position: j.position + shift,
            })
            .collect();

        let a = Skeleton::reconstruct(&topology, &sample_raw(), 1.0, DimensionMode::ThreeD);
        let b = Skeleton::reconstruct(&topology, &moved, 1.0, DimensionMode::ThreeD);
        for id in topology.joint_ids() {
            let pa = a.skeleton.position(*id).unwrap();
            let pb = b.skeleton.position(*id).unwrap();
            assert!((pa - pb).norm() < 1e-9, "joint {id} moved");
        }
    }

    #[test]
    fn test_scale_does_not_change_result() {
        let topology = body_topology();
        let far: Vec<RawJoint> = sample_raw()
            .into_iter()
            .map(|j| RawJoint {
                id: j.id,
                position: j.position * 0.4,
            })
            .collect();

        let near = Skeleton::reconstruct(&topology, &sample_raw(), 0.0, DimensionMode::TwoD);
        let far = Skeleton::reconstruct(&topology, &far, 0.0, DimensionMode::TwoD);
        assert_eq!(near.skeleton, far.skeleton);
    }

    #[test]
    fn test_two_d_mode_flattens_depth() {
        let topology = body_topology();
        let result = Skeleton::reconstruct(&topology, &sample_raw(), 0.0, DimensionMode::TwoD);
        for slot in result.skeleton.joints() {
            assert_eq!(slot.joint().unwrap().z(), 0.0);
        }
    }

    #[test]
    fn test_missing_joint_empties_subtree_only() {
        let topology = body_topology();
        let raw: Vec<RawJoint> = sample_raw().into_iter().filter(|j| j.id != 13).collect();

        let result = Skeleton::reconstruct(&topology, &raw, 0.0, DimensionMode::TwoD);
        assert_eq!(result.degraded, vec![ReconstructionError::MissingRawJoint(13)]);

        let skeleton = &result.skeleton;
        assert_eq!(skeleton.joint(13), Some(&JointSlot::Empty { id: 13 }));
        // wrist hangs off the missing elbow
        assert_eq!(skeleton.joint(15), Some(&JointSlot::Empty { id: 15 }));
        assert!(skeleton.position(11).is_some());
        assert!(skeleton.position(16).is_some());
    }

    #[test]
    fn test_degenerate_bone_does_not_produce_nan() {
        let topology = body_topology();
        let mut raw = sample_raw();
        let knee = raw.iter().find(|j| j.id == 25).unwrap().position;
        for j in raw.iter_mut().filter(|j| j.id == 27) {
            j.position = knee;
        }

        let result = Skeleton::reconstruct(&topology, &raw, 0.0, DimensionMode::ThreeD);
        assert_eq!(
            result.degraded,
            vec![ReconstructionError::DegenerateBone { child: 27, parent: 25 }]
        );
        for slot in result.skeleton.joints() {
            if let Some(joint) = slot.joint() {
                assert!(joint.position.iter().all(|c| c.is_finite()));
            }
        }
    }

    #[test]
    fn test_missing_anchor_reference_gives_empty_skeleton() {
        let topology = body_topology();
        let raw: Vec<RawJoint> = sample_raw().into_iter().filter(|j| j.id != 24).collect();

        let result = Skeleton::reconstruct(&topology, &raw, 2.0, DimensionMode::TwoD);
        assert!(result.skeleton.is_empty());
        assert_eq!(result.degraded, vec![ReconstructionError::UnresolvedAnchor(23, 24)]);
    }

    #[test]
    fn test_coincident_hips_alone_give_empty_skeleton() {
        let topology = body_topology();
        let raw = vec![RawJoint::new(23, 0.5, 0.5, 0.0), RawJoint::new(24, 0.5, 0.5, 0.0)];

        let result = Skeleton::reconstruct(&topology, &raw, 0.5, DimensionMode::TwoD);
        assert!(result.skeleton.is_empty());
        assert_eq!(result.skeleton.joint(ANCHOR_ID), Some(&JointSlot::Empty { id: ANCHOR_ID }));
        assert!(result
            .degraded
            .contains(&ReconstructionError::DegenerateBone { child: 23, parent: ANCHOR_ID }));
        assert!(result.degraded.contains(&ReconstructionError::MissingRawJoint(0)));
    }

    #[test]
    fn test_empty_skeleton_covers_topology_and_anchor() {
        let topology = body_topology();
        let empty = Skeleton::empty(&topology, 4.0);
        assert!(empty.is_empty());
        assert_eq!(empty.joints().count(), topology.len() + 1);
        assert_eq!(empty.joint(ANCHOR_ID), Some(&JointSlot::Empty { id: ANCHOR_ID }));
    }

    #[test]
    fn test_equality_tolerates_timestamp_noise() {
        let topology = body_topology();
        let a = Skeleton::reconstruct(&topology, &sample_raw(), 1.0, DimensionMode::TwoD).skeleton;
        let b = Skeleton::reconstruct(&topology, &sample_raw(), 1.0 + 1e-9, DimensionMode::TwoD).skeleton;
        let c = Skeleton::reconstruct(&topology, &sample_raw(), 1.1, DimensionMode::TwoD).skeleton;
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Skeleton::empty(&topology, 1.0));
    }
}

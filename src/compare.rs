// src/compare.rs - Skeleton dissimilarity
use crate::landmark::{JointSlot, ANCHOR_ID};
use crate::skeleton::Skeleton;
use nalgebra::Vector3;
use serde::Deserialize;

/// Which dissimilarity measure a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparatorKind {
    /// Sum of Euclidean distances between matching joints.
    JointDistance,
    /// Weighted mean of limb orientation differences.
    #[default]
    LimbOrientation,
}

/// A limb as an ordered joint triple plus its weight in the total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limb {
    pub name: &'static str,
    pub tip: i32,
    pub mid: i32,
    pub base: i32,
    pub weight: f64,
}

/// Limbs scored by [`ComparatorKind::LimbOrientation`], MediaPipe ids.
pub const LIMBS: [Limb; 10] = [
    Limb { name: "left_forearm", tip: 15, mid: 13, base: 11, weight: 1.0 },
    Limb { name: "right_forearm", tip: 16, mid: 14, base: 12, weight: 1.0 },
    Limb { name: "left_upper_arm", tip: 13, mid: 11, base: 23, weight: 1.5 },
    Limb { name: "right_upper_arm", tip: 14, mid: 12, base: 24, weight: 1.5 },
    Limb { name: "left_thigh", tip: 25, mid: 23, base: 24, weight: 1.5 },
    Limb { name: "right_thigh", tip: 26, mid: 24, base: 23, weight: 1.5 },
    Limb { name: "left_shin", tip: 27, mid: 25, base: 23, weight: 1.0 },
    Limb { name: "right_shin", tip: 28, mid: 26, base: 24, weight: 1.0 },
    Limb { name: "left_hand", tip: 19, mid: 15, base: 13, weight: 0.5 },
    Limb { name: "right_hand", tip: 20, mid: 16, base: 14, weight: 0.5 },
];

/// Per-frame comparison outcome.
///
/// `NoData` means there was nothing to compare. It is never a numeric score,
/// so absence of data cannot pass for a perfect match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Value(FrameScore),
    NoData,
}

impl Score {
    pub fn error(&self) -> Option<f64> {
        match self {
            Score::Value(score) => Some(score.error),
            Score::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Score::NoData)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameScore {
    /// Lower is closer; 0.0 is identical.
    pub error: f64,
    /// Joints (or limbs) compared on both sides.
    pub matched: usize,
    /// Joints (or limbs) skipped because one side was empty.
    pub unmatched: usize,
}

#[derive(Debug, Clone)]
pub struct Comparator {
    kind: ComparatorKind,
    require_complete: bool,
    limbs: Vec<Limb>,
}

impl Comparator {
    pub fn new(kind: ComparatorKind) -> Self {
        Self {
            kind,
            require_complete: false,
            limbs: LIMBS.to_vec(),
        }
    }

    /// When set, any unmatched joint or limb turns the frame into `NoData`.
    pub fn with_require_complete(mut self, require_complete: bool) -> Self {
        self.require_complete = require_complete;
        self
    }

    pub fn with_limbs(mut self, limbs: Vec<Limb>) -> Self {
        self.limbs = limbs;
        self
    }

    pub fn kind(&self) -> ComparatorKind {
        self.kind
    }

    pub fn compare(&self, live: &Skeleton, reference: &Skeleton) -> Score {
        let score = match self.kind {
            ComparatorKind::JointDistance => joint_distance(live, reference),
            ComparatorKind::LimbOrientation => limb_orientation(&self.limbs, live, reference),
        };
        if score.matched == 0 || (self.require_complete && score.unmatched > 0) {
            Score::NoData
        } else {
            Score::Value(score)
        }
    }
}

fn joint_distance(live: &Skeleton, reference: &Skeleton) -> FrameScore {
    let mut error = 0.0;
    let mut matched = 0;
    let mut unmatched = 0;

    // The anchor sits at the origin in every non-empty skeleton.
    for slot in live.joints().filter(|slot| slot.id() != ANCHOR_ID) {
        match (slot, reference.joint(slot.id())) {
            (JointSlot::Present(a), Some(JointSlot::Present(b))) => {
                error += (a.position - b.position).norm();
                matched += 1;
            }
            _ => unmatched += 1,
        }
    }

    FrameScore {
        error,
        matched,
        unmatched,
    }
}

fn limb_orientation(limbs: &[Limb], live: &Skeleton, reference: &Skeleton) -> FrameScore {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    let mut matched = 0;
    let mut unmatched = 0;

    for limb in limbs {
        match (limb_angle(live, limb), limb_angle(reference, limb)) {
            (Some((cos_a, sin_a)), Some((cos_b, sin_b))) => {
                let limb_error = (cos_a - cos_b).abs().min((sin_a - sin_b).abs());
                weighted += limb.weight * limb_error;
                total_weight += limb.weight;
                matched += 1;
            }
            _ => unmatched += 1,
        }
    }

    FrameScore {
        error: if total_weight > 0.0 { weighted / total_weight } else { 0.0 },
        matched,
        unmatched,
    }
}

/// (cos, sin) of the tip->mid segment's orientation relative to mid->base.
///
/// The sine carries the sign of the cross product's z component so that
/// planar skeletons keep their handedness.
fn limb_angle(skeleton: &Skeleton, limb: &Limb) -> Option<(f64, f64)> {
    let tip = skeleton.position(limb.tip)?;
    let mid = skeleton.position(limb.mid)?;
    let base = skeleton.position(limb.base)?;

    let a: Vector3<f64> = mid - tip;
    let b: Vector3<f64> = base - mid;
    let norms = a.norm() * b.norm();
    if norms <= f64::EPSILON {
        return None;
    }

    let cos = a.dot(&b) / norms;
    let cross = a.cross(&b);
    let sin = cross.norm().copysign(cross.z) / norms;
    Some((cos.clamp(-1.0, 1.0), sin.clamp(-1.0, 1.0)))
}

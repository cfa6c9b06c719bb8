// src/timeline.rs
use crate::error::{Result, TrackerError};
use crate::skeleton::Skeleton;

/// Skeletons of one performance, ascending by timestamp, without duplicates.
///
/// Sessions hold a few thousand frames at most, so a sorted `Vec` with
/// linear scans is all the indexing needed.
#[derive(Debug, Clone, Default)]
pub struct PoseTimeline {
    name: String,
    skeletons: Vec<Skeleton>,
}

impl PoseTimeline {
    /// Builds a timeline from skeletons in any order. Structurally equal
    /// entries collapse to the first one seen.
    pub fn new(initial: Vec<Skeleton>, name: impl Into<String>) -> Self {
        let mut timeline = Self {
            name: name.into(),
            skeletons: Vec::with_capacity(initial.len()),
        };
        for skeleton in initial {
            timeline.append(skeleton);
        }
        timeline
    }

    /// Inserts `skeleton` unless an equal one is already present.
    /// Returns whether the timeline grew.
    pub fn append(&mut self, skeleton: Skeleton) -> bool {
        if self.skeletons.iter().any(|s| *s == skeleton) {
            return false;
        }
        self.skeletons.push(skeleton);
        // Stable: equal timestamps keep insertion order.
        self.skeletons
            .sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        true
    }

    /// Skeleton closest in time to `timestamp`; on a tie the earlier one wins.
    pub fn nearest(&self, timestamp: f64) -> Result<&Skeleton> {
        let mut best: Option<(&Skeleton, f64)> = None;
        for skeleton in &self.skeletons {
            let distance = (skeleton.timestamp() - timestamp).abs();
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((skeleton, distance)),
            }
        }
        best.map(|(s, _)| s)
            .ok_or_else(|| TrackerError::TimelineEmpty(self.name.clone()))
    }

    pub fn last(&self) -> Option<&Skeleton> {
        self.skeletons.last()
    }

    pub fn first(&self) -> Option<&Skeleton> {
        self.skeletons.first()
    }

    /// Timestamp of the final skeleton.
    pub fn duration(&self) -> Result<f64> {
        self.last()
            .map(Skeleton::timestamp)
            .ok_or_else(|| TrackerError::TimelineEmpty(self.name.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.skeletons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skeletons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Skeleton> {
        self.skeletons.iter()
    }

    pub fn clear(&mut self) {
        self.skeletons.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{RawJoint, ANCHOR_ID};
    use crate::skeleton::DimensionMode;
    use crate::topology::{BoneSpec, Topology};

    fn topology() -> Topology {
        Topology::new(
            vec![BoneSpec::new(23, ANCHOR_ID, 0.0), BoneSpec::new(0, 23, 1.0)],
            (23, 23),
        )
        .unwrap()
    }

    fn skeleton_at(topology: &Topology, timestamp: f64, head_x: f64) -> Skeleton {
        let raw = [RawJoint::new(23, 0.0, 0.0, 0.0), RawJoint::new(0, head_x, 1.0, 0.0)];
        Skeleton::reconstruct(topology, &raw, timestamp, DimensionMode::TwoD).skeleton
    }

    fn is_sorted(timeline: &PoseTimeline) -> bool {
        timeline
            .iter()
            .zip(timeline.iter().skip(1))
            .all(|(a, b)| a.timestamp() <= b.timestamp())
    }

    #[test]
    fn test_construct_sorts_input() {
        let topo = topology();
        let timeline = PoseTimeline::new(
            vec![skeleton_at(&topo, 2.0, 0.0), skeleton_at(&topo, 0.0, 0.0), skeleton_at(&topo, 1.0, 0.0)],
            "reference",
        );
        assert_eq!(timeline.len(), 3);
        assert!(is_sorted(&timeline));
        assert_eq!(timeline.name(), "reference");
        assert_eq!(timeline.duration().unwrap(), 2.0);
    }

    #[test]
    fn test_append_keeps_order_and_dedups() {
        let topo = topology();
        let mut timeline = PoseTimeline::new(Vec::new(), "live");
        for (ts, x) in [(0.3, 0.1), (0.1, 0.2), (0.9, 0.0), (0.5, 0.4), (0.2, 0.3)] {
            assert!(timeline.append(skeleton_at(&topo, ts, x)));
            assert!(is_sorted(&timeline));
        }
        assert_eq!(timeline.len(), 5);

        assert!(!timeline.append(skeleton_at(&topo, 0.5, 0.4)));
        assert_eq!(timeline.len(), 5);

        // same instant, different pose: kept
        assert!(timeline.append(skeleton_at(&topo, 0.5, -0.4)));
        assert_eq!(timeline.len(), 6);
        assert!(is_sorted(&timeline));
    }

    #[test]
    fn test_nearest_picks_closest() {
        let topo = topology();
        let timeline = PoseTimeline::new(
            vec![skeleton_at(&topo, 0.0, 0.0), skeleton_at(&topo, 1.0, 0.0), skeleton_at(&topo, 2.0, 0.0)],
            "reference",
        );
        assert_eq!(timeline.nearest(1.4).unwrap().timestamp(), 1.0);
        assert_eq!(timeline.nearest(1.6).unwrap().timestamp(), 2.0);
        assert_eq!(timeline.nearest(-5.0).unwrap().timestamp(), 0.0);
        assert_eq!(timeline.nearest(50.0).unwrap().timestamp(), 2.0);
    }

    #[test]
    fn test_nearest_tie_prefers_earlier() {
        let topo = topology();
        let timeline = PoseTimeline::new(
            vec![skeleton_at(&topo, 2.0, 0.0), skeleton_at(&topo, 1.0, 0.0)],
            "reference",
        );
        assert_eq!(timeline.nearest(1.5).unwrap().timestamp(), 1.0);

        // equal timestamps: first appended wins
        let mut timeline = PoseTimeline::new(Vec::new(), "live");
        timeline.append(skeleton_at(&topo, 1.0, 0.7));
        timeline.append(skeleton_at(&topo, 1.0, -0.7));
        let nearest = timeline.nearest(1.0).unwrap();
        assert!(nearest.position(0).unwrap().x > 0.0);
    }

    #[test]
    fn test_empty_timeline() {
        let timeline = PoseTimeline::new(Vec::new(), "live");
        assert!(timeline.last().is_none());
        assert!(matches!(timeline.nearest(0.0), Err(TrackerError::TimelineEmpty(name)) if name == "live"));
        assert!(timeline.duration().is_err());
    }

    #[test]
    fn test_last_is_latest() {
        let topo = topology();
        let mut timeline = PoseTimeline::new(Vec::new(), "live");
        timeline.append(skeleton_at(&topo, 3.0, 0.0));
        timeline.append(skeleton_at(&topo, 1.0, 0.0));
        assert_eq!(timeline.last().unwrap().timestamp(), 3.0);
        assert_eq!(timeline.first().unwrap().timestamp(), 1.0);
    }
}

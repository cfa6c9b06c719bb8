// src/topology.rs - Bone tree loaded once per process
use crate::error::{Result, TrackerError};
use crate::landmark::{landmark_name, ANCHOR_ID, LEFT_HIP, RIGHT_HIP};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const BUNDLED_TOPOLOGY: &str = include_str!("../assets/skeleton.csv");
const BUNDLED_SOURCE: &str = "<bundled skeleton.csv>";

/// One bone: `child` hangs off `parent` at a fixed canonical length.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoneSpec {
    #[serde(rename = "child")]
    pub child_id: i32,
    #[serde(rename = "parent")]
    pub parent_id: i32,
    #[serde(rename = "distance")]
    pub rest_length: f64,
}

impl BoneSpec {
    pub fn new(child_id: i32, parent_id: i32, rest_length: f64) -> Self {
        Self {
            child_id,
            parent_id,
            rest_length,
        }
    }
}

/// Validated bone tree rooted at the anchor.
///
/// Bones are kept in topological order: every parent is resolved before its
/// children, so reconstruction can walk them front to back.
#[derive(Debug, Clone)]
pub struct Topology {
    bones: Vec<BoneSpec>,
    joint_ids: Vec<i32>,
    anchor_refs: (i32, i32),
}

impl Topology {
    /// Builds a topology from bones given in any order.
    pub fn new(bones: Vec<BoneSpec>, anchor_refs: (i32, i32)) -> Result<Self> {
        Self::build(bones, anchor_refs, Path::new("<inline>"))
    }

    /// Loads the `child,parent,distance` table at `path`. The anchor sits at
    /// the hip midpoint.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| TrackerError::data_file(path, format!("cannot open topology: {e}")))?;
        Self::from_reader(file, path)
    }

    /// The 33-landmark topology compiled into the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_reader(BUNDLED_TOPOLOGY.as_bytes(), Path::new(BUNDLED_SOURCE))
    }

    pub fn from_reader<R: Read>(reader: R, source: &Path) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut bones = Vec::new();
        for (row, record) in csv_reader.deserialize::<BoneSpec>().enumerate() {
            let bone = record.map_err(|e| {
                TrackerError::data_file(source, format!("row {}: {e}", row + 1))
            })?;
            bones.push(bone);
        }
        Self::build(bones, (LEFT_HIP, RIGHT_HIP), source)
    }

    /// Replaces the pair of raw joints whose midpoint defines the anchor.
    pub fn with_anchor_refs(self, left: i32, right: i32) -> Result<Self> {
        Self::build(self.bones, (left, right), Path::new("<inline>"))
    }

    fn build(bones: Vec<BoneSpec>, anchor_refs: (i32, i32), source: &Path) -> Result<Self> {
        let ordered = order_bones(bones, source)?;
        let joint_ids: Vec<i32> = ordered
            .iter()
            .map(|b| b.child_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for reference in [anchor_refs.0, anchor_refs.1] {
            if joint_ids.binary_search(&reference).is_err() {
                return Err(TrackerError::data_file(
                    source,
                    format!("anchor reference joint {reference} is not in the topology"),
                ));
            }
        }

        Ok(Self {
            bones: ordered,
            joint_ids,
            anchor_refs,
        })
    }

    /// Bones in topological order.
    pub fn bones(&self) -> &[BoneSpec] {
        &self.bones
    }

    /// Non-anchor joint ids, ascending.
    pub fn joint_ids(&self) -> &[i32] {
        &self.joint_ids
    }

    pub fn anchor_refs(&self) -> (i32, i32) {
        self.anchor_refs
    }

    pub fn contains(&self, id: i32) -> bool {
        id == ANCHOR_ID || self.joint_ids.binary_search(&id).is_ok()
    }

    pub fn bone(&self, child_id: i32) -> Option<&BoneSpec> {
        self.bones.iter().find(|b| b.child_id == child_id)
    }

    pub fn len(&self) -> usize {
        self.joint_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joint_ids.is_empty()
    }
}

fn order_bones(bones: Vec<BoneSpec>, source: &Path) -> Result<Vec<BoneSpec>> {
    let fail = |reason: String| TrackerError::data_file(PathBuf::from(source), reason);

    if bones.is_empty() {
        return Err(fail("topology has no bones".into()));
    }

    let mut seen = HashSet::new();
    for bone in &bones {
        if bone.child_id == ANCHOR_ID {
            return Err(fail("the anchor cannot be a child".into()));
        }
        if landmark_name(bone.child_id).is_none() {
            return Err(fail(format!("unknown joint id {}", bone.child_id)));
        }
        if !bone.rest_length.is_finite() || bone.rest_length < 0.0 {
            return Err(fail(format!(
                "joint {} has invalid rest length {}",
                bone.child_id, bone.rest_length
            )));
        }
        if !seen.insert(bone.child_id) {
            return Err(fail(format!("joint {} has more than one parent", bone.child_id)));
        }
    }

    let mut children: HashMap<i32, Vec<BoneSpec>> = HashMap::new();
    for bone in &bones {
        if bone.parent_id != ANCHOR_ID && !seen.contains(&bone.parent_id) {
            return Err(fail(format!(
                "joint {} references parent {} which is not in the topology",
                bone.child_id, bone.parent_id
            )));
        }
        children.entry(bone.parent_id).or_default().push(*bone);
    }

    let mut ordered = Vec::with_capacity(bones.len());
    let mut queue = VecDeque::from([ANCHOR_ID]);
    while let Some(parent) = queue.pop_front() {
        if let Some(kids) = children.get(&parent) {
            for bone in kids {
                ordered.push(*bone);
                queue.push_back(bone.child_id);
            }
        }
    }

    if ordered.len() != bones.len() {
        return Err(fail("topology contains a cycle unreachable from the anchor".into()));
    }

    Ok(ordered)
}

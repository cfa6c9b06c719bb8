// src/recording.rs - Recording CSV persistence
use crate::error::{Result, TrackerError};
use crate::landmark::{landmark_id, landmark_name, Joint, JointSlot, ANCHOR_ID};
use crate::report::SessionSummary;
use crate::skeleton::Skeleton;
use crate::timeline::PoseTimeline;
use crate::topology::Topology;
use chrono::Local;
use csv::{ReaderBuilder, Writer};
use nalgebra::Vector3;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const TIMESTAMP_COLUMN: &str = "timestamp";
const AXES: [&str; 3] = ["x", "y", "z"];

/// Where session recordings and their summaries are written.
pub struct RecordingStore {
    output_dir: PathBuf,
}

impl RecordingStore {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fresh recording path named after the current local time.
    pub fn session_path(&self) -> PathBuf {
        let name = format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"));
        self.output_dir.join(name).with_extension("csv")
    }

    pub fn save(&self, timeline: &PoseTimeline, topology: &Topology) -> Result<PathBuf> {
        let path = self.session_path();
        save_recording(timeline, topology, &path)?;
        Ok(path)
    }

    /// Writes `summary` next to `recording` as `<stem>.summary.json`.
    pub fn write_summary(&self, summary: &SessionSummary, recording: &Path) -> Result<PathBuf> {
        let path = summary_path(recording);
        let json = serde_json::to_string_pretty(summary)
            .map_err(|e| TrackerError::data_file(&path, e.to_string()))?;
        write_atomic(&path, json.as_bytes())?;
        Ok(path)
    }
}

pub fn summary_path(recording: &Path) -> PathBuf {
    let stem = recording
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());
    recording.with_file_name(format!("{stem}.summary.json"))
}

/// Header row: `timestamp`, then `<name>_x,<name>_y,<name>_z` per joint by id.
pub fn header(topology: &Topology) -> Vec<String> {
    let mut columns = vec![TIMESTAMP_COLUMN.to_string()];
    for id in topology.joint_ids() {
        let name = landmark_name(*id).unwrap_or("unknown");
        columns.extend(AXES.iter().map(|axis| format!("{name}_{axis}")));
    }
    columns
}

/// Writes one row per skeleton. Empty joints become empty cells.
pub fn save_recording(timeline: &PoseTimeline, topology: &Topology, path: &Path) -> Result<()> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(header(topology))?;

    for skeleton in timeline.iter() {
        let mut row = Vec::with_capacity(1 + topology.len() * 3);
        row.push(skeleton.timestamp().to_string());
        for id in topology.joint_ids() {
            match skeleton.joint(*id).and_then(JointSlot::joint) {
                Some(joint) => row.extend(joint.position.iter().map(|c| c.to_string())),
                None => row.extend(std::iter::repeat(String::new()).take(3)),
            }
        }
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| TrackerError::Io(e.into_error()))?;
    write_atomic(path, &bytes)?;
    tracing::info!(path = %path.display(), frames = timeline.len(), "recording saved");
    Ok(())
}

/// Reads a recording and checks its columns against `topology`.
pub fn load_recording(path: &Path, topology: &Topology) -> Result<PoseTimeline> {
    let file = File::open(path)
        .map_err(|e| TrackerError::data_file(path, format!("cannot open recording: {e}")))?;
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| TrackerError::data_file(path, e.to_string()))?
        .clone();
    let columns = parse_header(headers.iter().collect(), topology)
        .map_err(|reason| TrackerError::data_file(path, reason))?;

    let mut skeletons = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| TrackerError::data_file(path, e.to_string()))?;
        let skeleton = parse_row(&record, &columns, topology)
            .map_err(|reason| TrackerError::data_file(path, format!("row {}: {reason}", row + 1)))?;
        skeletons.push(skeleton);
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::debug!(path = %path.display(), frames = skeletons.len(), "recording loaded");
    Ok(PoseTimeline::new(skeletons, name))
}

/// Joint id for each `_x/_y/_z` triple, in column order.
fn parse_header(headers: Vec<&str>, topology: &Topology) -> std::result::Result<Vec<i32>, String> {
    match headers.first() {
        Some(first) if *first == TIMESTAMP_COLUMN => {}
        _ => return Err(format!("first column must be '{TIMESTAMP_COLUMN}'")),
    }

    let joint_columns = &headers[1..];
    if joint_columns.len() % 3 != 0 {
        return Err(format!(
            "expected x/y/z triples after timestamp, found {} columns",
            joint_columns.len()
        ));
    }

    let mut ids = Vec::with_capacity(joint_columns.len() / 3);
    for triple in joint_columns.chunks(3) {
        let name = triple[0]
            .strip_suffix("_x")
            .ok_or_else(|| format!("column '{}' is not an _x column", triple[0]))?;
        if triple[1] != format!("{name}_y") || triple[2] != format!("{name}_z") {
            return Err(format!("columns for '{name}' are not in x/y/z order"));
        }
        let id = landmark_id(name).ok_or_else(|| format!("unknown joint '{name}'"))?;
        if id == ANCHOR_ID || !topology.contains(id) {
            return Err(format!("joint '{name}' is not part of the topology"));
        }
        ids.push(id);
    }

    let found: BTreeSet<i32> = ids.iter().copied().collect();
    if found.len() != ids.len() {
        return Err("duplicate joint columns".to_string());
    }
    if let Some(missing) = topology.joint_ids().iter().find(|id| !found.contains(*id)) {
        return Err(format!(
            "joint '{}' is missing",
            landmark_name(*missing).unwrap_or("unknown")
        ));
    }
    Ok(ids)
}

fn parse_row(
    record: &csv::StringRecord,
    columns: &[i32],
    topology: &Topology,
) -> std::result::Result<Skeleton, String> {
    if record.len() != 1 + columns.len() * 3 {
        return Err(format!("expected {} cells, found {}", 1 + columns.len() * 3, record.len()));
    }

    let timestamp: f64 = record[0]
        .parse()
        .map_err(|_| format!("bad timestamp '{}'", &record[0]))?;
    if !timestamp.is_finite() {
        return Err(format!("bad timestamp '{}'", &record[0]));
    }

    let mut slots = Vec::with_capacity(columns.len() + 1);
    for (i, id) in columns.iter().enumerate() {
        let cells = [&record[1 + i * 3], &record[2 + i * 3], &record[3 + i * 3]];
        if cells.iter().all(|c| c.is_empty()) {
            slots.push(JointSlot::Empty { id: *id });
            continue;
        }
        let mut coords = [0.0; 3];
        for (coord, cell) in coords.iter_mut().zip(cells) {
            *coord = cell
                .parse()
                .map_err(|_| format!("bad coordinate '{cell}' for joint {id}"))?;
        }
        let name = landmark_name(*id).unwrap_or("unknown");
        let position = Vector3::new(coords[0], coords[1], coords[2]);
        slots.push(JointSlot::Present(Joint::new(*id, position, name)));
    }

    // Rows with nothing observed stay fully empty, anchor included.
    if slots.iter().any(JointSlot::is_present) {
        slots.push(JointSlot::Present(Joint::anchor()));
    }
    Ok(Skeleton::from_slots(topology, timestamp, slots))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_file_name(format!(".{}.tmp", uuid::Uuid::new_v4()));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

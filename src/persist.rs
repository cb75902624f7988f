//! JSON persistence of the ledger in the scene blob.
//!
//! Two layouts are read. The current one keys records by object name:
//!
//! ```json
//! {"object_records": {"Cube": {"initial_mesh": {..}, "history": [..]}},
//!  "current_display_obj": "Cube",
//!  "step_timing": {"Cube": [{"use_custom": false, "cam": 0.5, "mesh": 0.5,
//!                            "marked_edges": "[[0,1]]", "show_edges": true}]}}
//! ```
//!
//! The older single-object layout has `target_obj_name`, `initial_mesh` and
//! `operation_history` at the top level. Only the current layout is written.
//!
//! `step_timing` lists one entry per step-list row, so entry 0 belongs to the
//! initial row and entry `i + 1` to step `i`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::geom::{Point3, Quat};
use crate::host::{MeshAccess, SceneStore};
use crate::ledger::{Ledger, ObjectRecord, Step};
use crate::pose::{CameraPose, ProjectionMode, ViewPose};
use crate::settings::StepTiming;
use crate::snapshot::{MeshData, Snapshot};

#[derive(Debug, Default, Serialize, Deserialize)]
struct BlobDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    object_records: Option<BTreeMap<String, RecordDto>>,
    #[serde(default)]
    current_display_obj: Option<String>,
    #[serde(default)]
    step_timing: BTreeMap<String, Vec<TimingDto>>,

    #[serde(default, skip_serializing)]
    target_obj_name: Option<String>,
    #[serde(default, skip_serializing)]
    initial_mesh: Option<SnapshotDto>,
    #[serde(default, skip_serializing)]
    operation_history: Vec<SnapshotDto>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordDto {
    #[serde(default)]
    initial_mesh: Option<SnapshotDto>,
    #[serde(default)]
    history: Vec<SnapshotDto>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDto {
    verts: Vec<[f64; 3]>,
    #[serde(default)]
    edges: Vec<[u32; 2]>,
    #[serde(default)]
    faces: Vec<Vec<u32>>,
    #[serde(default)]
    hash: Option<StoredHash>,
    #[serde(default)]
    view: Option<ViewDto>,
    #[serde(default)]
    camera: Option<CameraDto>,
}

/// Older files hold signed 64-bit hashes; the bits are kept as they are.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredHash {
    Unsigned(u64),
    Signed(i64),
}

impl StoredHash {
    fn bits(self) -> u64 {
        match self {
            Self::Unsigned(v) => v,
            Self::Signed(v) => u64::from_ne_bytes(v.to_ne_bytes()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ViewDto {
    #[serde(default)]
    view_perspective: Option<ProjectionMode>,
    view_location: [f64; 3],
    /// `[w, x, y, z]`
    view_rotation: [f64; 4],
    #[serde(default)]
    view_distance: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CameraDto {
    location: [f64; 3],
    rotation: [f64; 4],
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct TimingDto {
    use_custom: bool,
    cam: f64,
    mesh: f64,
    /// JSON-encoded list of vertex pairs, empty when nothing is marked.
    marked_edges: String,
    show_edges: bool,
}

impl Default for TimingDto {
    fn default() -> Self {
        Self::from(&StepTiming::default())
    }
}

impl From<&StepTiming> for TimingDto {
    fn from(timing: &StepTiming) -> Self {
        let marked_edges = if timing.marked_edges.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&timing.marked_edges).unwrap_or_default()
        };
        Self {
            use_custom: timing.use_custom,
            cam: timing.cam_duration,
            mesh: timing.mesh_duration,
            marked_edges,
            show_edges: timing.show_edges,
        }
    }
}

impl From<&TimingDto> for StepTiming {
    fn from(dto: &TimingDto) -> Self {
        let marked_edges = if dto.marked_edges.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&dto.marked_edges).unwrap_or_else(|err| {
                log::warn!("ignoring unreadable marked edges: {err}");
                Vec::new()
            })
        };
        Self {
            use_custom: dto.use_custom,
            cam_duration: dto.cam,
            mesh_duration: dto.mesh,
            marked_edges,
            show_edges: dto.show_edges,
        }
    }
}

impl From<&ViewPose> for ViewDto {
    fn from(view: &ViewPose) -> Self {
        Self {
            view_perspective: Some(view.projection_mode),
            view_location: view.location.to_array(),
            view_rotation: view.rotation.to_array(),
            view_distance: Some(view.distance),
        }
    }
}

impl From<&ViewDto> for ViewPose {
    fn from(dto: &ViewDto) -> Self {
        let defaults = ViewPose::default();
        Self {
            projection_mode: dto.view_perspective.unwrap_or(defaults.projection_mode),
            location: Point3::from_array(dto.view_location),
            rotation: Quat::from_array(dto.view_rotation),
            distance: dto.view_distance.unwrap_or(defaults.distance),
        }
    }
}

impl From<&CameraPose> for CameraDto {
    fn from(camera: &CameraPose) -> Self {
        Self {
            location: camera.location.to_array(),
            rotation: camera.rotation.to_array(),
        }
    }
}

impl From<&CameraDto> for CameraPose {
    fn from(dto: &CameraDto) -> Self {
        Self {
            location: Point3::from_array(dto.location),
            rotation: Quat::from_array(dto.rotation),
        }
    }
}

impl From<&Snapshot> for SnapshotDto {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            verts: snapshot.mesh.vertices.iter().map(|v| v.to_array()).collect(),
            edges: snapshot.mesh.edges.clone(),
            faces: snapshot.mesh.faces.clone(),
            hash: snapshot.hash.map(StoredHash::Unsigned),
            view: snapshot.view.as_ref().map(ViewDto::from),
            camera: snapshot.camera.as_ref().map(CameraDto::from),
        }
    }
}

impl SnapshotDto {
    fn into_snapshot(self, object: &str) -> Result<Snapshot, PersistError> {
        let count = self.verts.len();
        let in_range = |i: &u32| usize::try_from(*i).is_ok_and(|i| i < count);
        if !self.edges.iter().flatten().all(in_range) || !self.faces.iter().flatten().all(in_range) {
            return Err(PersistError::Snapshot {
                object: object.to_owned(),
                reason: format!("index out of range for {count} vertices"),
            });
        }
        Ok(Snapshot {
            mesh: MeshData::new(
                self.verts.into_iter().map(Point3::from_array).collect(),
                self.edges,
                self.faces,
            ),
            hash: self.hash.map(StoredHash::bits),
            view: self.view.as_ref().map(ViewPose::from),
            camera: self.camera.as_ref().map(CameraPose::from),
        })
    }
}

/// Ledger and display selection as read from a blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub ledger: Ledger,
    pub display: Option<String>,
}

/// Serializes the ledger in the current layout.
pub fn to_json(ledger: &Ledger, display: Option<&str>) -> Result<String, PersistError> {
    let mut blob = BlobDto {
        object_records: Some(BTreeMap::new()),
        current_display_obj: display.map(str::to_owned),
        ..BlobDto::default()
    };
    let records = blob.object_records.get_or_insert_with(BTreeMap::new);
    for (name, record) in ledger.iter() {
        records.insert(
            name.to_owned(),
            RecordDto {
                initial_mesh: Some(SnapshotDto::from(&record.initial)),
                history: record.steps().iter().map(|s| SnapshotDto::from(&s.snapshot)).collect(),
            },
        );
        let rows = std::iter::once(TimingDto::default())
            .chain(record.steps().iter().map(|s| TimingDto::from(&s.timing)))
            .collect();
        blob.step_timing.insert(name.to_owned(), rows);
    }
    Ok(serde_json::to_string(&blob)?)
}

/// Parses a blob in either layout. Records of objects for which `exists`
/// is false are dropped, as are records with inconsistent snapshots.
pub fn from_json(json: &str, exists: impl Fn(&str) -> bool) -> Result<PersistedState, PersistError> {
    let mut blob: BlobDto = serde_json::from_str(json)?;

    let records: Vec<(String, RecordDto)> = match blob.object_records.take() {
        Some(records) => records.into_iter().collect(),
        None => blob
            .target_obj_name
            .take()
            .map(|name| {
                let record = RecordDto {
                    initial_mesh: blob.initial_mesh.take(),
                    history: std::mem::take(&mut blob.operation_history),
                };
                vec![(name, record)]
            })
            .unwrap_or_default(),
    };
    let legacy_display = records.first().map(|(name, _)| name.clone());
    let is_legacy = blob.current_display_obj.is_none() && blob.step_timing.is_empty();

    let mut ledger = Ledger::new();
    for (name, dto) in records {
        if !exists(&name) {
            log::debug!("dropping record of missing object `{name}`");
            continue;
        }
        let timings = blob.step_timing.remove(&name).unwrap_or_default();
        match record_from_dto(&name, dto, &timings) {
            Ok(record) => {
                ledger.insert(name, record);
            }
            Err(err) => log::warn!("dropping record: {err}"),
        }
    }

    let mut display = if is_legacy {
        legacy_display
    } else {
        blob.current_display_obj
    };
    if display.as_deref().is_some_and(|name| !ledger.contains(name)) {
        display = ledger.names().next().map(str::to_owned);
    }
    Ok(PersistedState { ledger, display })
}

fn record_from_dto(name: &str, dto: RecordDto, timings: &[TimingDto]) -> Result<ObjectRecord, PersistError> {
    let initial = dto
        .initial_mesh
        .ok_or_else(|| PersistError::Snapshot {
            object: name.to_owned(),
            reason: "missing initial mesh".to_owned(),
        })?
        .into_snapshot(name)?;
    let steps = dto
        .history
        .into_iter()
        .enumerate()
        .map(|(i, snap)| {
            let timing = timings.get(i + 1).map(StepTiming::from).unwrap_or_default();
            snap.into_snapshot(name).map(|snapshot| Step { snapshot, timing })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ObjectRecord::with_steps(initial, steps))
}

/// Writes the ledger to the host's scene blob. Failures are logged.
pub fn save<H: SceneStore + ?Sized>(host: &mut H, ledger: &Ledger, display: Option<&str>) -> bool {
    match to_json(ledger, display) {
        Ok(json) => {
            host.save_blob(json);
            true
        }
        Err(err) => {
            log::warn!("recorder data not saved: {err}");
            false
        }
    }
}

/// Reads the host's scene blob. Missing or malformed data yields an empty
/// state.
pub fn load<H: SceneStore + MeshAccess + ?Sized>(host: &H) -> PersistedState {
    let Some(json) = host.load_blob() else {
        return PersistedState::default();
    };
    match from_json(&json, |name| host.object_exists(name)) {
        Ok(state) => {
            log::info!("loaded recorder data for {} object(s)", state.ledger.len());
            state
        }
        Err(err) => {
            log::warn!("ignoring recorder data: {err}");
            PersistedState::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri() -> MeshData {
        MeshData::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1], [1, 2], [2, 0]],
            vec![vec![0, 1, 2]],
        )
    }

    fn sample_ledger() -> Ledger {
        let view = ViewPose {
            projection_mode: ProjectionMode::Orthographic,
            location: Point3::new(1.0, 2.0, 3.0),
            rotation: Quat::new(0.5, 0.5, 0.5, 0.5),
            distance: 7.5,
        };
        let mut moved = tri();
        moved.vertices[2].z = 1.0;
        let step = Step {
            snapshot: Snapshot::new(moved)
                .with_hash(u64::MAX)
                .with_camera(Some(CameraPose::default())),
            timing: StepTiming {
                use_custom: true,
                cam_duration: 1.0,
                mesh_duration: 2.0,
                marked_edges: vec![[0, 2]],
                show_edges: true,
            },
        };
        let record = ObjectRecord::with_steps(
            Snapshot::new(tri()).with_hash(11).with_view(Some(view)),
            vec![step],
        );
        let mut ledger = Ledger::new();
        ledger.insert("Tri", record);
        ledger
    }

    #[test]
    fn current_layout_survives_a_save_load_cycle() {
        let ledger = sample_ledger();
        let json = to_json(&ledger, Some("Tri")).expect("serializes");
        let state = from_json(&json, |_| true).expect("parses");
        assert_eq!(state.display.as_deref(), Some("Tri"));
        assert_eq!(state.ledger, ledger);
    }

    #[test]
    fn marked_edges_are_stored_as_json_text() {
        let json = to_json(&sample_ledger(), Some("Tri")).expect("serializes");
        let value: serde_json::Value = serde_json::from_str(&json).expect("json");
        let rows = &value["step_timing"]["Tri"];
        assert_eq!(rows.as_array().map(Vec::len), Some(2));
        assert_eq!(rows[1]["marked_edges"], "[[0,2]]");
        assert_eq!(rows[0]["marked_edges"], "");
    }

    #[test]
    fn legacy_layout_is_read() {
        let json = r#"{
            "target_obj_name": "Old",
            "initial_mesh": {"verts": [[0,0,0],[1,0,0]], "edges": [[0,1]], "faces": [], "hash": -5},
            "operation_history": [
                {"verts": [[0,0,0],[2,0,0]], "edges": [[0,1]], "faces": [], "hash": 42,
                 "view": {"view_perspective": "CAMERA", "view_location": [0,0,0],
                          "view_rotation": [1,0,0,0], "view_distance": 4.0}}
            ]
        }"#;
        let state = from_json(json, |_| true).expect("parses");
        assert_eq!(state.display.as_deref(), Some("Old"));
        let record = state.ledger.get("Old").expect("record");
        assert_eq!(record.initial.hash, Some(u64::MAX - 4));
        assert_eq!(record.len(), 1);
        let view = record.steps()[0].snapshot.view.expect("view");
        assert_eq!(view.projection_mode, ProjectionMode::Perspective);
    }

    #[test]
    fn missing_objects_are_dropped_silently() {
        let json = to_json(&sample_ledger(), Some("Tri")).expect("serializes");
        let state = from_json(&json, |_| false).expect("parses");
        assert!(state.ledger.is_empty());
        assert_eq!(state.display, None);
    }

    #[test]
    fn malformed_blob_is_an_error() {
        assert!(matches!(from_json("{not json", |_| true), Err(PersistError::Json(_))));
    }

    #[test]
    fn inconsistent_snapshot_drops_only_its_record() {
        let json = r#"{"object_records": {
            "Bad": {"initial_mesh": {"verts": [[0,0,0]], "edges": [[0,3]], "faces": []}, "history": []},
            "Good": {"initial_mesh": {"verts": [[0,0,0]], "edges": [], "faces": []}, "history": []}
        }, "current_display_obj": "Bad"}"#;
        let state = from_json(json, |_| true).expect("parses");
        assert!(!state.ledger.contains("Bad"));
        assert!(state.ledger.contains("Good"));
        assert_eq!(state.display.as_deref(), Some("Good"));
    }
}

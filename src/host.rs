//! Interfaces to the host scene, plus an in-memory host.
//!
//! The recorder never owns scene data. Everything it reads or writes goes
//! through these traits so the state machines can be driven by a real
//! editor, by the wasm facade or by tests.

use std::collections::BTreeMap;

use crate::error::{ExportError, HostError};
use crate::geom::Point3;
use crate::pose::{CameraPose, ViewPose};
use crate::snapshot::MeshData;

/// Mesh objects in the scene.
pub trait MeshAccess {
    /// Name of the active object when it is a mesh.
    fn active_object(&self) -> Option<String>;
    /// Names of every mesh object.
    fn mesh_objects(&self) -> Vec<String>;
    fn object_exists(&self, name: &str) -> bool;
    fn read_mesh(&self, name: &str) -> Option<MeshData>;
    /// Overwrites vertex positions in place. Returns `false` without touching
    /// the mesh when the vertex count differs.
    fn write_positions(&mut self, name: &str, positions: &[Point3]) -> bool;
    fn replace_mesh(&mut self, name: &str, mesh: &MeshData);
    fn is_selectable(&self, name: &str) -> bool;
    fn set_selectable(&mut self, name: &str, selectable: bool);
    fn set_highlighted_edges(&mut self, name: &str, edges: &[[u32; 2]]);
}

/// Interactive viewport and scene camera.
pub trait ViewAccess {
    fn read_view(&self) -> Option<ViewPose>;
    fn write_view(&mut self, view: &ViewPose);
    fn read_camera(&self) -> Option<CameraPose>;
    fn write_camera(&mut self, camera: &CameraPose);
    /// Locking remembers the viewport state; unlocking restores it.
    fn lock_view_to_camera(&mut self, lock: bool);
    fn set_overlays_hidden(&mut self, hidden: bool);
}

/// Frame output during export playback.
pub trait FrameExport {
    fn export_frame(&mut self, index: usize, prefix: &str) -> Result<(), ExportError>;
    /// Flushes the export and reports the number of frames written.
    fn finish_export(&mut self) -> Result<usize, ExportError>;
}

/// Scene-level key-value blob for persisted recorder data.
pub trait SceneStore {
    fn load_blob(&self) -> Option<String>;
    fn save_blob(&mut self, blob: String);
}

pub trait Host: MeshAccess + ViewAccess + FrameExport + SceneStore {}

impl<T> Host for T where T: MeshAccess + ViewAccess + FrameExport + SceneStore {}

/// Writes `mesh` to the object, in place when the topology allows it.
pub(crate) fn apply_mesh<H: MeshAccess + ?Sized>(host: &mut H, name: &str, mesh: &MeshData) {
    if !host.write_positions(name, &mesh.vertices) {
        host.replace_mesh(name, mesh);
    }
}

#[derive(Debug, Clone)]
struct SceneObject {
    /// `None` for non-mesh objects such as cameras or lights.
    mesh: Option<MeshData>,
    selectable: bool,
    highlighted: Vec<[u32; 2]>,
}

/// Scene held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    objects: BTreeMap<String, SceneObject>,
    active: Option<String>,
    view: Option<ViewPose>,
    camera: Option<CameraPose>,
    saved_view: Option<ViewPose>,
    view_locked: bool,
    overlays_hidden: bool,
    blob: Option<String>,
    frames: Vec<(usize, String)>,
    pending_frames: usize,
    fail_export: bool,
    replace_count: usize,
}

impl MemoryHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a mesh object and makes it active.
    pub fn add_mesh(&mut self, name: impl Into<String>, mesh: MeshData) {
        let name = name.into();
        self.objects.insert(
            name.clone(),
            SceneObject {
                mesh: Some(mesh),
                selectable: true,
                highlighted: Vec::new(),
            },
        );
        self.active = Some(name);
    }

    /// Adds a non-mesh object.
    pub fn add_empty(&mut self, name: impl Into<String>) {
        self.objects.insert(
            name.into(),
            SceneObject {
                mesh: None,
                selectable: true,
                highlighted: Vec::new(),
            },
        );
    }

    pub fn remove_object(&mut self, name: &str) -> bool {
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        self.objects.remove(name).is_some()
    }

    pub fn set_active(&mut self, name: Option<&str>) -> Result<(), HostError> {
        match name {
            None => self.active = None,
            Some(name) if self.objects.contains_key(name) => self.active = Some(name.to_owned()),
            Some(name) => return Err(HostError::MissingObject(name.to_owned())),
        }
        Ok(())
    }

    /// Stands in for a user edit on the live mesh.
    pub fn set_mesh(&mut self, name: &str, mesh: MeshData) -> Result<(), HostError> {
        let object = self
            .objects
            .get_mut(name)
            .ok_or_else(|| HostError::MissingObject(name.to_owned()))?;
        if object.mesh.is_none() {
            return Err(HostError::NotAMesh(name.to_owned()));
        }
        object.mesh = Some(mesh);
        Ok(())
    }

    pub fn set_view(&mut self, view: Option<ViewPose>) {
        self.view = view;
    }

    pub fn set_camera(&mut self, camera: Option<CameraPose>) {
        self.camera = camera;
    }

    /// Makes every subsequent frame export fail.
    pub fn set_fail_export(&mut self, fail: bool) {
        self.fail_export = fail;
    }

    #[must_use]
    pub fn view_locked(&self) -> bool {
        self.view_locked
    }

    #[must_use]
    pub fn overlays_hidden(&self) -> bool {
        self.overlays_hidden
    }

    #[must_use]
    pub fn highlighted_edges(&self, name: &str) -> &[[u32; 2]] {
        self.objects
            .get(name)
            .map_or(&[], |object| object.highlighted.as_slice())
    }

    /// Frames written so far as `(index, file name)`.
    #[must_use]
    pub fn frames(&self) -> &[(usize, String)] {
        &self.frames
    }

    /// How often a topology change forced a full mesh replacement.
    #[must_use]
    pub fn replace_count(&self) -> usize {
        self.replace_count
    }

    #[must_use]
    pub fn blob(&self) -> Option<&str> {
        self.blob.as_deref()
    }

    pub fn set_blob(&mut self, blob: Option<String>) {
        self.blob = blob;
    }
}

impl MeshAccess for MemoryHost {
    fn active_object(&self) -> Option<String> {
        self.active
            .as_ref()
            .filter(|name| self.objects.get(*name).is_some_and(|o| o.mesh.is_some()))
            .cloned()
    }

    fn mesh_objects(&self) -> Vec<String> {
        self.objects
            .iter()
            .filter(|(_, object)| object.mesh.is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn object_exists(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    fn read_mesh(&self, name: &str) -> Option<MeshData> {
        self.objects.get(name).and_then(|o| o.mesh.clone())
    }

    fn write_positions(&mut self, name: &str, positions: &[Point3]) -> bool {
        match self.objects.get_mut(name).and_then(|o| o.mesh.as_mut()) {
            Some(mesh) if mesh.vertices.len() == positions.len() => {
                mesh.vertices.copy_from_slice(positions);
                true
            }
            _ => false,
        }
    }

    fn replace_mesh(&mut self, name: &str, mesh: &MeshData) {
        if let Some(object) = self.objects.get_mut(name) {
            object.mesh = Some(mesh.clone());
            self.replace_count += 1;
        }
    }

    fn is_selectable(&self, name: &str) -> bool {
        self.objects.get(name).is_some_and(|o| o.selectable)
    }

    fn set_selectable(&mut self, name: &str, selectable: bool) {
        if let Some(object) = self.objects.get_mut(name) {
            object.selectable = selectable;
        }
    }

    fn set_highlighted_edges(&mut self, name: &str, edges: &[[u32; 2]]) {
        if let Some(object) = self.objects.get_mut(name) {
            object.highlighted = edges.to_vec();
        }
    }
}

impl ViewAccess for MemoryHost {
    fn read_view(&self) -> Option<ViewPose> {
        self.view
    }

    fn write_view(&mut self, view: &ViewPose) {
        self.view = Some(*view);
    }

    fn read_camera(&self) -> Option<CameraPose> {
        self.camera
    }

    fn write_camera(&mut self, camera: &CameraPose) {
        if self.camera.is_some() {
            self.camera = Some(*camera);
        }
    }

    fn lock_view_to_camera(&mut self, lock: bool) {
        if lock == self.view_locked {
            return;
        }
        if lock {
            self.saved_view = self.view;
        } else if let Some(saved) = self.saved_view.take() {
            self.view = Some(saved);
        }
        self.view_locked = lock;
    }

    fn set_overlays_hidden(&mut self, hidden: bool) {
        self.overlays_hidden = hidden;
    }
}

impl FrameExport for MemoryHost {
    fn export_frame(&mut self, index: usize, prefix: &str) -> Result<(), ExportError> {
        if self.fail_export {
            return Err(ExportError::Frame {
                index,
                reason: "export disabled".to_owned(),
            });
        }
        self.frames.push((index, format!("{prefix}_{index:04}.png")));
        self.pending_frames += 1;
        Ok(())
    }

    fn finish_export(&mut self) -> Result<usize, ExportError> {
        Ok(std::mem::take(&mut self.pending_frames))
    }
}

impl SceneStore for MemoryHost {
    fn load_blob(&self) -> Option<String> {
        self.blob.clone()
    }

    fn save_blob(&mut self, blob: String) {
        self.blob = Some(blob);
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

    #[test]
    fn write_positions_refuses_count_mismatch() {
        let mut host = MemoryHost::new();
        host.add_mesh("Tri", tri());
        assert!(!host.write_positions("Tri", &[Point3::ORIGIN]));
        assert_eq!(host.read_mesh("Tri"), Some(tri()));

        let mut moved = tri().vertices;
        moved[0].z = 2.0;
        assert!(host.write_positions("Tri", &moved));
        assert_eq!(host.read_mesh("Tri").map(|m| m.vertices), Some(moved));
    }

    #[test]
    fn active_object_must_be_a_mesh() {
        let mut host = MemoryHost::new();
        host.add_mesh("Tri", tri());
        host.add_empty("Lamp");
        host.set_active(Some("Lamp")).expect("exists");
        assert_eq!(host.active_object(), None);
        assert_eq!(host.mesh_objects(), vec!["Tri".to_owned()]);
        assert!(matches!(
            host.set_active(Some("Ghost")),
            Err(HostError::MissingObject(_))
        ));
        assert!(matches!(host.set_mesh("Lamp", tri()), Err(HostError::NotAMesh(_))));
    }

    #[test]
    fn view_lock_restores_viewport() {
        let mut host = MemoryHost::new();
        let original = ViewPose::default();
        host.set_view(Some(original));
        host.lock_view_to_camera(true);
        host.write_view(&ViewPose {
            distance: 3.0,
            ..original
        });
        host.lock_view_to_camera(false);
        assert_eq!(host.read_view(), Some(original));
        assert!(!host.view_locked());
    }

    #[test]
    fn failing_export_records_nothing() {
        let mut host = MemoryHost::new();
        host.set_fail_export(true);
        assert!(host.export_frame(0, "frame").is_err());
        host.set_fail_export(false);
        host.export_frame(1, "frame").expect("export ok");
        assert_eq!(host.frames(), &[(1, "frame_0001.png".to_owned())]);
        assert_eq!(host.finish_export().expect("finish"), 1);
    }
}

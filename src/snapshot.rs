//! Recorded mesh states.

use crate::geom::Point3;
use crate::pose::{CameraPose, ViewPose};

/// Geometry of a polygon mesh as exchanged with the host.
///
/// Indices are local to this value and carry no identity across snapshots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<Point3>,
    /// Unordered vertex-index pairs.
    pub edges: Vec<[u32; 2]>,
    /// Vertex-index loops.
    pub faces: Vec<Vec<u32>>,
}

impl MeshData {
    #[must_use]
    pub fn new(vertices: Vec<Point3>, edges: Vec<[u32; 2]>, faces: Vec<Vec<u32>>) -> Self {
        Self {
            vertices,
            edges,
            faces,
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// `(vertex, edge, face)` counts, the cheap topology signature.
    #[must_use]
    pub fn signature(&self) -> (usize, usize, usize) {
        (self.vertices.len(), self.edges.len(), self.faces.len())
    }

    /// Same topology with different vertex positions.
    #[must_use]
    pub fn with_vertices(&self, vertices: Vec<Point3>) -> Self {
        Self {
            vertices,
            edges: self.edges.clone(),
            faces: self.faces.clone(),
        }
    }
}

/// One recorded state: geometry plus the view it was made from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub mesh: MeshData,
    /// Fingerprint of `mesh` at capture time.
    pub hash: Option<u64>,
    pub view: Option<ViewPose>,
    pub camera: Option<CameraPose>,
}

impl Snapshot {
    #[must_use]
    pub fn new(mesh: MeshData) -> Self {
        Self {
            mesh,
            hash: None,
            view: None,
            camera: None,
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hash: u64) -> Self {
        self.hash = Some(hash);
        self
    }

    #[must_use]
    pub fn with_view(mut self, view: Option<ViewPose>) -> Self {
        self.view = view;
        self
    }

    #[must_use]
    pub fn with_camera(mut self, camera: Option<CameraPose>) -> Self {
        self.camera = camera;
        self
    }

    #[must_use]
    pub fn vertices(&self) -> &[Point3] {
        &self.mesh.vertices
    }
}

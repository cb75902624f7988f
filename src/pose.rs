//! Viewport and scene-camera poses, and how they blend between steps.

use serde::{Deserialize, Serialize};

use crate::geom::{Point3, Quat, Tolerance};

/// Projection of the 3D viewport.
///
/// Persisted with the host's spelling (`"PERSP"` / `"ORTHO"`); the host's
/// third mode, looking through the scene camera, is read as perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionMode {
    #[default]
    #[serde(rename = "PERSP", alias = "CAMERA")]
    Perspective,
    #[serde(rename = "ORTHO")]
    Orthographic,
}

/// Orientation of the interactive viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewPose {
    pub projection_mode: ProjectionMode,
    /// Point the viewport orbits around.
    pub location: Point3,
    pub rotation: Quat,
    /// Orbit distance from `location`.
    pub distance: f64,
}

impl Default for ViewPose {
    fn default() -> Self {
        Self {
            projection_mode: ProjectionMode::Perspective,
            location: Point3::ORIGIN,
            rotation: Quat::IDENTITY,
            distance: 10.0,
        }
    }
}

/// Placement of the scene camera.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraPose {
    pub location: Point3,
    pub rotation: Quat,
}

/// Blends two optional view poses.
///
/// A missing side yields the other side unchanged; two missing sides yield
/// `None`. The projection mode is taken from the target.
#[must_use]
pub fn interpolate_view(from: Option<&ViewPose>, to: Option<&ViewPose>, t: f64) -> Option<ViewPose> {
    match (from, to) {
        (None, None) => None,
        (None, Some(only)) | (Some(only), None) => Some(*only),
        (Some(a), Some(b)) => {
            let t = t.clamp(0.0, 1.0);
            if t >= 1.0 {
                return Some(*b);
            }
            Some(ViewPose {
                projection_mode: b.projection_mode,
                location: a.location.lerp(b.location, t),
                rotation: a.rotation.slerp(b.rotation, t),
                distance: a.distance + (b.distance - a.distance) * t,
            })
        }
    }
}

/// Blends two optional camera poses with the same missing-side rules as
/// [`interpolate_view`].
#[must_use]
pub fn interpolate_camera(
    from: Option<&CameraPose>,
    to: Option<&CameraPose>,
    t: f64,
) -> Option<CameraPose> {
    match (from, to) {
        (None, None) => None,
        (None, Some(only)) | (Some(only), None) => Some(*only),
        (Some(a), Some(b)) => {
            let t = t.clamp(0.0, 1.0);
            if t >= 1.0 {
                return Some(*b);
            }
            Some(CameraPose {
                location: a.location.lerp(b.location, t),
                rotation: a.rotation.slerp(b.rotation, t),
            })
        }
    }
}

/// True when the viewport moved enough between two steps to warrant a
/// camera phase. Appearing or disappearing counts as a change.
#[must_use]
pub fn view_changed(a: Option<&ViewPose>, b: Option<&ViewPose>) -> bool {
    match (a, b) {
        (None, None) => false,
        (Some(a), Some(b)) => {
            !Tolerance::POSE.approx_eq_point3(a.location, b.location)
                || !Tolerance::POSE.approx_eq_f64(a.distance, b.distance)
                || a.rotation.angle_to(b.rotation) > Tolerance::POSE_ANGLE.eps
                || a.projection_mode != b.projection_mode
        }
        _ => true,
    }
}

#[must_use]
pub fn camera_changed(a: Option<&CameraPose>, b: Option<&CameraPose>) -> bool {
    match (a, b) {
        (None, None) => false,
        (Some(a), Some(b)) => {
            !Tolerance::POSE.approx_eq_point3(a.location, b.location)
                || a.rotation.angle_to(b.rotation) > Tolerance::POSE_ANGLE.eps
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Vec3;
    use std::f64::consts::FRAC_PI_2;

    fn view(x: f64, angle: f64, distance: f64) -> ViewPose {
        ViewPose {
            projection_mode: ProjectionMode::Perspective,
            location: Point3::new(x, 0.0, 0.0),
            rotation: Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), angle),
            distance,
        }
    }

    #[test]
    fn view_midpoint_blends_every_component() {
        let a = view(0.0, 0.0, 4.0);
        let mut b = view(2.0, FRAC_PI_2, 8.0);
        b.projection_mode = ProjectionMode::Orthographic;

        let mid = interpolate_view(Some(&a), Some(&b), 0.5).expect("both present");
        assert!((mid.location.x - 1.0).abs() < 1e-12);
        assert!((mid.distance - 6.0).abs() < 1e-12);
        assert!((mid.rotation.angle_to(a.rotation) - FRAC_PI_2 / 2.0).abs() < 1e-9);
        assert_eq!(mid.projection_mode, ProjectionMode::Orthographic);
    }

    #[test]
    fn view_endpoints_are_exact() {
        let a = view(0.1, 0.3, 4.0);
        let b = view(0.7, 1.1, 9.0);
        assert_eq!(interpolate_view(Some(&a), Some(&b), 1.0), Some(b));
        let start = interpolate_view(Some(&a), Some(&b), 0.0).expect("present");
        assert_eq!(start.location, a.location);
        assert_eq!(start.rotation, a.rotation);
    }

    #[test]
    fn missing_side_passes_through() {
        let a = view(1.0, 0.0, 3.0);
        assert_eq!(interpolate_view(None, Some(&a), 0.3), Some(a));
        assert_eq!(interpolate_view(Some(&a), None, 0.3), Some(a));
        assert_eq!(interpolate_view(None, None, 0.3), None);
        assert_eq!(interpolate_camera(None, None, 0.3), None);
    }

    #[test]
    fn change_detection_respects_epsilons() {
        let a = view(0.0, 0.0, 5.0);
        let tiny = view(1e-7, 1e-6, 5.0 + 1e-7);
        assert!(!view_changed(Some(&a), Some(&tiny)));
        assert!(view_changed(Some(&a), Some(&view(0.01, 0.0, 5.0))));
        assert!(view_changed(Some(&a), Some(&view(0.0, 0.01, 5.0))));
        assert!(view_changed(Some(&a), None));
        assert!(!view_changed(None, None));

        let cam = CameraPose::default();
        let moved = CameraPose {
            location: Point3::new(0.0, 0.0, 1.0),
            ..cam
        };
        assert!(!camera_changed(Some(&cam), Some(&cam)));
        assert!(camera_changed(Some(&cam), Some(&moved)));
    }

    #[test]
    fn double_cover_rotation_is_not_a_change() {
        let a = view(0.0, 0.4, 5.0);
        let mut b = a;
        b.rotation = Quat {
            w: -a.rotation.w,
            x: -a.rotation.x,
            y: -a.rotation.y,
            z: -a.rotation.z,
        };
        assert!(!view_changed(Some(&a), Some(&b)));
    }
}

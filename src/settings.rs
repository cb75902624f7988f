//! Recorder configuration and per-step timing.

use serde::{Deserialize, Serialize};

use crate::correspondence::HybridThresholds;

pub const INTERP_STEPS_RANGE: (u32, u32) = (1, 60);
pub const CAM_DURATION_RANGE: (f64, f64) = (0.0, 10.0);
pub const MESH_DURATION_RANGE: (f64, f64) = (0.1, 10.0);

/// Where sequence playback begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlaybackMode {
    /// From the initial snapshot through the last step.
    #[default]
    Start,
    /// From the selected step through the last step.
    Active,
    /// The explicit 1-based `playback_start_step..=playback_end_step`.
    Range,
}

/// Session-wide settings.
///
/// Every field has a default so partial JSON from the host is accepted;
/// [`RecorderSettings::sanitized`] brings out-of-range values back in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Frames per step.
    pub interp_steps: u32,
    /// Seconds spent blending the view, when it changed.
    pub global_cam_duration: f64,
    /// Seconds spent morphing the mesh.
    pub global_mesh_duration: f64,
    /// 1-based.
    pub playback_start_step: usize,
    /// 1-based, 0 means the last step.
    pub playback_end_step: usize,
    pub playback_mode: PlaybackMode,
    pub poll_interval_ms: u64,
    /// Consecutive identical fingerprints before an edit is accepted.
    pub stable_ticks: u32,
    /// Upper bound on the redo ledger; the oldest undone steps fall off.
    pub redo_limit: usize,
    /// File name prefix for exported frames.
    pub render_prefix: String,
    pub hybrid: HybridThresholds,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            interp_steps: 10,
            global_cam_duration: 0.5,
            global_mesh_duration: 0.5,
            playback_start_step: 1,
            playback_end_step: 0,
            playback_mode: PlaybackMode::Start,
            poll_interval_ms: 100,
            stable_ticks: 3,
            redo_limit: 256,
            render_prefix: "frame".to_owned(),
            hybrid: HybridThresholds::default(),
        }
    }
}

impl RecorderSettings {
    /// Copy with every field clamped into its valid range.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let render_prefix = if self.render_prefix.trim().is_empty() {
            defaults.render_prefix
        } else {
            self.render_prefix.clone()
        };
        Self {
            interp_steps: self
                .interp_steps
                .clamp(INTERP_STEPS_RANGE.0, INTERP_STEPS_RANGE.1),
            global_cam_duration: clamp_or(
                self.global_cam_duration,
                CAM_DURATION_RANGE,
                defaults.global_cam_duration,
            ),
            global_mesh_duration: clamp_or(
                self.global_mesh_duration,
                MESH_DURATION_RANGE,
                defaults.global_mesh_duration,
            ),
            playback_start_step: self.playback_start_step.max(1),
            playback_end_step: self.playback_end_step,
            playback_mode: self.playback_mode,
            poll_interval_ms: self.poll_interval_ms.max(1),
            stable_ticks: self.stable_ticks.max(1),
            redo_limit: self.redo_limit,
            render_prefix,
            hybrid: self.hybrid.sanitized(),
        }
    }
}

/// Timing and edge markup attached to one recorded step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepTiming {
    /// Use `cam_duration`/`mesh_duration` instead of the global values.
    pub use_custom: bool,
    pub cam_duration: f64,
    pub mesh_duration: f64,
    /// Vertex-index pairs drawn highlighted while this step is shown.
    pub marked_edges: Vec<[u32; 2]>,
    pub show_edges: bool,
}

impl Default for StepTiming {
    fn default() -> Self {
        Self {
            use_custom: false,
            cam_duration: 0.5,
            mesh_duration: 0.5,
            marked_edges: Vec::new(),
            show_edges: false,
        }
    }
}

impl StepTiming {
    /// `(camera, mesh)` durations in seconds after applying the global fallback.
    #[must_use]
    pub fn durations(&self, settings: &RecorderSettings) -> (f64, f64) {
        if self.use_custom {
            (
                clamp_or(self.cam_duration, CAM_DURATION_RANGE, settings.global_cam_duration),
                clamp_or(self.mesh_duration, MESH_DURATION_RANGE, settings.global_mesh_duration),
            )
        } else {
            (settings.global_cam_duration, settings.global_mesh_duration)
        }
    }

    /// Edges to highlight, or nothing when highlighting is switched off.
    #[must_use]
    pub fn highlighted_edges(&self) -> &[[u32; 2]] {
        if self.show_edges {
            &self.marked_edges
        } else {
            &[]
        }
    }
}

fn clamp_or(value: f64, (lo, hi): (f64, f64), fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_host_panel() {
        let settings = RecorderSettings::default();
        assert_eq!(settings.interp_steps, 10);
        assert_eq!(settings.poll_interval_ms, 100);
        assert_eq!(settings.stable_ticks, 3);
        assert_eq!(settings.playback_mode, PlaybackMode::Start);
        assert_eq!(settings, settings.sanitized());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: RecorderSettings =
            serde_json::from_str(r#"{"interp_steps": 4, "playback_mode": "RANGE"}"#)
                .expect("valid settings");
        assert_eq!(settings.interp_steps, 4);
        assert_eq!(settings.playback_mode, PlaybackMode::Range);
        assert!((settings.global_mesh_duration - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let settings = RecorderSettings {
            interp_steps: 500,
            global_cam_duration: -2.0,
            global_mesh_duration: f64::NAN,
            playback_start_step: 0,
            stable_ticks: 0,
            render_prefix: "  ".to_owned(),
            ..RecorderSettings::default()
        }
        .sanitized();

        assert_eq!(settings.interp_steps, 60);
        assert!(settings.global_cam_duration.abs() < f64::EPSILON);
        assert!((settings.global_mesh_duration - 0.5).abs() < f64::EPSILON);
        assert_eq!(settings.playback_start_step, 1);
        assert_eq!(settings.stable_ticks, 1);
        assert_eq!(settings.render_prefix, "frame");
    }

    #[test]
    fn custom_timing_overrides_globals() {
        let settings = RecorderSettings::default();
        let custom = StepTiming {
            use_custom: true,
            cam_duration: 2.0,
            mesh_duration: 0.01,
            ..StepTiming::default()
        };
        assert_eq!(custom.durations(&settings), (2.0, 0.1));
        assert_eq!(StepTiming::default().durations(&settings), (0.5, 0.5));
    }

    #[test]
    fn hidden_marks_are_not_highlighted() {
        let mut timing = StepTiming {
            marked_edges: vec![[0, 1]],
            ..StepTiming::default()
        };
        assert!(timing.highlighted_edges().is_empty());
        timing.show_edges = true;
        assert_eq!(timing.highlighted_edges(), &[[0, 1]]);
    }
}

//! Playback state machine.
//!
//! A playback walks a contiguous range of steps. Each step first blends the
//! view (when it moved), then morphs the mesh through its correspondence
//! cache, then snaps to the exact target. Jumping to a step in the list is a
//! one-step playback without camera lock, overlays or export.

use std::time::Duration;

use crate::correspondence::{CacheMode, CorrespondenceCache, build_cache_with};
use crate::geom::{RecorderMetrics, TimingBucket};
use crate::host::{Host, apply_mesh};
use crate::interpolate::{TopologyOwner, interpolate};
use crate::ledger::{ObjectRecord, Step};
use crate::pose::{camera_changed, interpolate_camera, interpolate_view, view_changed};
use crate::settings::{PlaybackMode, RecorderSettings};
use crate::snapshot::Snapshot;

/// Shortest tick the playback asks for.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// A row of the step list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Initial,
    /// 0-based step index.
    Step(usize),
}

/// Inclusive, 0-based range of steps to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackRange {
    pub start: usize,
    pub end: usize,
}

impl PlaybackRange {
    /// Resolves the range for `mode` over a history of `len` steps.
    ///
    /// `Range` takes 1-based bounds clamped into the history, with
    /// `end_step == 0` meaning the last step. `Active` starts at the selected
    /// step, or at the first one when the initial row (or nothing) is
    /// selected. `None` when there is nothing to play.
    #[must_use]
    pub fn resolve(
        mode: PlaybackMode,
        len: usize,
        selection: Option<Selection>,
        start_step: usize,
        end_step: usize,
    ) -> Option<Self> {
        let last = len.checked_sub(1)?;
        match mode {
            PlaybackMode::Start => Some(Self { start: 0, end: last }),
            PlaybackMode::Active => {
                let start = match selection {
                    Some(Selection::Step(i)) => i.min(last),
                    Some(Selection::Initial) | None => 0,
                };
                Some(Self { start, end: last })
            }
            PlaybackMode::Range => {
                let start = start_step.saturating_sub(1).min(last);
                let end = if end_step > 0 { end_step - 1 } else { last };
                Some(Self {
                    start,
                    end: end.min(last).max(start),
                })
            }
        }
    }

    #[must_use]
    pub fn single(index: usize) -> Self {
        Self {
            start: index,
            end: index,
        }
    }
}

/// Position within a playback. Dropped on stop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackCursor {
    pub step_index: usize,
    /// Seconds into the current step.
    pub elapsed: f64,
    pub cache: Option<CorrespondenceCache>,
    ticks: u32,
    /// The live mesh already carries the target topology of this step.
    topology_applied: bool,
}

impl PlaybackCursor {
    fn at(step_index: usize) -> Self {
        Self {
            step_index,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackKind {
    Sequence { export: bool },
    Jump,
}

/// Timing of one step's transition.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    view_moved: bool,
    cam: f64,
    mesh: f64,
    frames: u32,
}

impl Segment {
    fn new(source: &Snapshot, target: &Step, settings: &RecorderSettings) -> Self {
        let (cam, mesh) = target.timing.durations(settings);
        let snap = &target.snapshot;
        let view_moved = view_changed(source.view.as_ref(), snap.view.as_ref())
            || camera_changed(source.camera.as_ref(), snap.camera.as_ref());
        Self {
            view_moved,
            cam: if view_moved { cam } else { 0.0 },
            mesh,
            frames: settings.interp_steps.max(1),
        }
    }

    fn total(&self) -> f64 {
        self.cam + self.mesh
    }

    fn interval(&self) -> f64 {
        self.total() / f64::from(self.frames)
    }

    fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval()).map_or(MIN_TICK, |d| d.max(MIN_TICK))
    }

    /// `(view t, mesh t)` at `elapsed` seconds, `None` for the mesh while
    /// the view is still moving.
    fn phase(&self, elapsed: f64) -> (f64, Option<f64>) {
        if self.view_moved && elapsed < self.cam {
            let cam_t = if self.cam > 0.0 { elapsed / self.cam } else { 1.0 };
            return (cam_t, None);
        }
        let mesh_t = ((elapsed - self.cam) / self.mesh.max(1e-6)).clamp(0.0, 1.0);
        let cam_t = if self.view_moved { 1.0 } else { mesh_t };
        (cam_t, Some(mesh_t))
    }
}

/// An active playback of one object's record.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    object: String,
    kind: PlaybackKind,
    range: PlaybackRange,
    cursor: PlaybackCursor,
    frame_index: usize,
}

impl PlaybackState {
    /// Shows the state just before `range.start` and prepares the first step.
    pub fn start<H: Host + ?Sized>(
        host: &mut H,
        object: &str,
        record: &ObjectRecord,
        range: PlaybackRange,
        kind: PlaybackKind,
    ) -> Option<Self> {
        if range.start > range.end || range.end >= record.len() {
            return None;
        }
        let source = record.source_of(range.start)?;
        show_snapshot(host, object, source);

        if matches!(kind, PlaybackKind::Sequence { .. }) {
            host.lock_view_to_camera(true);
            host.set_overlays_hidden(true);
        }
        log::info!(
            "playing `{object}` steps {}..={} ({kind:?})",
            range.start + 1,
            range.end + 1
        );
        Some(Self {
            object: object.to_owned(),
            kind,
            range,
            cursor: PlaybackCursor::at(range.start),
            frame_index: 0,
        })
    }

    #[must_use]
    pub fn object(&self) -> &str {
        &self.object
    }

    #[must_use]
    pub fn kind(&self) -> PlaybackKind {
        self.kind
    }

    #[must_use]
    pub fn range(&self) -> PlaybackRange {
        self.range
    }

    #[must_use]
    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    fn exporting(&self) -> bool {
        matches!(self.kind, PlaybackKind::Sequence { export: true })
    }

    /// Delay until the next tick of the current step.
    #[must_use]
    pub fn next_delay(&self, record: &ObjectRecord, settings: &RecorderSettings) -> Duration {
        match (record.source_of(self.cursor.step_index), record.step(self.cursor.step_index)) {
            (Some(source), Some(target)) => Segment::new(source, target, settings).delay(),
            _ => MIN_TICK,
        }
    }

    /// Advances one tick. Returns the delay until the next tick, or `None`
    /// once the range is done; the caller then calls [`PlaybackState::finish`].
    pub fn tick<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        record: &ObjectRecord,
        settings: &RecorderSettings,
        metrics: &mut RecorderMetrics,
    ) -> Option<Duration> {
        let index = self.cursor.step_index;
        if index > self.range.end {
            return None;
        }
        let (Some(source), Some(target)) = (record.source_of(index), record.step(index)) else {
            log::warn!("`{}`: step {} vanished during playback", self.object, index + 1);
            return None;
        };

        if self.cursor.cache.is_none() {
            let cache = metrics.time(TimingBucket::CacheBuild, || {
                build_cache_with(&source.mesh, &target.snapshot.mesh, &settings.hybrid)
            });
            log::debug!("`{}`: step {} uses {:?}", self.object, index + 1, cache.mode());
            self.cursor.cache = Some(cache);
            self.cursor.topology_applied = false;
            host.set_highlighted_edges(&self.object, target.timing.highlighted_edges());
        }

        let segment = Segment::new(source, target, settings);
        self.cursor.ticks += 1;
        self.cursor.elapsed = f64::from(self.cursor.ticks) * segment.interval();

        if self.cursor.ticks >= segment.frames {
            show_snapshot(host, &self.object, &target.snapshot);
            host.set_highlighted_edges(&self.object, &[]);
            self.export_frame(host, settings);
            self.cursor = PlaybackCursor::at(index + 1);
            if matches!(self.kind, PlaybackKind::Jump) || self.cursor.step_index > self.range.end {
                return None;
            }
            return Some(self.next_delay(record, settings));
        }

        let (cam_t, mesh_t) = segment.phase(self.cursor.elapsed);
        let snap = &target.snapshot;
        if let Some(view) = interpolate_view(source.view.as_ref(), snap.view.as_ref(), cam_t) {
            host.write_view(&view);
        }
        if let Some(camera) = interpolate_camera(source.camera.as_ref(), snap.camera.as_ref(), cam_t) {
            host.write_camera(&camera);
        }

        if let (Some(mesh_t), Some(cache)) = (mesh_t, self.cursor.cache.as_ref()) {
            let frame = metrics.time(TimingBucket::Interpolation, || {
                interpolate(&source.mesh, &snap.mesh, mesh_t, cache)
            });
            let needs_topology = frame.topology == TopologyOwner::Target
                && cache.mode() != CacheMode::Direct
                && !self.cursor.topology_applied;
            if needs_topology {
                host.replace_mesh(&self.object, &frame.to_mesh(&source.mesh, &snap.mesh));
                self.cursor.topology_applied = true;
            } else if !host.write_positions(&self.object, &frame.positions) {
                host.replace_mesh(&self.object, &frame.to_mesh(&source.mesh, &snap.mesh));
            }
        }

        self.export_frame(host, settings);
        Some(segment.delay())
    }

    fn export_frame<H: Host + ?Sized>(&mut self, host: &mut H, settings: &RecorderSettings) {
        if !self.exporting() {
            return;
        }
        if let Err(err) = host.export_frame(self.frame_index, &settings.render_prefix) {
            log::warn!("frame {} not exported: {err}", self.frame_index);
        }
        self.frame_index += 1;
    }

    /// Leaves the mesh as displayed and releases what playback took over.
    pub fn finish<H: Host + ?Sized>(self, host: &mut H) {
        if let PlaybackKind::Sequence { export } = self.kind {
            host.lock_view_to_camera(false);
            host.set_overlays_hidden(false);
            if export {
                match host.finish_export() {
                    Ok(frames) => log::info!("exported {frames} frames"),
                    Err(err) => log::warn!("export not finalized: {err}"),
                }
            }
        }
        host.set_highlighted_edges(&self.object, &[]);
        log::info!("stopped playing `{}`", self.object);
    }
}

/// Writes a snapshot's mesh, view and camera to the host.
pub(crate) fn show_snapshot<H: Host + ?Sized>(host: &mut H, object: &str, snapshot: &Snapshot) {
    apply_mesh(host, object, &snapshot.mesh);
    if let Some(view) = &snapshot.view {
        host.write_view(view);
    }
    if let Some(camera) = &snapshot.camera {
        host.write_camera(camera);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point3;
    use crate::host::{MemoryHost, MeshAccess, ViewAccess};
    use crate::pose::ViewPose;
    use crate::snapshot::MeshData;

    fn line(x: f64) -> MeshData {
        MeshData::new(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(x, 0.0, 0.0)],
            vec![[0, 1]],
            vec![],
        )
    }

    fn record(steps: usize) -> ObjectRecord {
        let mut rec = ObjectRecord::new(Snapshot::new(line(1.0)));
        for i in 0..steps {
            rec.push_step(Snapshot::new(line(2.0 + i as f64)));
        }
        rec
    }

    #[test]
    fn range_clamps_into_history() {
        let n = 4;
        assert_eq!(
            PlaybackRange::resolve(PlaybackMode::Range, n, None, n + 5, 0),
            Some(PlaybackRange::single(n - 1))
        );
        assert_eq!(
            PlaybackRange::resolve(PlaybackMode::Range, n, None, 3, 1),
            Some(PlaybackRange { start: 2, end: 2 })
        );
        assert_eq!(
            PlaybackRange::resolve(PlaybackMode::Range, n, None, 2, 99),
            Some(PlaybackRange { start: 1, end: 3 })
        );
        assert_eq!(PlaybackRange::resolve(PlaybackMode::Start, 0, None, 1, 0), None);
    }

    #[test]
    fn active_mode_starts_at_selected_step() {
        let sel = Some(Selection::Step(2));
        assert_eq!(
            PlaybackRange::resolve(PlaybackMode::Active, 5, sel, 1, 0),
            Some(PlaybackRange { start: 2, end: 4 })
        );
        assert_eq!(
            PlaybackRange::resolve(PlaybackMode::Active, 5, Some(Selection::Step(9)), 1, 0),
            Some(PlaybackRange::single(4))
        );
    }

    #[test]
    fn active_mode_without_a_step_plays_everything() {
        for sel in [None, Some(Selection::Initial)] {
            assert_eq!(
                PlaybackRange::resolve(PlaybackMode::Active, 5, sel, 3, 4),
                Some(PlaybackRange { start: 0, end: 4 })
            );
        }
        assert_eq!(PlaybackRange::resolve(PlaybackMode::Active, 0, None, 1, 0), None);
    }

    #[test]
    fn phases_hold_mesh_while_view_moves() {
        let segment = Segment {
            view_moved: true,
            cam: 0.5,
            mesh: 0.5,
            frames: 10,
        };
        assert_eq!(segment.phase(0.25), (0.5, None));
        assert_eq!(segment.phase(0.75), (1.0, Some(0.5)));
        assert_eq!(segment.delay(), Duration::from_millis(100));

        let still = Segment {
            view_moved: false,
            cam: 0.0,
            mesh: 0.5,
            frames: 10,
        };
        assert_eq!(still.phase(0.25), (0.5, Some(0.5)));
    }

    #[test]
    fn sequence_plays_to_last_step_and_releases() {
        let mut host = MemoryHost::new();
        host.add_mesh("Line", line(9.0));
        host.set_view(Some(ViewPose::default()));
        let rec = record(2);
        let settings = RecorderSettings {
            interp_steps: 4,
            ..RecorderSettings::default()
        };
        let mut metrics = RecorderMetrics::default();

        let mut state = PlaybackState::start(
            &mut host,
            "Line",
            &rec,
            PlaybackRange { start: 0, end: 1 },
            PlaybackKind::Sequence { export: true },
        )
        .expect("valid range");
        assert_eq!(host.read_mesh("Line"), Some(line(1.0)));
        assert!(host.view_locked());

        let mut ticks = 0;
        while state.tick(&mut host, &rec, &settings, &mut metrics).is_some() {
            ticks += 1;
            assert!(ticks < 100);
        }
        assert_eq!(ticks, 7);
        assert_eq!(host.read_mesh("Line"), Some(line(3.0)));
        assert_eq!(host.frames().len(), 8);

        state.finish(&mut host);
        assert!(!host.view_locked());
        assert!(!host.overlays_hidden());
    }

    #[test]
    fn mid_step_tick_interpolates() {
        let mut host = MemoryHost::new();
        host.add_mesh("Line", line(1.0));
        let rec = record(1);
        let settings = RecorderSettings {
            interp_steps: 2,
            ..RecorderSettings::default()
        };
        let mut metrics = RecorderMetrics::default();
        let mut state =
            PlaybackState::start(&mut host, "Line", &rec, PlaybackRange::single(0), PlaybackKind::Jump)
                .expect("valid range");

        assert!(state.tick(&mut host, &rec, &settings, &mut metrics).is_some());
        let mid = host.read_mesh("Line").expect("exists");
        assert!((mid.vertices[1].x - 1.5).abs() < 1e-12);
        assert_eq!(state.tick(&mut host, &rec, &settings, &mut metrics), None);
        assert_eq!(host.read_mesh("Line"), Some(line(2.0)));
        assert!(!host.view_locked());
    }

    #[test]
    fn out_of_bounds_range_is_refused() {
        let mut host = MemoryHost::new();
        host.add_mesh("Line", line(1.0));
        let rec = record(1);
        assert!(
            PlaybackState::start(&mut host, "Line", &rec, PlaybackRange::single(3), PlaybackKind::Jump)
                .is_none()
        );
    }
}

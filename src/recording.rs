//! Recording state machine: polls the live mesh and turns stable
//! fingerprint changes into new steps, undos and redos.

use crate::fingerprint::mesh_fingerprint;
use crate::host::{Host, MeshAccess, apply_mesh};
use crate::ledger::{Ledger, ObjectRecord};
use crate::settings::RecorderSettings;
use crate::snapshot::Snapshot;

/// Outcome of one recording poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEvent {
    /// Live mesh matches the last accepted state.
    Unchanged,
    /// A different fingerprint is waiting to become stable.
    Pending,
    /// Appended as step `index`.
    NewStep { index: usize },
    /// Timeline truncated to `keep` steps, `moved` of them now redoable.
    Undo { keep: usize, moved: usize },
    /// `restored` steps moved back from the redo ledger.
    Redo { restored: usize },
}

/// Requires the same fingerprint on several consecutive polls before it
/// counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Debounce {
    pending: Option<u64>,
    count: u32,
}

impl Debounce {
    /// Feeds one observation. Returns the hash once it has been seen
    /// `required` times in a row.
    pub fn observe(&mut self, hash: u64, required: u32) -> Option<u64> {
        if self.pending == Some(hash) {
            self.count += 1;
        } else {
            self.pending = Some(hash);
            self.count = 1;
        }
        if self.count >= required.max(1) {
            self.reset();
            Some(hash)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.count = 0;
    }
}

/// Applies a stable fingerprint to a record.
///
/// `capture` is called only when the fingerprint is new.
pub fn classify(
    record: &mut ObjectRecord,
    hash: u64,
    redo_limit: usize,
    capture: impl FnOnce() -> Snapshot,
) -> RecordEvent {
    if let Some(keep) = record.find_in_history(hash) {
        let moved = record.undo_to(keep, redo_limit);
        return RecordEvent::Undo { keep, moved };
    }
    if let Some(idx) = record.find_in_redo(hash) {
        let restored = record.redo_through(idx);
        return RecordEvent::Redo { restored };
    }
    let index = record.push_step(capture().with_hash(hash));
    RecordEvent::NewStep { index }
}

/// An active recording session on one object.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingState {
    object: String,
    last_hash: u64,
    debounce: Debounce,
    /// Objects made unselectable for the duration of the session.
    locked: Vec<String>,
}

impl RecordingState {
    /// Starts recording the host's active mesh.
    ///
    /// An object that already has a record resumes from its last step: the
    /// step is written back to the live mesh, view and camera first. A new
    /// object gets its initial snapshot captured.
    pub fn start<H: Host + ?Sized>(host: &mut H, ledger: &mut Ledger) -> Option<Self> {
        let object = host.active_object()?;
        let live = host.read_mesh(&object)?;

        let last_hash = if let Some(record) = ledger.get_mut(&object) {
            log::info!("resuming recording of `{object}` at step {}", record.len());
            record.clear_redo();
            let last = record.last_snapshot().clone();
            if !record.is_empty() {
                apply_mesh(host, &object, &last.mesh);
                if let Some(view) = &last.view {
                    host.write_view(view);
                }
                if let Some(camera) = &last.camera {
                    host.write_camera(camera);
                }
            }
            host.read_mesh(&object)
                .map_or_else(|| mesh_fingerprint(&last.mesh), |mesh| mesh_fingerprint(&mesh))
        } else {
            log::info!("starting recording of `{object}`");
            let hash = mesh_fingerprint(&live);
            let initial = Snapshot::new(live)
                .with_hash(hash)
                .with_view(host.read_view())
                .with_camera(host.read_camera());
            ledger.insert(object.clone(), ObjectRecord::new(initial));
            hash
        };

        let mut state = Self {
            object,
            last_hash,
            debounce: Debounce::default(),
            locked: Vec::new(),
        };
        state.lock_others(host);
        Some(state)
    }

    #[must_use]
    pub fn object(&self) -> &str {
        &self.object
    }

    #[must_use]
    pub fn last_hash(&self) -> u64 {
        self.last_hash
    }

    #[must_use]
    pub fn locked(&self) -> &[String] {
        &self.locked
    }

    /// One polling tick.
    pub fn poll<H: Host + ?Sized>(
        &mut self,
        host: &H,
        ledger: &mut Ledger,
        settings: &RecorderSettings,
    ) -> RecordEvent {
        if host.active_object().as_deref() != Some(self.object.as_str()) {
            return RecordEvent::Unchanged;
        }
        let Some(record) = ledger.get_mut(&self.object) else {
            return RecordEvent::Unchanged;
        };
        let Some(live) = host.read_mesh(&self.object) else {
            return RecordEvent::Unchanged;
        };

        let hash = mesh_fingerprint(&live);
        if hash == self.last_hash {
            self.debounce.reset();
            return RecordEvent::Unchanged;
        }
        let Some(stable) = self.debounce.observe(hash, settings.stable_ticks) else {
            return RecordEvent::Pending;
        };

        let event = classify(record, stable, settings.redo_limit, || {
            Snapshot::new(live)
                .with_view(host.read_view())
                .with_camera(host.read_camera())
        });
        self.last_hash = stable;
        log::debug!("`{}`: {event:?}", self.object);
        event
    }

    /// Ends the session: the redo ledger is dropped and every lock released.
    pub fn finish<H: MeshAccess + ?Sized>(mut self, host: &mut H, ledger: &mut Ledger) {
        if let Some(record) = ledger.get_mut(&self.object) {
            record.clear_redo();
        }
        self.release_locks(host);
        log::info!("stopped recording `{}`", self.object);
    }

    /// Makes the other selectable meshes unselectable, remembering which.
    fn lock_others<H: MeshAccess + ?Sized>(&mut self, host: &mut H) {
        self.locked.clear();
        for name in host.mesh_objects() {
            if name != self.object && host.is_selectable(&name) {
                host.set_selectable(&name, false);
                self.locked.push(name);
            }
        }
    }

    /// Unlocks everything this session locked. Safe to call repeatedly.
    pub fn release_locks<H: MeshAccess + ?Sized>(&mut self, host: &mut H) {
        for name in self.locked.drain(..) {
            if host.object_exists(&name) {
                host.set_selectable(&name, true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point3;
    use crate::host::MemoryHost;
    use crate::snapshot::MeshData;

    fn quad(lift: f64) -> MeshData {
        MeshData::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, lift),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1], [1, 2], [2, 3], [3, 0]],
            vec![vec![0, 1, 2, 3]],
        )
    }

    #[test]
    fn debounce_needs_consecutive_repeats() {
        let mut debounce = Debounce::default();
        assert_eq!(debounce.observe(7, 3), None);
        assert_eq!(debounce.observe(7, 3), None);
        assert_eq!(debounce.observe(8, 3), None);
        assert_eq!(debounce.observe(8, 3), None);
        assert_eq!(debounce.observe(8, 3), Some(8));
        assert_eq!(debounce.observe(8, 1), Some(8));
    }

    #[test]
    fn edit_becomes_a_step_after_three_polls() {
        let mut host = MemoryHost::new();
        host.add_mesh("Plane", quad(0.0));
        host.add_mesh("Other", quad(5.0));
        host.set_active(Some("Plane")).expect("exists");
        let mut ledger = Ledger::new();
        let settings = RecorderSettings::default();

        let mut state = RecordingState::start(&mut host, &mut ledger).expect("mesh active");
        assert_eq!(state.locked(), &["Other".to_owned()]);
        assert!(!host.is_selectable("Other"));

        host.set_mesh("Plane", quad(0.5)).expect("exists");
        assert_eq!(state.poll(&host, &mut ledger, &settings), RecordEvent::Pending);
        assert_eq!(state.poll(&host, &mut ledger, &settings), RecordEvent::Pending);
        assert_eq!(
            state.poll(&host, &mut ledger, &settings),
            RecordEvent::NewStep { index: 0 }
        );
        assert_eq!(state.poll(&host, &mut ledger, &settings), RecordEvent::Unchanged);

        state.finish(&mut host, &mut ledger);
        assert!(host.is_selectable("Other"));
        assert_eq!(ledger.get("Plane").map(ObjectRecord::len), Some(1));
    }

    #[test]
    fn polls_ignore_other_active_objects() {
        let mut host = MemoryHost::new();
        host.add_mesh("Plane", quad(0.0));
        let mut ledger = Ledger::new();
        let mut state = RecordingState::start(&mut host, &mut ledger).expect("mesh active");
        host.set_mesh("Plane", quad(1.0)).expect("exists");
        host.set_active(None).expect("deselect");
        let settings = RecorderSettings::default();
        for _ in 0..5 {
            assert_eq!(state.poll(&host, &mut ledger, &settings), RecordEvent::Unchanged);
        }
    }

    #[test]
    fn resume_applies_last_step_to_live_mesh() {
        let mut host = MemoryHost::new();
        host.add_mesh("Plane", quad(0.0));
        let mut ledger = Ledger::new();
        let mut initial = ObjectRecord::new(Snapshot::new(quad(0.0)));
        initial.push_step(Snapshot::new(quad(2.0)));
        ledger.insert("Plane", initial);

        let state = RecordingState::start(&mut host, &mut ledger).expect("mesh active");
        assert_eq!(host.read_mesh("Plane"), Some(quad(2.0)));
        assert_eq!(state.last_hash(), mesh_fingerprint(&quad(2.0)));
    }

    #[test]
    fn release_is_idempotent() {
        let mut host = MemoryHost::new();
        host.add_mesh("A", quad(0.0));
        host.add_mesh("B", quad(1.0));
        let mut ledger = Ledger::new();
        let mut state = RecordingState::start(&mut host, &mut ledger).expect("B active");
        state.release_locks(&mut host);
        state.release_locks(&mut host);
        assert!(host.is_selectable("A"));
        assert!(state.locked().is_empty());
    }
}

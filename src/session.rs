//! The recorder session: one per host process.
//!
//! A [`Session`] owns the ledger, the settings and whichever activity is
//! running. Recording and playback are variants of one [`Activity`], so they
//! can never be active together. Every user-facing operation checks its
//! preconditions and returns `false` instead of failing; the matching
//! `can_*` method answers the same question without side effects.

use std::time::Duration;

use crate::geom::{RecorderMetrics, TimingBucket, TimingReport};
use crate::host::{Host, MeshAccess};
use crate::ledger::{DeletedStep, Ledger, ObjectRecord};
use crate::persist;
use crate::playback::{PlaybackKind, PlaybackRange, PlaybackState, Selection, show_snapshot};
use crate::recording::{RecordEvent, RecordingState};
use crate::schedule::{Scheduler, Task, TaskKind};
use crate::settings::{PlaybackMode, RecorderSettings, StepTiming};

/// How often deleted objects are looked for.
pub const EXISTENCE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
enum Activity {
    #[default]
    Idle,
    Recording(RecordingState),
    Playing(PlaybackState),
}

#[derive(Debug, Default)]
pub struct Session {
    settings: RecorderSettings,
    ledger: Ledger,
    /// Object whose record the step list shows.
    display: Option<String>,
    selection: Option<Selection>,
    activity: Activity,
    deleted: Option<DeletedStep>,
    view_reset_pending: bool,
    prev_active: Option<String>,
    last_event: Option<RecordEvent>,
    shut_down: bool,
    metrics: RecorderMetrics,
    /// Bumped on every activity change; stamps recording and playback tasks.
    activity_epoch: u64,
    /// Bumped on every attach; stamps the existence check.
    attach_epoch: u64,
}

impl Session {
    #[must_use]
    pub fn new(settings: RecorderSettings) -> Self {
        Self {
            settings: settings.sanitized(),
            ..Self::default()
        }
    }

    /// Loads persisted data from the host and starts the existence check.
    ///
    /// A running activity is stopped first, so its locks are released and a
    /// recording is saved before the host data is read. The existence check
    /// of an earlier attach ends at its next tick.
    pub fn attach<H: Host + ?Sized, S: Scheduler + ?Sized>(&mut self, host: &mut H, sched: &mut S) {
        self.force_stop(host);
        let ledger = &mut self.ledger;
        let display = &mut self.display;
        self.metrics.time(TimingBucket::Persistence, || {
            let loaded = persist::load(host);
            *ledger = loaded.ledger;
            *display = loaded.display;
        });
        self.selection = None;
        self.deleted = None;
        self.shut_down = false;
        self.prev_active = host.active_object();
        self.attach_epoch += 1;
        sched.schedule(
            Task::new(TaskKind::ExistenceCheck, self.attach_epoch),
            EXISTENCE_CHECK_INTERVAL,
        );
    }

    #[must_use]
    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: &RecorderSettings) {
        self.settings = settings.sanitized();
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    #[must_use]
    pub fn display_object(&self) -> Option<&str> {
        self.display.as_deref()
    }

    #[must_use]
    pub fn current_record(&self) -> Option<&ObjectRecord> {
        self.display.as_deref().and_then(|name| self.ledger.get(name))
    }

    #[must_use]
    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        matches!(self.activity, Activity::Recording(_))
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        matches!(self.activity, Activity::Playing(_))
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.activity, Activity::Idle)
    }

    /// Outcome of the latest recording poll.
    #[must_use]
    pub fn last_event(&self) -> Option<RecordEvent> {
        self.last_event
    }

    #[must_use]
    pub fn playback(&self) -> Option<&PlaybackState> {
        match &self.activity {
            Activity::Playing(state) => Some(state),
            _ => None,
        }
    }

    #[must_use]
    pub fn recording(&self) -> Option<&RecordingState> {
        match &self.activity {
            Activity::Recording(state) => Some(state),
            _ => None,
        }
    }

    #[must_use]
    pub fn view_reset_pending(&self) -> bool {
        self.view_reset_pending
    }

    #[must_use]
    pub fn metrics_report(&self) -> Option<TimingReport> {
        self.metrics.report()
    }

    fn save<H: Host + ?Sized>(&mut self, host: &mut H) {
        let ledger = &self.ledger;
        let display = self.display.as_deref();
        self.metrics
            .time(TimingBucket::Persistence, || persist::save(host, ledger, display));
    }

    fn selected_step(&self) -> Option<usize> {
        let len = self.current_record()?.len();
        match self.selection {
            Some(Selection::Step(i)) if i < len => Some(i),
            _ => None,
        }
    }

    // ---- recording -------------------------------------------------------

    #[must_use]
    pub fn can_start_recording<H: Host + ?Sized>(&self, host: &H) -> bool {
        !self.shut_down && self.is_idle() && host.active_object().is_some()
    }

    pub fn start_recording<H: Host + ?Sized, S: Scheduler + ?Sized>(
        &mut self,
        host: &mut H,
        sched: &mut S,
    ) -> bool {
        if !self.can_start_recording(host) {
            log::debug!("start_recording refused");
            return false;
        }
        let Some(state) = RecordingState::start(host, &mut self.ledger) else {
            return false;
        };
        self.display = Some(state.object().to_owned());
        self.selection = None;
        self.view_reset_pending = false;
        self.last_event = None;
        crate::debug_log!("recording `{}` started", state.object());
        self.replace_activity(Activity::Recording(state));
        sched.schedule(
            Task::new(TaskKind::RecordingPoll, self.activity_epoch),
            Duration::from_millis(self.settings.poll_interval_ms),
        );
        true
    }

    pub fn stop_recording<H: Host + ?Sized>(&mut self, host: &mut H) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.force_stop(host);
        true
    }

    // ---- playback --------------------------------------------------------

    #[must_use]
    pub fn can_play<H: Host + ?Sized>(&self, host: &H) -> bool {
        !self.shut_down
            && self.is_idle()
            && self.display.as_deref().is_some_and(|name| host.object_exists(name))
            && self.current_record().is_some_and(|rec| !rec.is_empty())
    }

    /// Plays the displayed record in the configured playback mode.
    pub fn play<H: Host + ?Sized, S: Scheduler + ?Sized>(
        &mut self,
        host: &mut H,
        sched: &mut S,
        export: bool,
    ) -> bool {
        self.play_mode(host, sched, self.settings.playback_mode, export)
    }

    pub fn play_mode<H: Host + ?Sized, S: Scheduler + ?Sized>(
        &mut self,
        host: &mut H,
        sched: &mut S,
        mode: PlaybackMode,
        export: bool,
    ) -> bool {
        if !self.can_play(host) {
            log::debug!("play refused");
            return false;
        }
        let Some(name) = self.display.clone() else {
            return false;
        };
        let Some(record) = self.ledger.get(&name) else {
            return false;
        };
        let Some(range) = PlaybackRange::resolve(
            mode,
            record.len(),
            self.selection,
            self.settings.playback_start_step,
            self.settings.playback_end_step,
        ) else {
            log::debug!("play refused: empty range");
            return false;
        };
        self.start_playback(host, sched, &name, range, PlaybackKind::Sequence { export })
    }

    fn start_playback<H: Host + ?Sized, S: Scheduler + ?Sized>(
        &mut self,
        host: &mut H,
        sched: &mut S,
        name: &str,
        range: PlaybackRange,
        kind: PlaybackKind,
    ) -> bool {
        let Some(record) = self.ledger.get(name) else {
            return false;
        };
        let Some(state) = PlaybackState::start(host, name, record, range, kind) else {
            return false;
        };
        let delay = state.next_delay(record, &self.settings);
        self.view_reset_pending = false;
        crate::debug_log!("playback of `{name}` started: {range:?}");
        self.replace_activity(Activity::Playing(state));
        sched.schedule(Task::new(TaskKind::PlaybackTick, self.activity_epoch), delay);
        true
    }

    pub fn stop_playing<H: Host + ?Sized>(&mut self, host: &mut H) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.force_stop(host);
        true
    }

    // ---- step list -------------------------------------------------------

    /// Selects a row of the step list. The initial row is shown at once; a
    /// step is reached by an interpolated jump from its predecessor.
    pub fn select<H: Host + ?Sized, S: Scheduler + ?Sized>(
        &mut self,
        host: &mut H,
        sched: &mut S,
        selection: Selection,
    ) -> bool {
        if self.shut_down || !self.is_idle() {
            return false;
        }
        let Some(name) = self.display.clone() else {
            return false;
        };
        let Some(record) = self.ledger.get(&name) else {
            return false;
        };
        if !host.object_exists(&name) {
            return false;
        }
        match selection {
            Selection::Initial => {
                show_snapshot(host, &name, &record.initial);
                host.set_highlighted_edges(&name, &[]);
                self.selection = Some(selection);
                true
            }
            Selection::Step(i) if i < record.len() => {
                self.selection = Some(selection);
                self.start_playback(host, sched, &name, PlaybackRange::single(i), PlaybackKind::Jump)
            }
            Selection::Step(_) => false,
        }
    }

    /// Switches the step list to another tracked object.
    pub fn set_display_object(&mut self, name: &str) -> bool {
        if !self.is_idle() || !self.ledger.contains(name) {
            return false;
        }
        if self.display.as_deref() != Some(name) {
            self.display = Some(name.to_owned());
            self.selection = None;
            self.view_reset_pending = false;
        }
        true
    }

    #[must_use]
    pub fn can_edit_steps(&self) -> bool {
        !self.shut_down && self.is_idle() && self.current_record().is_some()
    }

    pub fn delete_step<H: Host + ?Sized>(&mut self, host: &mut H, index: usize) -> bool {
        if !self.can_edit_steps() {
            return false;
        }
        let Some(name) = self.display.clone() else {
            return false;
        };
        let Some(record) = self.ledger.get_mut(&name) else {
            return false;
        };
        let Some(step) = record.remove_step(index) else {
            return false;
        };
        let len = record.len();
        self.deleted = Some(DeletedStep {
            object: name,
            index,
            step,
            revision: record.revision(),
        });
        if let Some(Selection::Step(i)) = self.selection {
            self.selection = match len {
                0 => Some(Selection::Initial),
                _ => Some(Selection::Step(i.min(len - 1))),
            };
        }
        log::debug!("deleted step {}", index + 1);
        self.save(host);
        true
    }

    /// Restore is only offered for the last deletion, on the same object,
    /// while its history is exactly as the deletion left it.
    #[must_use]
    pub fn can_restore_step(&self) -> bool {
        let Some(deleted) = &self.deleted else {
            return false;
        };
        self.can_edit_steps()
            && self.display.as_deref() == Some(deleted.object.as_str())
            && self
                .ledger
                .get(&deleted.object)
                .is_some_and(|rec| rec.revision() == deleted.revision)
    }

    pub fn restore_step<H: Host + ?Sized>(&mut self, host: &mut H) -> bool {
        if !self.can_restore_step() {
            return false;
        }
        let Some(deleted) = self.deleted.take() else {
            return false;
        };
        let Some(record) = self.ledger.get_mut(&deleted.object) else {
            return false;
        };
        record.insert_step(deleted.index, deleted.step);
        log::debug!("restored step {}", deleted.index + 1);
        self.save(host);
        true
    }

    /// Enters the pending state in which the user frames a new view for the
    /// selected step.
    pub fn begin_view_reset(&mut self) -> bool {
        if !self.can_edit_steps() || self.view_reset_pending || self.selected_step().is_none() {
            return false;
        }
        self.view_reset_pending = true;
        true
    }

    /// Stores the current viewport as the selected step's view.
    pub fn confirm_view_reset<H: Host + ?Sized>(&mut self, host: &mut H) -> bool {
        if !self.view_reset_pending {
            return false;
        }
        self.view_reset_pending = false;
        let (Some(index), Some(name)) = (self.selected_step(), self.display.clone()) else {
            return false;
        };
        let view = host.read_view();
        let updated = self
            .ledger
            .get_mut(&name)
            .is_some_and(|rec| rec.set_view(index, view));
        if updated {
            self.save(host);
        }
        updated
    }

    pub fn cancel_view_reset(&mut self) -> bool {
        std::mem::replace(&mut self.view_reset_pending, false)
    }

    /// Uses the selected step as the 1-based range start, unless that would
    /// put it after a set end.
    pub fn set_start_from_selection(&mut self) -> bool {
        let Some(index) = self.selected_step().filter(|_| self.can_edit_steps()) else {
            return false;
        };
        let start = index + 1;
        let end = self.settings.playback_end_step;
        if end == 0 || start <= end {
            self.settings.playback_start_step = start;
            true
        } else {
            false
        }
    }

    /// Uses the selected step as the 1-based range end, unless that would
    /// put it before the start.
    pub fn set_end_from_selection(&mut self) -> bool {
        let Some(index) = self.selected_step().filter(|_| self.can_edit_steps()) else {
            return false;
        };
        let end = index + 1;
        if end >= self.settings.playback_start_step {
            self.settings.playback_end_step = end;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn step_timing(&self, index: usize) -> Option<&StepTiming> {
        self.current_record()?.step(index).map(|s| &s.timing)
    }

    pub fn set_step_timing<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        index: usize,
        timing: StepTiming,
    ) -> bool {
        self.update_timing(host, index, |t| *t = timing)
    }

    /// Records the edges to highlight for a step and switches highlighting on.
    pub fn mark_edges<H: Host + ?Sized>(&mut self, host: &mut H, index: usize, edges: Vec<[u32; 2]>) -> bool {
        self.update_timing(host, index, |t| {
            t.marked_edges = edges;
            t.show_edges = true;
        })
    }

    pub fn toggle_show_edges<H: Host + ?Sized>(&mut self, host: &mut H, index: usize) -> bool {
        self.update_timing(host, index, |t| t.show_edges = !t.show_edges)
    }

    fn update_timing<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        index: usize,
        edit: impl FnOnce(&mut StepTiming),
    ) -> bool {
        if !self.can_edit_steps() {
            return false;
        }
        let Some(name) = self.display.clone() else {
            return false;
        };
        let Some(step) = self.ledger.get_mut(&name).and_then(|rec| rec.step_mut(index)) else {
            return false;
        };
        edit(&mut step.timing);
        let highlighted = step.timing.highlighted_edges().to_vec();
        if self.selection == Some(Selection::Step(index)) {
            host.set_highlighted_edges(&name, &highlighted);
        }
        self.save(host);
        true
    }

    // ---- scene changes ---------------------------------------------------

    /// Drops records of deleted objects. An activity on a deleted object is
    /// stopped first. Returns the dropped names.
    pub fn prune_missing_objects<H: Host + ?Sized>(&mut self, host: &mut H) -> Vec<String> {
        let active_target = match &self.activity {
            Activity::Idle => None,
            Activity::Recording(state) => Some(state.object().to_owned()),
            Activity::Playing(state) => Some(state.object().to_owned()),
        };
        if let Some(name) = active_target.filter(|name| !host.object_exists(name)) {
            log::warn!("`{name}` was deleted, stopping");
            self.force_stop(host);
        }

        let gone = self.ledger.retain_existing(|name| host.object_exists(name));
        if gone.is_empty() {
            return gone;
        }
        if self
            .deleted
            .as_ref()
            .is_some_and(|d| gone.contains(&d.object))
        {
            self.deleted = None;
        }
        if self.display.as_ref().is_some_and(|d| gone.contains(d)) {
            self.display = self.ledger.names().next().map(str::to_owned);
            self.selection = None;
            self.view_reset_pending = false;
        }
        self.save(host);
        gone
    }

    /// Follows the host's selection: a newly selected mesh object becomes
    /// the displayed one.
    pub fn on_active_object_changed<H: Host + ?Sized>(&mut self, host: &H) {
        if !self.is_idle() {
            return;
        }
        let active = host.active_object();
        if active == self.prev_active {
            return;
        }
        self.prev_active.clone_from(&active);
        if let Some(name) = active {
            if self.display.as_deref() != Some(name.as_str()) {
                self.display = Some(name);
                self.selection = None;
                self.view_reset_pending = false;
            }
        }
    }

    /// Swaps the activity and retires every task armed for the old one.
    fn replace_activity(&mut self, next: Activity) -> Activity {
        self.activity_epoch += 1;
        std::mem::replace(&mut self.activity, next)
    }

    fn force_stop<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.is_idle() {
            return;
        }
        match self.replace_activity(Activity::Idle) {
            Activity::Idle => {}
            Activity::Recording(state) => {
                crate::debug_log!("recording `{}` stopped", state.object());
                state.finish(host, &mut self.ledger);
                self.save(host);
            }
            Activity::Playing(state) => {
                crate::debug_log!("playback of `{}` stopped", state.object());
                state.finish(host);
            }
        }
    }

    /// Stops recording or playback, whichever runs. Returns whether
    /// anything was running.
    pub fn stop_activity<H: Host + ?Sized>(&mut self, host: &mut H) -> bool {
        let running = !self.is_idle();
        self.force_stop(host);
        running
    }

    /// Stops whatever runs and releases every lock. Safe to call repeatedly.
    pub fn shutdown<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.force_stop(host);
        self.view_reset_pending = false;
        self.shut_down = true;
    }

    // ---- scheduler -------------------------------------------------------

    /// Whether `task` was armed by the running activity (or, for the
    /// existence check, by the latest attach).
    #[must_use]
    pub fn is_current(&self, task: Task) -> bool {
        match task.kind {
            TaskKind::RecordingPoll => self.is_recording() && task.epoch == self.activity_epoch,
            TaskKind::PlaybackTick => self.is_playing() && task.epoch == self.activity_epoch,
            TaskKind::ExistenceCheck => !self.shut_down && task.epoch == self.attach_epoch,
        }
    }

    /// Runs one tick of `task`. Returns the delay until the next tick, or
    /// `None` when the task is stale or its activity is over.
    pub fn tick<H: Host + ?Sized>(&mut self, task: Task, host: &mut H) -> Option<Duration> {
        if !self.is_current(task) {
            log::trace!("ignoring stale {task:?}");
            return None;
        }
        match task.kind {
            TaskKind::RecordingPoll => {
                let Activity::Recording(state) = &mut self.activity else {
                    return None;
                };
                let ledger = &mut self.ledger;
                let settings = &self.settings;
                let event = self
                    .metrics
                    .time(TimingBucket::Fingerprint, || state.poll(host, ledger, settings));
                self.last_event = Some(event);
                Some(Duration::from_millis(self.settings.poll_interval_ms))
            }
            TaskKind::PlaybackTick => self.playback_tick(host),
            TaskKind::ExistenceCheck => {
                self.prune_missing_objects(host);
                self.on_active_object_changed(host);
                Some(EXISTENCE_CHECK_INTERVAL)
            }
        }
    }

    fn playback_tick<H: Host + ?Sized>(&mut self, host: &mut H) -> Option<Duration> {
        let Activity::Playing(state) = &mut self.activity else {
            return None;
        };
        let next = match self.ledger.get(state.object()) {
            Some(record) => {
                if matches!(state.kind(), PlaybackKind::Sequence { .. }) {
                    let index = state.cursor().step_index.min(record.len().saturating_sub(1));
                    self.selection = Some(Selection::Step(index));
                }
                state.tick(host, record, &self.settings, &mut self.metrics)
            }
            None => None,
        };
        if next.is_none() {
            self.stop_playing(host);
        }
        next
    }
}

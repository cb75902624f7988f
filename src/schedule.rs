//! Cooperative timer model.
//!
//! The host owns the timer loop: it calls [`crate::session::Session::tick`]
//! with a [`Task`] and re-arms the same task with the returned delay.
//! [`SimulatedClock`] is that loop without wall time.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::host::Host;
use crate::session::Session;

/// The periodic activities a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskKind {
    RecordingPoll,
    PlaybackTick,
    ExistenceCheck,
}

/// One armed timer.
///
/// `epoch` names the activity (or attachment) that armed it. Once that
/// activity has stopped, the session rejects the task and the chain ends,
/// so a restart never runs next to a leftover timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Task {
    pub kind: TaskKind,
    pub epoch: u64,
}

impl Task {
    #[must_use]
    pub const fn new(kind: TaskKind, epoch: u64) -> Self {
        Self { kind, epoch }
    }
}

/// Anything that can run a task again after a delay.
pub trait Scheduler {
    fn schedule(&mut self, task: Task, delay: Duration);
}

/// Deterministic scheduler ordered by due time, then insertion.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    now: Duration,
    seq: u64,
    queue: BinaryHeap<Reverse<(Duration, u64, Task)>>,
}

impl SimulatedClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.now
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether a task of `kind` is queued, current or not.
    #[must_use]
    pub fn pending(&self, kind: TaskKind) -> bool {
        self.queue.iter().any(|Reverse((_, _, task))| task.kind == kind)
    }

    /// Pops the next due task, advancing the clock to it.
    pub fn next_task(&mut self) -> Option<Task> {
        self.next_due(Duration::MAX)
    }

    fn next_due(&mut self, limit: Duration) -> Option<Task> {
        let Reverse((due, _, _)) = self.queue.peek()?;
        if *due > limit {
            return None;
        }
        let Reverse((due, _, task)) = self.queue.pop()?;
        self.now = self.now.max(due);
        Some(task)
    }

    /// Runs the next current task due by `limit`, dropping stale ones on
    /// the way, and re-arms it.
    fn run_next<H: Host>(&mut self, session: &mut Session, host: &mut H, limit: Duration) -> Option<TaskKind> {
        loop {
            let task = self.next_due(limit)?;
            if !session.is_current(task) {
                log::trace!("dropping stale {task:?}");
                continue;
            }
            if let Some(delay) = session.tick(task, host) {
                self.schedule(task, delay);
            }
            return Some(task.kind);
        }
    }

    /// Runs one current task against the session. Returns its kind.
    pub fn step<H: Host>(&mut self, session: &mut Session, host: &mut H) -> Option<TaskKind> {
        self.run_next(session, host, Duration::MAX)
    }

    /// Runs tasks until the queue drains or the clock passes `limit`.
    /// Returns the number of tasks run.
    pub fn run_until<H: Host>(&mut self, session: &mut Session, host: &mut H, limit: Duration) -> usize {
        let mut ran = 0;
        while self.run_next(session, host, limit).is_some() {
            ran += 1;
        }
        self.now = self.now.max(limit);
        ran
    }

    /// Runs tasks until no `kind` task is left or `max_ticks` of them ran.
    /// Returns how many `kind` tasks ran.
    pub fn drain<H: Host>(
        &mut self,
        session: &mut Session,
        host: &mut H,
        kind: TaskKind,
        max_ticks: usize,
    ) -> usize {
        let mut ran = 0;
        while ran < max_ticks && self.pending(kind) {
            match self.step(session, host) {
                Some(k) if k == kind => ran += 1,
                Some(_) => {}
                None => break,
            }
        }
        ran
    }
}

impl Scheduler for SimulatedClock {
    fn schedule(&mut self, task: Task, delay: Duration) {
        self.seq += 1;
        self.queue.push(Reverse((self.now + delay, self.seq, task)));
    }
}

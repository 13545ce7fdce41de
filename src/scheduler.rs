use std::{sync::Arc, time::Duration};

use log::{debug, trace};
use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};
use tokio::sync::watch;

use crate::activity;
use crate::archetype::Archetype;
use crate::auth;
use crate::error::ConfigError;
use crate::session::Session;
use crate::sync;

/// The closed set of things a session can do on a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Cold start: discovery calls, presence, filter bootstrap and a first sync.
    PageLoad,
    /// Recurring incremental sync.
    BackgroundSync,
    /// Typing indicators plus a message in a known room.
    SendActivity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Unauthenticated,
    NoFilter,
    NoKnownRooms,
}

/// Result of one task invocation. Skips are not failures and report nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    Ran,
    Skipped(SkipReason),
    Failed,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::PageLoad => "page_load",
            TaskKind::BackgroundSync => "background_sync",
            TaskKind::SendActivity => "send_activity",
        }
    }

    /// Why this task cannot run yet, if it cannot.
    pub fn precondition(&self, session: &Session) -> Option<SkipReason> {
        if !session.is_authenticated() {
            return Some(SkipReason::Unauthenticated);
        }

        match self {
            TaskKind::PageLoad => None,
            TaskKind::BackgroundSync if session.state.filter_id.is_none() => {
                Some(SkipReason::NoFilter)
            }
            TaskKind::BackgroundSync => None,
            TaskKind::SendActivity if session.state.known_room_ids.is_empty() => {
                Some(SkipReason::NoKnownRooms)
            }
            TaskKind::SendActivity => None,
        }
    }

    pub async fn execute(&self, session: &mut Session, archetype: &Archetype) -> TaskOutcome {
        if let Some(reason) = self.precondition(session) {
            return TaskOutcome::Skipped(reason);
        }

        match self {
            TaskKind::PageLoad => sync::page_load(session).await,
            TaskKind::BackgroundSync => {
                sync::background_sync(session, archetype.long_poll_timeout_ms).await
            }
            TaskKind::SendActivity => activity::simulate_activity(session).await,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub weight: u32,
}

impl TaskDescriptor {
    pub fn new(kind: TaskKind, weight: u32) -> Self {
        Self { kind, weight }
    }
}

/// Wait between two tasks of the same session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pacing {
    Constant(Duration),
    /// Uniform in `[min, max]`.
    Between { min: Duration, max: Duration },
}

impl Pacing {
    pub fn next_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        match *self {
            Pacing::Constant(delay) => delay,
            Pacing::Between { min, max } if max <= min => min,
            Pacing::Between { min, max } => rng.gen_range(min..=max),
        }
    }
}

/// Per-session task counts, handed back when the session ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskTally {
    pub ran: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl TaskTally {
    pub fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Ran => self.ran += 1,
            TaskOutcome::Skipped(_) => self.skipped += 1,
            TaskOutcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.ran + self.skipped + self.failed
    }
}

/// Drives one session through its archetype's catalog.
pub struct TaskScheduler {
    archetype: Arc<Archetype>,
    dist: WeightedIndex<u32>,
}

impl TaskScheduler {
    pub fn new(archetype: Arc<Archetype>) -> Result<Self, ConfigError> {
        let weights = archetype.tasks.iter().map(|t| t.weight);
        let dist = WeightedIndex::new(weights).map_err(|e| {
            ConfigError::InvalidArchetype(format!("{}: task weights: {}", archetype.name, e))
        })?;

        Ok(Self { archetype, dist })
    }

    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }

    /// Weighted draw; each task's chance is its weight over the catalog total.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> TaskKind {
        self.archetype.tasks[self.dist.sample(rng)].kind
    }

    /// One scheduling tick without pacing. An unauthenticated session first retries
    /// authentication; whatever is still missing turns the chosen task into a skip.
    pub async fn select_and_run(&self, session: &mut Session) -> (TaskKind, TaskOutcome) {
        if !session.is_authenticated() {
            if let Err(e) = auth::authenticate(session).await {
                debug!("Session {}: unauthenticated: {}", session.index, e);
            }
        }

        let kind = self.select(&mut session.rng);
        let outcome = kind.execute(session, &self.archetype).await;

        trace!("Session {}: {} -> {:?}", session.index, kind.name(), outcome);

        (kind, outcome)
    }

    /// Ticks until `stop` flips. The stop flag is only looked at between tasks, so an
    /// exchange that has started always runs to completion.
    pub async fn run(&self, session: &mut Session, mut stop: watch::Receiver<bool>) -> TaskTally {
        let mut tally = TaskTally::default();

        loop {
            if *stop.borrow() {
                break;
            }

            let (_, outcome) = self.select_and_run(session).await;
            tally.record(outcome);

            let delay = self.archetype.pacing.next_delay(&mut session.rng);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tally
    }
}

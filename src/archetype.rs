use std::time::Duration;

use crate::scheduler::{Pacing, TaskDescriptor, TaskKind};

/// A behaviour profile shared by every session instantiated from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Archetype {
    pub name: String,
    pub pacing: Pacing,
    pub tasks: Vec<TaskDescriptor>,
    /// Share of the population, relative to the other archetypes of the run.
    pub population_weight: u32,
    /// When set, every background sync follows its immediate call with a long poll using
    /// this timeout. Long polls land in their own label, but they still skew latency.
    pub long_poll_timeout_ms: Option<u64>,
}

impl Archetype {
    pub fn new(name: impl Into<String>, pacing: Pacing, population_weight: u32) -> Self {
        Self {
            name: name.into(),
            pacing,
            tasks: Vec::new(),
            population_weight,
            long_poll_timeout_ms: None,
        }
    }

    pub fn task(mut self, kind: TaskKind, weight: u32) -> Self {
        self.tasks.push(TaskDescriptor::new(kind, weight));
        self
    }

    pub fn long_poll(mut self, timeout_ms: u64) -> Self {
        self.long_poll_timeout_ms = Some(timeout_ms);
        self
    }

    /// Keeps a page open: mostly polling, an occasional reload.
    pub fn idle() -> Self {
        Archetype::new("Idle", Pacing::Constant(Duration::from_secs(1)), 3)
            .task(TaskKind::PageLoad, 1)
            .task(TaskKind::BackgroundSync, 4)
    }

    /// Polls and writes into its rooms every few seconds.
    pub fn active() -> Self {
        let pacing = Pacing::Between {
            min: Duration::from_secs(5),
            max: Duration::from_secs(15),
        };

        Archetype::new("Active", pacing, 2)
            .task(TaskKind::PageLoad, 1)
            .task(TaskKind::BackgroundSync, 3)
            .task(TaskKind::SendActivity, 2)
    }

    pub fn builtin() -> Vec<Archetype> {
        vec![Archetype::idle(), Archetype::active()]
    }
}

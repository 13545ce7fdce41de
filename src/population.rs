use std::{future::Future, io, sync::Arc, time::Duration};

use futures::future::join_all;
use log::{error, info, warn};
use rand::{rngs::StdRng, SeedableRng};
use tokio::{sync::watch, task::JoinHandle};

use crate::archetype::Archetype;
use crate::auth;
use crate::error::ConfigError;
use crate::scheduler::{TaskScheduler, TaskTally};
use crate::session::{RunContext, Session};
use crate::users::Identity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunLength {
    For(Duration),
    /// Until Ctrl-C.
    Indefinite,
}

/// What a finished session hands back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub index: usize,
    pub archetype: String,
    pub user_id: String,
    pub authenticated: bool,
    pub tally: TaskTally,
}

/// Splits `total` across `weights` proportionally, largest remainder first, so the
/// counts always add up to `total`. Ties go to the earlier entry. All-zero weights
/// give all-zero counts.
pub fn split_population(weights: &[u32], total: usize) -> Vec<usize> {
    let sum: u64 = weights.iter().map(|&w| u64::from(w)).sum();
    if sum == 0 {
        return vec![0; weights.len()];
    }

    let total = total as u64;
    let mut counts: Vec<usize> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(u64, usize)> = Vec::with_capacity(weights.len());

    for (i, &w) in weights.iter().enumerate() {
        let quota = total * u64::from(w);
        counts.push((quota / sum) as usize);
        remainders.push((quota % sum, i));
    }

    let assigned: usize = counts.iter().sum();
    let leftover = total as usize - assigned;

    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, i) in remainders.iter().take(leftover) {
        counts[i] += 1;
    }

    counts
}

/// Sessions that have been started and not yet joined.
pub struct Population {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<SessionReport>>,
}

impl Population {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Asks every session to finish after its current task.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Waits for every session to finish. Call [`Population::stop`] first unless the
    /// sessions are expected to end by themselves.
    pub async fn join(self) -> Vec<SessionReport> {
        let Population { stop, handles } = self;

        let results = join_all(handles).await;
        drop(stop);

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(report) => Some(report),
                Err(e) => {
                    error!("Session task failed: {}", e);
                    None
                }
            })
            .collect()
    }
}

pub struct PopulationManager {
    ctx: Arc<RunContext>,
    seed: Option<u64>,
}

impl PopulationManager {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx, seed: None }
    }

    /// Derives every session's randomness from `seed`, making task choice and room
    /// choice reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Spawns `total` sessions split across `archetypes` by population weight.
    pub fn start(&self, archetypes: &[Archetype], total: usize) -> Result<Population, ConfigError> {
        let weights: Vec<u32> = archetypes.iter().map(|a| a.population_weight).collect();
        let counts = split_population(&weights, total);
        if total > 0 && counts.iter().all(|&c| c == 0) {
            return Err(ConfigError::InvalidArgument(
                "archetype population weights are all zero".to_string(),
            ));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(total);
        let mut index = 0;

        for (archetype, &count) in archetypes.iter().zip(&counts) {
            if count == 0 {
                continue;
            }

            info!("Starting {} {} sessions", count, archetype.name);
            let scheduler = Arc::new(TaskScheduler::new(Arc::new(archetype.clone()))?);

            for _ in 0..count {
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
                    None => StdRng::from_entropy(),
                };

                let Some(identity) = self.ctx.users.pick_random(&mut rng).cloned() else {
                    return Err(ConfigError::InvalidArgument("user pool is empty".to_string()));
                };

                handles.push(tokio::spawn(run_session(
                    index,
                    identity,
                    Arc::clone(&self.ctx),
                    Arc::clone(&scheduler),
                    rng,
                    stop_rx.clone(),
                )));
                index += 1;
            }
        }

        Ok(Population {
            stop: stop_tx,
            handles,
        })
    }

    /// Runs the population for `length`, or until Ctrl-C, then lets every session
    /// finish its current task.
    pub async fn run(
        &self,
        archetypes: &[Archetype],
        total: usize,
        length: RunLength,
    ) -> Result<Vec<SessionReport>, ConfigError> {
        let population = self.start(archetypes, total)?;
        info!("{} sessions running", population.len());

        match length {
            RunLength::For(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => info!("Run duration elapsed"),
                    _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                }
            }
            RunLength::Indefinite => {
                until_interrupted(tokio::signal::ctrl_c()).await;
                info!("Interrupted");
            }
        }

        info!("Stopping sessions, waiting for in-flight requests");
        population.stop();

        Ok(population.join().await)
    }
}

/// Resolves once `signal` fires. A listener that cannot be installed never resolves,
/// so an indefinite run keeps going until the process is killed.
async fn until_interrupted<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Failed to listen for Ctrl-C, running until killed: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run_session(
    index: usize,
    identity: Identity,
    ctx: Arc<RunContext>,
    scheduler: Arc<TaskScheduler>,
    rng: StdRng,
    stop: watch::Receiver<bool>,
) -> SessionReport {
    let archetype = scheduler.archetype().name.clone();

    let mut session = Session::new(index, identity, ctx, rng);

    if let Err(e) = auth::authenticate(&mut session).await {
        warn!("Session {}: starting unauthenticated: {}", index, e);
    }

    let tally = scheduler.run(&mut session, stop).await;

    SessionReport {
        index,
        archetype,
        user_id: session.state.user_id.clone(),
        authenticated: session.is_authenticated(),
        tally,
    }
}

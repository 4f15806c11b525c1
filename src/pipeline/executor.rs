use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// Runs a set of independent tasks, returning once all of them finished.
///
/// The calculator fans recomputation out one task per competitor; tasks
/// borrow disjoint pieces of the engine, so the executor must not let any
/// of them outlive the call. How much actually runs in parallel is the
/// implementation's business.
pub trait TaskExecutor: Send + Sync {
    fn run_all<'scope>(&self, tasks: Vec<Box<dyn FnOnce() + Send + 'scope>>);
}

/// Fans tasks out over a dedicated rayon pool.
pub struct RayonExecutor {
    pool: ThreadPool,
}

impl RayonExecutor {
    /// Builds a pool sized by rayon's default heuristic, one worker per
    /// available core.
    pub fn try_new() -> Result<Self, ThreadPoolBuildError> {
        Self::with_threads(0)
    }

    /// Builds a pool with exactly `threads` workers; `0` falls back to the
    /// default sizing.
    pub fn with_threads(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|worker| format!("mark passing worker {worker}"))
            .build()?;
        Ok(RayonExecutor { pool })
    }
}

impl TaskExecutor for RayonExecutor {
    fn run_all<'scope>(&self, tasks: Vec<Box<dyn FnOnce() + Send + 'scope>>) {
        self.pool
            .install(|| tasks.into_par_iter().for_each(|task| task()));
    }
}

/// Runs every task on the calling thread, in order.
///
/// Deterministic scheduling for tests, and a sensible choice for races
/// with a handful of competitors where pool handoff costs more than it
/// saves.
#[derive(Debug, Default)]
pub struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn run_all<'scope>(&self, tasks: Vec<Box<dyn FnOnce() + Send + 'scope>>) {
        for task in tasks {
            task();
        }
    }
}

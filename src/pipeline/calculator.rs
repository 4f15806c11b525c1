use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::thread;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::chooser::CandidateChooser;
use crate::config::ChooserConfig;
use crate::costing::{ChooserContext, TransitionStrategy};
use crate::domain::{CompetitorId, MarkPassing};
use crate::pipeline::{CommandBatch, RaceCommand, TaskExecutor, UpdateListener};
use crate::race::{CandidateFinder, FinderError, RaceAdapter, RaceChangeListener};

/// Where the calculator is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The initial full pass over all competitors has not completed yet.
    Initializing,
    /// The consumer is processing commands as they arrive.
    Running,
    /// Commands are buffered but not processed until [`resume`].
    ///
    /// [`resume`]: MarkPassingCalculator::resume
    Suspended,
    /// The consumer exited. Terminal.
    Stopped,
}

/// Drives mark passing calculation for one race.
///
/// Construction seeds the engine with the passings the race already knows,
/// runs a full pass over every competitor and, when `listen` is set, starts
/// a consumer thread fed by the race's change notifications. From then on
/// the race receives updated passing sequences whenever new evidence changes
/// the cheapest explanation for some competitor.
///
/// ### Note
///
/// Dropping the calculator does *not* end the consumer thread; the race
/// holds the listener and keeps the queue alive. Call [`stop`] and, if the
/// exit matters, [`wait_until_stopped`].
///
/// [`stop`]: MarkPassingCalculator::stop
/// [`wait_until_stopped`]: MarkPassingCalculator::wait_until_stopped
pub struct MarkPassingCalculator<R, F, T>
where
    R: RaceAdapter + 'static,
    F: CandidateFinder + 'static,
    T: TransitionStrategy<R> + Send + Sync + 'static,
{
    shared: Shared<R, F, T>,
    listener: Arc<UpdateListener>,

    /// Keeps the queue's receiving end alive when no consumer thread was
    /// started, so enqueues stay harmless no-ops instead of send errors.
    /// Holding one is also the sign that [`stop`] has no exit to wait for.
    ///
    /// [`stop`]: MarkPassingCalculator::stop
    idle_receiver: Mutex<Option<Receiver<RaceCommand>>>,
}

impl<R, F, T> MarkPassingCalculator<R, F, T>
where
    R: RaceAdapter + 'static,
    F: CandidateFinder + 'static,
    T: TransitionStrategy<R> + Send + Sync + 'static,
{
    /// Builds the calculator and kicks off the initial full pass.
    ///
    /// With `listen` set the calculator subscribes to the race and consumes
    /// its notifications until stopped; without it, nothing is processed
    /// beyond the initial pass and explicit [`recalculate_everything`]
    /// calls. With `wait_for_initial_calculation` the initial pass runs on
    /// the calling thread and has published its results by the time `new`
    /// returns; otherwise it runs on a background thread.
    ///
    /// [`recalculate_everything`]: MarkPassingCalculator::recalculate_everything
    pub fn new(
        race: Arc<R>,
        finder: Arc<F>,
        strategy: T,
        config: ChooserConfig,
        executor: impl TaskExecutor + 'static,
        listen: bool,
        wait_for_initial_calculation: bool,
    ) -> Self {
        let strategy = Arc::new(strategy);
        let engine = seeded_engine(&*race, &*strategy, &config);

        let (queue, receiver) = mpsc::channel();
        let listener = Arc::new(UpdateListener::new(queue));
        if listen {
            race.subscribe(Arc::clone(&listener) as Arc<dyn RaceChangeListener>);
        }

        let shared = Shared {
            race,
            finder,
            strategy,
            config,
            executor: Arc::new(executor),
            engine: Arc::new(RwLock::new(engine)),
            suspended: Arc::new(AtomicBool::new(false)),
            lifecycle: Arc::new(Lifecycle::new()),
        };

        let (consumer_rx, idle_rx) = if listen {
            (Some(receiver), None)
        } else {
            (None, Some(receiver))
        };

        let initial = {
            let shared = shared.clone();
            move || {
                shared.initial_pass();
                // A suspension issued while the pass ran stays in force.
                if !shared.suspended.load(Ordering::SeqCst) {
                    shared.lifecycle.set(LifecycleState::Running);
                }
                if let Some(receiver) = consumer_rx {
                    let consumer = shared.clone();
                    let name = format!("mark passings for race {}", consumer.race.name());
                    let spawned =
                        thread::Builder::new().name(name).spawn(move || consumer.drain(receiver));
                    if let Err(err) = spawned {
                        error!("could not start the mark passing consumer: {err}");
                    }
                }
            }
        };

        if wait_for_initial_calculation {
            initial();
        } else {
            let name = format!(
                "mark passings for race {} initialization",
                shared.race.name()
            );
            let spawned = thread::Builder::new().name(name).spawn(initial);
            if let Err(err) = spawned {
                error!("could not start the initialization thread: {err}");
            }
        }

        MarkPassingCalculator {
            shared,
            listener,
            idle_receiver: Mutex::new(idle_rx),
        }
    }

    /// The command queue's producing end, for manual overrides and for
    /// feeding races that cannot [`subscribe`](RaceAdapter::subscribe).
    pub fn listener(&self) -> Arc<UpdateListener> {
        Arc::clone(&self.listener)
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.get()
    }

    /// Stops processing without losing anything; commands keep buffering.
    pub fn suspend(&self) {
        info!("suspending mark passing calculation for race {}", self.shared.race.name());
        self.shared.suspended.store(true, Ordering::SeqCst);
        self.shared.lifecycle.set(LifecycleState::Suspended);
    }

    /// Resumes processing, starting with everything buffered while
    /// suspended.
    pub fn resume(&self) {
        info!("resuming mark passing calculation for race {}", self.shared.race.name());
        self.shared.suspended.store(false, Ordering::SeqCst);
        self.shared.lifecycle.set(LifecycleState::Running);
        self.listener.flush();
    }

    /// Asks the consumer to exit. Returns immediately; the consumer stops
    /// once it reaches the end marker in the queue. Without a consumer
    /// thread there is nothing to drain and the calculator stops on the
    /// spot.
    pub fn stop(&self) {
        info!("stopping mark passing calculation for race {}", self.shared.race.name());
        self.listener.stop();
        let no_consumer = self
            .idle_receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if no_consumer {
            self.shared.lifecycle.set(LifecycleState::Stopped);
        }
    }

    /// Blocks until the consumer has exited, or `timeout` passed. Returns
    /// whether it actually stopped.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        self.shared.lifecycle.wait_until_stopped(timeout)
    }

    /// Read access to the engine between processing rounds.
    ///
    /// The consumer takes the write side for each batch, so the guard never
    /// observes a half-applied batch; holding it stalls the consumer.
    pub fn lock_for_read(&self) -> RwLockReadGuard<'_, CandidateChooser> {
        self.shared
            .engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The currently published sequence of every competitor.
    pub fn all_passes(&self) -> FxHashMap<CompetitorId, Vec<MarkPassing>> {
        self.lock_for_read().all_passes()
    }

    /// Throws the engine away and rebuilds it from the race's current state
    /// and the finder's full candidate sets.
    ///
    /// The heavy hammer for when the incremental picture is suspect, e.g.
    /// after track data was reloaded wholesale.
    pub fn recalculate_everything(&self) {
        let shared = &self.shared;
        info!("recalculating all mark passings for race {}", shared.race.name());
        let fresh = seeded_engine(&*shared.race, &*shared.strategy, &shared.config);
        let ctx = shared.context();
        let mut engine = shared.engine.write().unwrap_or_else(PoisonError::into_inner);
        *engine = fresh;
        shared.replay_all(&mut engine, ctx);
    }
}

/// State shared between the constructor, the consumer thread and the public
/// surface.
struct Shared<R, F, T> {
    race: Arc<R>,
    finder: Arc<F>,
    strategy: Arc<T>,
    config: ChooserConfig,
    executor: Arc<dyn TaskExecutor>,
    engine: Arc<RwLock<CandidateChooser>>,
    suspended: Arc<AtomicBool>,
    lifecycle: Arc<Lifecycle>,
}

impl<R, F, T> Clone for Shared<R, F, T> {
    fn clone(&self) -> Self {
        Shared {
            race: Arc::clone(&self.race),
            finder: Arc::clone(&self.finder),
            strategy: Arc::clone(&self.strategy),
            config: self.config,
            executor: Arc::clone(&self.executor),
            engine: Arc::clone(&self.engine),
            suspended: Arc::clone(&self.suspended),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<R, F, T> Shared<R, F, T>
where
    R: RaceAdapter + 'static,
    F: CandidateFinder + 'static,
    T: TransitionStrategy<R> + Send + Sync + 'static,
{
    fn context(&self) -> ChooserContext<'_, R, T> {
        ChooserContext::snapshot(&*self.race, &*self.strategy, &self.config)
    }

    /// Full candidate discovery for every competitor, published as it lands.
    fn replay_all(&self, engine: &mut CandidateChooser, ctx: ChooserContext<'_, R, T>) {
        for competitor in self.race.competitors() {
            match self.finder.all_candidates(competitor) {
                Ok(delta) => {
                    if let Some(passings) = engine.apply_delta(ctx, competitor, delta) {
                        self.race.update_mark_passings(competitor, &passings);
                    }
                }
                Err(err) => {
                    error!("candidate discovery failed for {competitor}: {err}");
                }
            }
        }
    }

    fn initial_pass(&self) {
        info!("initial mark passing pass for race {}", self.race.name());
        let ctx = self.context();
        let mut engine = self.engine.write().unwrap_or_else(PoisonError::into_inner);
        self.replay_all(&mut engine, ctx);
    }

    /// The consumer loop. Blocks for the first command, drains whatever
    /// else is already queued into one batch, processes, repeats. Exits on
    /// the end marker or when every sender is gone.
    fn drain(self, receiver: Receiver<RaceCommand>) {
        info!("mark passing consumer for race {} running", self.race.name());
        let mut batch = CommandBatch::default();
        'consume: loop {
            let Ok(first) = receiver.recv() else {
                break 'consume;
            };
            if first.is_end_marker() {
                break 'consume;
            }
            first.apply(&mut batch);
            for command in receiver.try_iter() {
                if command.is_end_marker() {
                    break 'consume;
                }
                command.apply(&mut batch);
            }
            if self.suspended.load(Ordering::SeqCst) {
                debug!("suspended, holding {} competitor fix buffers", batch.competitor_fixes.len());
                continue;
            }
            self.process(&mut batch);
        }
        self.lifecycle.set(LifecycleState::Stopped);
        info!("mark passing consumer for race {} stopped", self.race.name());
    }

    /// Applies one batch to the engine and publishes what changed.
    ///
    /// Order matters and mirrors how stale each input can be: the start
    /// time is refreshed first because start edges depend on it, then the
    /// course topology, then manual overrides, then the fix fan-out that
    /// does the bulk of the work. The engine write lock is held for the
    /// whole round and the course lock is only ever taken inside it.
    ///
    /// On a finder error the batch is left intact and the round aborted;
    /// the already-applied stages are idempotent, so the retry that comes
    /// with the next command redoes them harmlessly.
    fn process(&self, batch: &mut CommandBatch) {
        let mut engine = self.engine.write().unwrap_or_else(PoisonError::into_inner);
        let mut ctx = self.context();

        for (competitor, passings) in engine.refresh_start_time(ctx) {
            self.race.update_mark_passings(competitor, &passings);
        }

        if batch.has_topology_change() {
            let applied = self.race.with_course(|course| {
                let deltas = self.finder.update_waypoints(
                    course,
                    &batch.added_waypoints,
                    &batch.removed_waypoints,
                    batch.smallest_changed_index.unwrap_or(0),
                )?;
                // The same snapshot must drive the anchors and the deltas,
                // or a concurrent course edit could leave them disagreeing
                // about the waypoint count.
                let fresh = ChooserContext {
                    waypoint_count: course.waypoint_count(),
                    ..ctx
                };
                engine.remove_waypoints(&batch.removed_waypoints);
                for (competitor, passings) in
                    engine.update_waypoint_count(fresh, course.waypoint_count())
                {
                    self.race.update_mark_passings(competitor, &passings);
                }
                for (competitor, delta) in deltas {
                    if let Some(passings) = engine.apply_delta(fresh, competitor, delta) {
                        self.race.update_mark_passings(competitor, &passings);
                    }
                }
                Ok::<_, FinderError>(fresh)
            });
            match applied {
                Ok(fresh) => ctx = fresh,
                Err(err) => {
                    error!("course change handling failed, keeping the batch for retry: {err}");
                    return;
                }
            }
        }

        for &(competitor, zero_based_index) in &batch.suppressed {
            if let Some(passings) = engine.suppress_passings(competitor, zero_based_index + 1) {
                self.race.update_mark_passings(competitor, &passings);
            }
        }
        for &competitor in &batch.unsuppressed {
            if let Some(passings) = engine.stop_suppressing(competitor) {
                self.race.update_mark_passings(competitor, &passings);
            }
        }
        for &(competitor, zero_based_index) in &batch.unfixed {
            if let Some(passings) = engine.remove_fixed_passing(competitor, zero_based_index + 1) {
                self.race.update_mark_passings(competitor, &passings);
            }
        }
        for &(competitor, zero_based_index, time) in &batch.fixed {
            let waypoint = self
                .race
                .with_course(|course| course.waypoint_at(zero_based_index + 1));
            let Some(waypoint) = waypoint else {
                warn!("cannot fix a passing at course position {zero_based_index}, no such waypoint");
                continue;
            };
            let passing = MarkPassing::new(competitor, waypoint, time);
            if let Some(passings) =
                engine.set_fixed_passing(competitor, zero_based_index + 1, passing)
            {
                self.race.update_mark_passings(competitor, &passings);
            }
        }

        if !batch.mark_fixes.is_empty() {
            match self.finder.fixes_affected_by_mark_fixes(&batch.mark_fixes) {
                Ok(affected) => {
                    for (competitor, fixes) in affected {
                        let buffered = batch.competitor_fixes.entry(competitor).or_default();
                        // A fix can sit in the batch as a fresh report and
                        // be re-scored under a moved mark; discovery sees
                        // it once.
                        for fix in fixes {
                            if !buffered.contains(&fix) {
                                buffered.push(fix);
                            }
                        }
                    }
                }
                Err(err) => {
                    error!("mark fix handling failed, keeping the batch for retry: {err}");
                    return;
                }
            }
        }

        let mut fixes = std::mem::take(&mut batch.competitor_fixes);
        let race = &*self.race;
        let finder = &*self.finder;
        let mut tasks: Vec<Box<dyn FnOnce() + Send + '_>> = Vec::new();
        for lane in engine.lanes_mut() {
            let Some(fixes) = fixes.remove(&lane.competitor()) else {
                continue;
            };
            tasks.push(Box::new(move || {
                match finder.candidate_deltas(lane.competitor(), &fixes) {
                    Ok(delta) => {
                        if let Some(passings) = lane.apply(ctx, delta) {
                            race.update_mark_passings(lane.competitor(), &passings);
                        }
                    }
                    Err(err) => {
                        error!("candidate discovery failed for {}: {err}", lane.competitor());
                    }
                }
            }));
        }
        if !tasks.is_empty() {
            self.executor.run_all(tasks);
        }

        batch.clear();
    }
}

/// A fresh engine pre-loaded with the passings the race already knows, so
/// the first resolution only announces actual differences.
fn seeded_engine<R, T>(race: &R, strategy: &T, config: &ChooserConfig) -> CandidateChooser
where
    R: RaceAdapter,
    T: TransitionStrategy<R>,
{
    let ctx = ChooserContext::snapshot(race, strategy, config);
    let competitors = race.competitors();
    let mut engine = CandidateChooser::new(ctx, &competitors);
    race.with_course(|course| {
        for &competitor in &competitors {
            for passing in race.known_mark_passings(competitor) {
                if let Some(at) = course.index_of(passing.waypoint) {
                    engine.seed_passing(competitor, at, passing);
                }
            }
        }
    });
    engine
}

/// The state machine behind [`LifecycleState`], shared across threads.
struct Lifecycle {
    state: Mutex<LifecycleState>,
    changed: Condvar,
}

impl Lifecycle {
    fn new() -> Self {
        Lifecycle {
            state: Mutex::new(LifecycleState::Initializing),
            changed: Condvar::new(),
        }
    }

    fn get(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stopped is terminal; anything set after it is ignored.
    fn set(&self, next: LifecycleState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == LifecycleState::Stopped {
            return;
        }
        *state = next;
        self.changed.notify_all();
    }

    fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |state| *state != LifecycleState::Stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *state == LifecycleState::Stopped
    }
}

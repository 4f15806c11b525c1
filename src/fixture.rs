//! Scripted stand-ins for the race infrastructure, shared by the test
//! modules.

use chrono::{DateTime, TimeZone, Utc};
use geo::Point;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crate::chooser::CandidateDelta;
use crate::costing::{EstimateError, TransitionContext, TransitionStrategy};
use crate::domain::{CompetitorId, GpsFix, MarkId, MarkPassing, WaypointId};
use crate::race::{
    CandidateFinder, CourseView, FinderError, RaceAdapter, RaceChangeListener,
};

/// Seconds after an arbitrary fixed epoch, so tests can talk about times as
/// small numbers.
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).single().unwrap()
}

pub fn fix(seconds: i64) -> GpsFix {
    GpsFix::new(Point::new(0.0, 0.0), at(seconds))
}

/// Polls `check` until it holds or `timeout_ms` passed. For asserting on
/// work that happens on the calculator's own threads.
pub fn wait_until(timeout_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

/// An in-memory race: a straight-line world where every competitor sails at
/// a constant speed and leg minimums are whatever the test says they are.
pub struct FixtureRace {
    pub name: String,
    pub competitors: Vec<CompetitorId>,
    course: RwLock<Vec<WaypointId>>,
    start: RwLock<Option<DateTime<Utc>>>,
    gate_start: AtomicBool,

    /// Distance sailed is `elapsed seconds * speed`; with legs scripted to
    /// match, a hop's ratio lands exactly where a test wants it.
    pub speed_mps: f64,
    leg_distances: RwLock<FxHashMap<u32, f64>>,
    last_leg_query: Mutex<Option<(u32, DateTime<Utc>)>>,
    track_missing: AtomicBool,

    seeded: Mutex<FxHashMap<CompetitorId, Vec<MarkPassing>>>,
    published: Mutex<FxHashMap<CompetitorId, Vec<MarkPassing>>>,
    publish_count: AtomicUsize,
    listeners: Mutex<Vec<Arc<dyn RaceChangeListener>>>,
}

impl FixtureRace {
    /// `competitor_count` competitors on a course of `waypoint_count`
    /// waypoints, every leg 1000 m, sailing 5 m/s, start unset.
    pub fn new(competitor_count: u64, waypoint_count: u64) -> Self {
        let mut leg_distances = FxHashMap::default();
        for onto in 1..=waypoint_count as u32 {
            leg_distances.insert(onto, 1000.0);
        }
        FixtureRace {
            name: "fixture".into(),
            competitors: (1..=competitor_count).map(CompetitorId::new).collect(),
            course: RwLock::new((1..=waypoint_count).map(WaypointId::new).collect()),
            start: RwLock::new(None),
            gate_start: AtomicBool::new(false),
            speed_mps: 5.0,
            leg_distances: RwLock::new(leg_distances),
            last_leg_query: Mutex::new(None),
            track_missing: AtomicBool::new(false),
            seeded: Mutex::new(FxHashMap::default()),
            published: Mutex::new(FxHashMap::default()),
            publish_count: AtomicUsize::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn set_start(&self, time: Option<DateTime<Utc>>) {
        *self.start.write().unwrap() = time;
    }

    pub fn set_gate_start(&self, gate: bool) {
        self.gate_start.store(gate, Ordering::SeqCst);
    }

    pub fn set_leg_distance(&self, onto_one_based: u32, meters: Option<f64>) {
        let mut legs = self.leg_distances.write().unwrap();
        match meters {
            Some(meters) => legs.insert(onto_one_based, meters),
            None => legs.remove(&onto_one_based),
        };
    }

    pub fn set_track_missing(&self, missing: bool) {
        self.track_missing.store(missing, Ordering::SeqCst);
    }

    /// The leg index and evaluation instant of the most recent
    /// `minimum_leg_distance` call.
    pub fn last_leg_query(&self) -> Option<(u32, DateTime<Utc>)> {
        *self.last_leg_query.lock().unwrap()
    }

    pub fn seed_passing(&self, passing: MarkPassing) {
        self.seeded
            .lock()
            .unwrap()
            .entry(passing.competitor)
            .or_default()
            .push(passing);
    }

    pub fn published_for(&self, competitor: CompetitorId) -> Vec<MarkPassing> {
        self.published
            .lock()
            .unwrap()
            .get(&competitor)
            .cloned()
            .unwrap_or_default()
    }

    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::SeqCst)
    }

    /// Feeds a competitor fix through the subscribed listeners, like a
    /// tracking receiver would.
    pub fn push_fix(&self, competitor: CompetitorId, fix: GpsFix) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener.competitor_position_changed(competitor, fix);
        }
    }

    pub fn push_mark_fix(&self, mark: MarkId, fix: GpsFix) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener.mark_position_changed(mark, fix);
        }
    }

    pub fn add_waypoint(&self, waypoint: WaypointId, zero_based_index: u32) {
        self.course
            .write()
            .unwrap()
            .insert(zero_based_index as usize, waypoint);
        for listener in self.listeners.lock().unwrap().iter() {
            listener.waypoint_added(waypoint, zero_based_index);
        }
    }

    pub fn remove_waypoint(&self, zero_based_index: u32) {
        let waypoint = self.course.write().unwrap().remove(zero_based_index as usize);
        for listener in self.listeners.lock().unwrap().iter() {
            listener.waypoint_removed(waypoint, zero_based_index);
        }
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.lock().unwrap().is_empty()
    }
}

struct CourseSnapshot<'a>(&'a [WaypointId]);

impl CourseView for CourseSnapshot<'_> {
    fn waypoint_count(&self) -> u32 {
        self.0.len() as u32
    }

    fn waypoint_at(&self, one_based_index: u32) -> Option<WaypointId> {
        match one_based_index {
            0 => None,
            at => self.0.get(at as usize - 1).copied(),
        }
    }

    fn index_of(&self, waypoint: WaypointId) -> Option<u32> {
        self.0
            .iter()
            .position(|&laid| laid == waypoint)
            .map(|zero_based| zero_based as u32 + 1)
    }
}

impl RaceAdapter for FixtureRace {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn with_course<T>(&self, f: impl FnOnce(&dyn CourseView) -> T) -> T {
        let course = self.course.read().unwrap();
        f(&CourseSnapshot(&course))
    }

    fn start_of_race(&self) -> Option<DateTime<Utc>> {
        *self.start.read().unwrap()
    }

    fn is_gate_start(&self) -> bool {
        self.gate_start.load(Ordering::SeqCst)
    }

    fn competitors(&self) -> Vec<CompetitorId> {
        self.competitors.clone()
    }

    fn known_mark_passings(&self, competitor: CompetitorId) -> Vec<MarkPassing> {
        self.seeded
            .lock()
            .unwrap()
            .get(&competitor)
            .cloned()
            .unwrap_or_default()
    }

    fn distance_traveled(
        &self,
        _competitor: CompetitorId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<f64> {
        if self.track_missing.load(Ordering::SeqCst) {
            return None;
        }
        let seconds = (to - from).num_milliseconds() as f64 / 1000.0;
        Some(seconds * self.speed_mps)
    }

    fn minimum_leg_distance(&self, one_based_index: u32, at: DateTime<Utc>) -> Option<f64> {
        *self.last_leg_query.lock().unwrap() = Some((one_based_index, at));
        self.leg_distances
            .read()
            .unwrap()
            .get(&one_based_index)
            .copied()
    }

    fn update_mark_passings(&self, competitor: CompetitorId, passings: &[MarkPassing]) {
        self.published
            .lock()
            .unwrap()
            .insert(competitor, passings.to_vec());
        self.publish_count.fetch_add(1, Ordering::SeqCst);
    }

    fn subscribe(&self, listener: Arc<dyn RaceChangeListener>) {
        self.listeners.lock().unwrap().push(listener);
    }
}

/// A strategy that judges every hop the same, taking distances out of the
/// picture so tests can reason purely over candidate weights.
pub struct UniformPlausibility(pub f64);

impl<R: RaceAdapter> TransitionStrategy<R> for UniformPlausibility {
    fn plausibility(&self, _ctx: TransitionContext<'_, R>) -> Result<f64, EstimateError> {
        Ok(self.0)
    }
}

/// A finder that replays scripted answers instead of doing geometry.
#[derive(Default)]
pub struct ScriptedFinder {
    deltas: Mutex<FxHashMap<CompetitorId, VecDeque<CandidateDelta>>>,
    all: Mutex<FxHashMap<CompetitorId, CandidateDelta>>,
    topology: Mutex<VecDeque<Result<FxHashMap<CompetitorId, CandidateDelta>, String>>>,
    affected: Mutex<FxHashMap<CompetitorId, Vec<GpsFix>>>,

    delta_calls: AtomicUsize,
    topology_calls: AtomicUsize,

    /// Fixes actually handed to `candidate_deltas`, for asserting that mark
    /// fixes fan out into the right competitor buffers.
    pub seen_fixes: Mutex<FxHashMap<CompetitorId, Vec<GpsFix>>>,
}

impl ScriptedFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the answer for the next `candidate_deltas` call of
    /// `competitor`.
    pub fn script_delta(&self, competitor: CompetitorId, delta: CandidateDelta) {
        self.deltas
            .lock()
            .unwrap()
            .entry(competitor)
            .or_default()
            .push_back(delta);
    }

    /// Sets the full candidate set `all_candidates` reports for
    /// `competitor`.
    pub fn script_all(&self, competitor: CompetitorId, delta: CandidateDelta) {
        self.all.lock().unwrap().insert(competitor, delta);
    }

    /// Queues the answer for the next `update_waypoints` call.
    pub fn script_topology(&self, deltas: FxHashMap<CompetitorId, CandidateDelta>) {
        self.topology.lock().unwrap().push_back(Ok(deltas));
    }

    /// Makes the next `update_waypoints` call fail.
    pub fn script_topology_failure(&self) {
        self.topology
            .lock()
            .unwrap()
            .push_back(Err("scripted failure".into()));
    }

    /// Fixes reported back for the next batch of mark fixes.
    pub fn script_affected(&self, competitor: CompetitorId, fixes: Vec<GpsFix>) {
        self.affected
            .lock()
            .unwrap()
            .entry(competitor)
            .or_default()
            .extend(fixes);
    }

    pub fn delta_calls(&self) -> usize {
        self.delta_calls.load(Ordering::SeqCst)
    }

    pub fn topology_calls(&self) -> usize {
        self.topology_calls.load(Ordering::SeqCst)
    }
}

impl CandidateFinder for ScriptedFinder {
    fn fixes_affected_by_mark_fixes(
        &self,
        _mark_fixes: &[(MarkId, GpsFix)],
    ) -> Result<FxHashMap<CompetitorId, Vec<GpsFix>>, FinderError> {
        Ok(std::mem::take(&mut *self.affected.lock().unwrap()))
    }

    fn candidate_deltas(
        &self,
        competitor: CompetitorId,
        fixes: &[GpsFix],
    ) -> Result<CandidateDelta, FinderError> {
        self.delta_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_fixes
            .lock()
            .unwrap()
            .entry(competitor)
            .or_default()
            .extend_from_slice(fixes);
        let delta = self
            .deltas
            .lock()
            .unwrap()
            .get_mut(&competitor)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        Ok(delta)
    }

    fn all_candidates(&self, competitor: CompetitorId) -> Result<CandidateDelta, FinderError> {
        Ok(self
            .all
            .lock()
            .unwrap()
            .get(&competitor)
            .cloned()
            .unwrap_or_default())
    }

    fn update_waypoints(
        &self,
        _course: &dyn CourseView,
        _added: &[WaypointId],
        _removed: &[WaypointId],
        _smallest_changed_zero_based: u32,
    ) -> Result<FxHashMap<CompetitorId, CandidateDelta>, FinderError> {
        self.topology_calls.fetch_add(1, Ordering::SeqCst);
        match self.topology.lock().unwrap().pop_front() {
            Some(Ok(deltas)) => Ok(deltas),
            Some(Err(reason)) => Err(FinderError::Source(reason)),
            None => Ok(FxHashMap::default()),
        }
    }
}

use chrono::{DateTime, Utc};
use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::chooser::{CandidateDelta, CompetitorLane};
use crate::costing::{ChooserContext, TransitionStrategy};
use crate::domain::{CompetitorId, MarkPassing, WaypointId};
use crate::race::RaceAdapter;

/// One candidate graph per competitor, plus the shared course framing.
///
/// The chooser does not talk to the race by itself; every mutation returns
/// the re-resolved passing sequences that changed, and the caller decides
/// where they go. This keeps the whole structure synchronous and lets the
/// pipeline hold it behind a single `RwLock`.
///
/// All indices at this boundary are one-based course positions; index `0`
/// and `waypoint_count + 1` belong to the anchors.
pub struct CandidateChooser {
    lanes: Vec<CompetitorLane>,
    index: FxHashMap<CompetitorId, usize>,

    /// Anchor framing the lanes were last built against. Compared against a
    /// fresh snapshot to detect starts being announced, moved or withdrawn
    /// and courses being re-laid.
    start_anchor_time: Option<DateTime<Utc>>,
    end_index: u32,
}

impl CandidateChooser {
    /// Builds an empty lane for every competitor. Until deltas arrive each
    /// lane resolves to the bare anchor-to-anchor path, i.e. no passings.
    pub fn new<R, T>(ctx: ChooserContext<'_, R, T>, competitors: &[CompetitorId]) -> Self
    where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        let end_index = ctx.waypoint_count + 1;
        let mut lanes = Vec::with_capacity(competitors.len());
        let mut index = FxHashMap::default();
        for &competitor in competitors {
            index.insert(competitor, lanes.len());
            lanes.push(CompetitorLane::new(ctx, competitor, end_index));
        }
        info!(
            "tracking {} competitors over {} waypoints",
            lanes.len(),
            ctx.waypoint_count
        );
        CandidateChooser {
            lanes,
            index,
            start_anchor_time: ctx.start_anchor_time(),
            end_index,
        }
    }

    /// Pre-loads a passing the race already knows, so resolving to the same
    /// sequence later is a no-op instead of a re-announcement.
    pub fn seed_passing(
        &mut self,
        competitor: CompetitorId,
        one_based_index: u32,
        passing: MarkPassing,
    ) {
        if let Some(lane) = self.lane_mut(competitor) {
            lane.seed(one_based_index, passing);
        }
    }

    /// Applies one competitor's candidate delta and re-resolves that lane.
    pub fn apply_delta<R, T>(
        &mut self,
        ctx: ChooserContext<'_, R, T>,
        competitor: CompetitorId,
        delta: CandidateDelta,
    ) -> Option<Vec<MarkPassing>>
    where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        self.lane_mut(competitor)?.apply(ctx, delta)
    }

    /// Re-anchors every lane when the official start changed since the last
    /// look. Start edges carry the start-timing weight, so they are all
    /// stale the moment the gun moves.
    pub fn refresh_start_time<R, T>(
        &mut self,
        ctx: ChooserContext<'_, R, T>,
    ) -> Vec<(CompetitorId, Vec<MarkPassing>)>
    where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        let time = ctx.start_anchor_time();
        if time == self.start_anchor_time {
            return Vec::new();
        }
        debug!(
            "start of race moved from {:?} to {:?}, re-anchoring all lanes",
            self.start_anchor_time, time
        );
        self.start_anchor_time = time;
        let mut changed = Vec::new();
        for lane in &mut self.lanes {
            lane.rebuild_start_anchor(ctx, time);
            if let Some(passings) = lane.resolve() {
                changed.push((lane.competitor(), passings));
            }
        }
        changed
    }

    /// Moves the end anchor to `waypoint_count + 1` on every lane after the
    /// course gained or lost waypoints.
    ///
    /// ### Note
    ///
    /// Must run *before* the topology deltas are applied and inside the same
    /// course lock span that produced them: freshly discovered candidates may
    /// sit at indices beyond the old anchor, and the anchor index must agree
    /// with the course the finder saw.
    pub fn update_waypoint_count<R, T>(
        &mut self,
        ctx: ChooserContext<'_, R, T>,
        waypoint_count: u32,
    ) -> Vec<(CompetitorId, Vec<MarkPassing>)>
    where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        let end_index = waypoint_count + 1;
        if end_index == self.end_index {
            return Vec::new();
        }
        debug!(
            "course now has {waypoint_count} waypoints, moving end anchors {} -> {end_index}",
            self.end_index
        );
        self.end_index = end_index;
        let mut changed = Vec::new();
        for lane in &mut self.lanes {
            lane.rebuild_end_anchor(ctx, end_index);
            if let Some(passings) = lane.resolve() {
                changed.push((lane.competitor(), passings));
            }
        }
        changed
    }

    /// Forgets published passings of waypoints that left the course, without
    /// re-resolving: the topology deltas that accompany a course change do
    /// that, and they must not see the removed entries as published state.
    pub fn remove_waypoints(&mut self, removed: &[WaypointId]) {
        if removed.is_empty() {
            return;
        }
        for lane in &mut self.lanes {
            lane.purge_waypoints(removed);
        }
    }

    /// Overrides the computed passing at a course position. The override
    /// sticks across re-resolutions until removed.
    pub fn set_fixed_passing(
        &mut self,
        competitor: CompetitorId,
        one_based_index: u32,
        passing: MarkPassing,
    ) -> Option<Vec<MarkPassing>> {
        self.lane_mut(competitor)?.pin(one_based_index, passing)
    }

    /// Drops a manual override, falling back to the computed passing.
    pub fn remove_fixed_passing(
        &mut self,
        competitor: CompetitorId,
        one_based_index: u32,
    ) -> Option<Vec<MarkPassing>> {
        self.lane_mut(competitor)?.unpin(one_based_index)
    }

    /// Withholds all passings at or after a course position, overruling even
    /// fixed passings there.
    pub fn suppress_passings(
        &mut self,
        competitor: CompetitorId,
        one_based_index: u32,
    ) -> Option<Vec<MarkPassing>> {
        self.lane_mut(competitor)?.suppress_from(one_based_index)
    }

    pub fn stop_suppressing(&mut self, competitor: CompetitorId) -> Option<Vec<MarkPassing>> {
        self.lane_mut(competitor)?.unsuppress()
    }

    /// The currently published sequence of every competitor.
    pub fn all_passes(&self) -> FxHashMap<CompetitorId, Vec<MarkPassing>> {
        self.lanes
            .iter()
            .map(|lane| (lane.competitor(), lane.passings()))
            .collect()
    }

    pub fn lane(&self, competitor: CompetitorId) -> Option<&CompetitorLane> {
        self.index.get(&competitor).map(|&at| &self.lanes[at])
    }

    pub fn lane_mut(&mut self, competitor: CompetitorId) -> Option<&mut CompetitorLane> {
        self.index
            .get(&competitor)
            .map(|&at| &mut self.lanes[at])
    }

    /// Exclusive access to every lane at once, for fanning competitors out
    /// across worker tasks with disjoint borrows.
    pub fn lanes_mut(&mut self) -> impl Iterator<Item = &mut CompetitorLane> {
        self.lanes.iter_mut()
    }
}

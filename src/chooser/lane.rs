use chrono::{DateTime, Utc};
use log::{debug, trace};
use petgraph::graph::NodeIndex;
use petgraph::prelude::EdgeRef;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::IntoEdgeReferences;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::chooser::{Candidate, CandidateDelta, CandidateKey, CandidateKind, PassingEdge};
use crate::costing::{ChooserContext, TransitionStrategy, start_timing_plausibility};
use crate::domain::{CompetitorId, MarkPassing, WaypointId};
use crate::race::RaceAdapter;

/// The candidate graph of a single competitor.
///
/// Lanes are owned by the [`CandidateChooser`](crate::chooser::CandidateChooser)
/// arena and handed out one per worker task, so nothing in here locks: a lane
/// is only ever touched by one thread at a time.
///
/// The graph always contains the two anchors and is always solvable; the
/// direct anchor-to-anchor edge explains a competitor with no evidence at
/// all, so resolving such a lane yields an empty passing sequence rather
/// than a failure.
///
/// ```text
///                observed candidates
///
///                +--[1]---[2]--+
///               /       \       \
///     START >--+---[1]---+--[3]--+--> END
///               \_______________/
///                  skip fallback
/// ```
pub struct CompetitorLane {
    competitor: CompetitorId,

    graph: StableDiGraph<Candidate, PassingEdge>,

    /// Value identity to node handle. Deltas address hypotheses by key, the
    /// graph by index; this keeps the two in sync.
    nodes: BTreeMap<CandidateKey, NodeIndex>,

    start: NodeIndex,
    end: NodeIndex,

    /// What the race was last told, by one-based waypoint index.
    published: BTreeMap<u32, MarkPassing>,

    /// Manually pinned passings, overlaid after every search.
    fixed: BTreeMap<u32, MarkPassing>,

    /// Passings at or after this one-based index are withheld.
    suppressed_from: Option<u32>,
}

impl CompetitorLane {
    pub(crate) fn new<R, T>(
        ctx: ChooserContext<'_, R, T>,
        competitor: CompetitorId,
        end_index: u32,
    ) -> Self
    where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        let mut lane = CompetitorLane {
            competitor,
            graph: StableDiGraph::default(),
            nodes: BTreeMap::new(),
            start: NodeIndex::end(),
            end: NodeIndex::end(),
            published: BTreeMap::new(),
            fixed: BTreeMap::new(),
            suppressed_from: None,
        };

        let start = Candidate::start_anchor(ctx.start_anchor_time());
        lane.start = lane.graph.add_node(start);
        lane.nodes.insert(start.key(), lane.start);

        let end = Candidate::end_anchor(end_index);
        lane.end = lane.graph.add_node(end);
        lane.nodes.insert(end.key(), lane.end);
        lane.link(ctx, lane.end);

        lane
    }

    #[inline]
    pub fn competitor(&self) -> CompetitorId {
        self.competitor
    }

    /// The passing sequence as last published, course-ordered.
    pub fn passings(&self) -> Vec<MarkPassing> {
        self.published.values().copied().collect()
    }

    /// One-based index of the end anchor, `waypoint count + 1`.
    pub fn end_index(&self) -> u32 {
        self.graph
            .node_weight(self.end)
            .map_or(0, |anchor| anchor.one_based_index)
    }

    /// Pre-populates the published map without notifying anybody, for state
    /// the race already knows.
    pub(crate) fn seed(&mut self, one_based_index: u32, passing: MarkPassing) {
        self.published.insert(one_based_index, passing);
    }

    /// Applies a delta and re-resolves. Returns the full new sequence when
    /// it differs from what was last published.
    pub fn apply<R, T>(
        &mut self,
        ctx: ChooserContext<'_, R, T>,
        delta: CandidateDelta,
    ) -> Option<Vec<MarkPassing>>
    where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        for candidate in &delta.removed {
            self.remove_candidate(candidate.key());
        }
        for candidate in delta.added {
            self.add_candidate(ctx, candidate);
        }
        self.resolve()
    }

    /// Inserts a hypothesis and wires it to every existing one. A duplicate
    /// (same index and time) is dropped; the earlier report wins.
    pub(crate) fn add_candidate<R, T>(
        &mut self,
        ctx: ChooserContext<'_, R, T>,
        candidate: Candidate,
    ) -> bool
    where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        debug_assert!(
            candidate.is_anchor() || candidate.one_based_index < self.end_index(),
            "hypothesis index outside the course"
        );
        match self.nodes.entry(candidate.key()) {
            Entry::Occupied(_) => {
                trace!(
                    "dropping duplicate hypothesis {:?} for {}",
                    candidate.key(),
                    self.competitor
                );
                false
            }
            Entry::Vacant(slot) => {
                let node = self.graph.add_node(candidate);
                slot.insert(node);
                self.link(ctx, node);
                true
            }
        }
    }

    /// Retires a hypothesis along with every edge touching it.
    pub(crate) fn remove_candidate(&mut self, key: CandidateKey) -> bool {
        match self.nodes.remove(&key) {
            Some(node) => {
                trace!("retiring hypothesis {key:?} for {}", self.competitor);
                self.graph.remove_node(node);
                true
            }
            None => false,
        }
    }

    /// Swaps the start anchor for one at `time`, discarding and rebuilding
    /// all of its edges. Called when the official start becomes known or
    /// changes.
    pub(crate) fn rebuild_start_anchor<R, T>(
        &mut self,
        ctx: ChooserContext<'_, R, T>,
        time: Option<DateTime<Utc>>,
    ) where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        if let Some(old) = self.graph.remove_node(self.start) {
            self.nodes.remove(&old.key());
        }
        let anchor = Candidate::start_anchor(time);
        self.start = self.graph.add_node(anchor);
        self.nodes.insert(anchor.key(), self.start);
        self.link(ctx, self.start);
    }

    /// Swaps the end anchor for one at `end_index`. The old anchor's edges
    /// die with it, so a shrunk or grown course can never leak paths through
    /// the stale index.
    pub(crate) fn rebuild_end_anchor<R, T>(
        &mut self,
        ctx: ChooserContext<'_, R, T>,
        end_index: u32,
    ) where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        if let Some(old) = self.graph.remove_node(self.end) {
            self.nodes.remove(&old.key());
        }
        let anchor = Candidate::end_anchor(end_index);
        self.end = self.graph.add_node(anchor);
        self.nodes.insert(anchor.key(), self.end);
        self.link(ctx, self.end);
    }

    /// Drops published entries for waypoints that left the course. No
    /// notification; the topology deltas that follow re-resolve the lane.
    pub(crate) fn purge_waypoints(&mut self, removed: &[WaypointId]) {
        self.published
            .retain(|_, passing| !removed.contains(&passing.waypoint));
    }

    pub(crate) fn pin(&mut self, one_based_index: u32, passing: MarkPassing) -> Option<Vec<MarkPassing>> {
        self.fixed.insert(one_based_index, passing);
        self.resolve()
    }

    pub(crate) fn unpin(&mut self, one_based_index: u32) -> Option<Vec<MarkPassing>> {
        self.fixed.remove(&one_based_index);
        self.resolve()
    }

    pub(crate) fn suppress_from(&mut self, one_based_index: u32) -> Option<Vec<MarkPassing>> {
        self.suppressed_from = Some(one_based_index);
        self.resolve()
    }

    pub(crate) fn unsuppress(&mut self) -> Option<Vec<MarkPassing>> {
        self.suppressed_from = None;
        self.resolve()
    }

    /// Searches, overlays the manual state and stages the result. Returns
    /// the full course-ordered sequence when it differs from the published
    /// one, `None` when nothing changed.
    pub fn resolve(&mut self) -> Option<Vec<MarkPassing>> {
        let mut staged = self.search();
        for (&index, passing) in &self.fixed {
            staged.insert(index, *passing);
        }
        if let Some(from) = self.suppressed_from {
            // Suppression beats a pinned passing at the same index.
            staged.split_off(&from);
        }
        if staged == self.published {
            return None;
        }
        debug!(
            "passing sequence for {} changed, {} -> {} entries",
            self.competitor,
            self.published.len(),
            staged.len()
        );
        self.published = staged;
        Some(self.passings())
    }

    /// Cheapest path from start anchor to end anchor.
    ///
    /// Deliberately a repeated full scan over the live edge list rather than
    /// a heap: every round labels the unlabeled node reachable at the lowest
    /// accumulated cost, taking the *first* edge found on equal cost so the
    /// choice between equal hypotheses is stable across runs. Lanes hold at
    /// most a few hundred edges, which keeps the quadratic scan well below
    /// any cost that would matter next to the track lookups.
    fn search(&self) -> BTreeMap<u32, MarkPassing> {
        let mut best: FxHashMap<NodeIndex, f64> = FxHashMap::default();
        let mut parent: FxHashMap<NodeIndex, NodeIndex> = FxHashMap::default();
        best.insert(self.start, 0.0);

        while !best.contains_key(&self.end) {
            let mut next: Option<(NodeIndex, NodeIndex, f64)> = None;
            for edge in self.graph.edge_references() {
                let Some(reached) = best.get(&edge.source()) else {
                    continue;
                };
                if best.contains_key(&edge.target()) {
                    continue;
                }
                let total = reached + edge.weight().cost;
                if next.is_none_or(|(_, _, cost)| total < cost) {
                    next = Some((edge.source(), edge.target(), total));
                }
            }
            let Some((source, target, total)) = next else {
                // No relaxable edge left; with the anchor fallback in place
                // this only happens on an empty graph.
                break;
            };
            best.insert(target, total);
            parent.insert(target, source);
        }

        let mut staged = BTreeMap::new();
        let mut node = self.end;
        while let Some(&previous) = parent.get(&node) {
            if let Some(candidate) = self.graph.node_weight(previous) {
                if let (Some(waypoint), Some(time)) = (candidate.waypoint, candidate.time) {
                    staged.insert(
                        candidate.one_based_index,
                        MarkPassing::new(self.competitor, waypoint, time),
                    );
                }
            }
            node = previous;
        }
        staged
    }

    /// Wires `node` to every other hypothesis in the lane, in both
    /// directions as the waypoint indices dictate.
    fn link<R, T>(&mut self, ctx: ChooserContext<'_, R, T>, node: NodeIndex)
    where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        let Some(candidate) = self.graph.node_weight(node).copied() else {
            return;
        };
        let mut wired: SmallVec<[(NodeIndex, NodeIndex, PassingEdge); 8]> = SmallVec::new();
        for other in self.graph.node_indices() {
            if other == node {
                continue;
            }
            let Some(peer) = self.graph.node_weight(other).copied() else {
                continue;
            };
            let (early_node, late_node, early, late) =
                if peer.one_based_index < candidate.one_based_index {
                    (other, node, peer, candidate)
                } else if peer.one_based_index > candidate.one_based_index {
                    (node, other, candidate, peer)
                } else {
                    // Two hypotheses for the same waypoint compete, they
                    // never connect.
                    continue;
                };
            if let Some(edge) = self.weigh(ctx, &early, &late) {
                wired.push((early_node, late_node, edge));
            }
        }
        for (early_node, late_node, edge) in wired {
            self.graph.add_edge(early_node, late_node, edge);
        }
    }

    /// The edge admission rules and the cost model in one place.
    ///
    /// A hop must travel forward in time (unknown endpoints are permissive)
    /// and an ordinary hop must beat the skip plausibility; anchor-adjacent
    /// hops are always admitted, which is what keeps every lane solvable.
    /// The admitted edge carries
    ///
    /// ```text
    /// late.plausibility x timing x transition x skip ^ (waypoints jumped)
    /// ```
    ///
    /// where `timing` weighs start candidates against the gun and
    /// `transition` is the strategy's distance judgement.
    fn weigh<R, T>(
        &self,
        ctx: ChooserContext<'_, R, T>,
        early: &Candidate,
        late: &Candidate,
    ) -> Option<PassingEdge>
    where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        if !forward_in_time_or_unknown(early, late) {
            return None;
        }

        let mut timing = 1.0;
        let transition = if early.kind == CandidateKind::StartAnchor {
            if ctx.gate_start || early.time.is_none() {
                // No usable start timing; every hypothesis is as good.
                1.0
            } else if late.one_based_index == 1 {
                if let (Some(anchor), Some(passed)) = (early.time, late.time) {
                    timing = start_timing_plausibility(
                        ctx.config.start_timing_half_life,
                        anchor + ctx.config.early_start_allowance,
                        passed,
                    );
                }
                1.0
            } else if late.kind == CandidateKind::EndAnchor {
                1.0
            } else {
                // The hop skips the start; judge the distance as if the
                // first waypoint had been passed at the anchor time.
                self.estimate(ctx, early, late)?
            }
        } else if late.kind == CandidateKind::EndAnchor {
            // Nothing is known about distances behind the last waypoint.
            1.0
        } else {
            self.estimate(ctx, early, late)?
        };

        if !early.is_anchor()
            && !late.is_anchor()
            && transition <= ctx.config.skip_plausibility
        {
            // Cheaper to explain as a skip; the fallback edges cover it.
            return None;
        }

        let skipped = late.one_based_index.saturating_sub(early.one_based_index + 1);
        let plausibility = late.plausibility
            * timing
            * transition
            * ctx.config.skip_plausibility.powi(skipped as i32);
        Some(PassingEdge::from_plausibility(plausibility))
    }

    fn estimate<R, T>(
        &self,
        ctx: ChooserContext<'_, R, T>,
        early: &Candidate,
        late: &Candidate,
    ) -> Option<f64>
    where
        R: RaceAdapter,
        T: TransitionStrategy<R>,
    {
        match ctx
            .strategy
            .plausibility(ctx.transition(self.competitor, early, late))
        {
            Ok(plausibility) => Some(plausibility),
            Err(err) => {
                debug!(
                    "dropping hop {} -> {} for {}: {err}",
                    early.one_based_index, late.one_based_index, self.competitor
                );
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[cfg(test)]
    pub(crate) fn candidate_count(&self) -> usize {
        self.graph.node_count()
    }
}

#[inline]
fn forward_in_time_or_unknown(early: &Candidate, late: &Candidate) -> bool {
    match (early.time, late.time) {
        (Some(a), Some(b)) => a < b,
        _ => true,
    }
}

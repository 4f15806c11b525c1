use chrono::{DateTime, Utc};

use crate::chooser::Candidate;
use crate::config::ChooserConfig;
use crate::costing::TransitionStrategy;
use crate::domain::CompetitorId;
use crate::race::RaceAdapter;

/// The ambient state one recomputation pass runs against.
///
/// Bundles the race, the weighting strategy and a topology snapshot taken at
/// the start of the pass. It is `Copy` so each per-competitor task carries
/// its own, and every task of one batch agrees on the same snapshot.
pub struct ChooserContext<'a, R, T>
where
    R: RaceAdapter,
    T: TransitionStrategy<R>,
{
    pub race: &'a R,
    pub strategy: &'a T,
    pub config: &'a ChooserConfig,

    /// Official start of race as of this pass, if known.
    pub start_time: Option<DateTime<Utc>>,

    /// Waypoint count as of this pass; the end anchor sits one past it.
    pub waypoint_count: u32,

    pub gate_start: bool,
}

impl<'a, R, T> ChooserContext<'a, R, T>
where
    R: RaceAdapter,
    T: TransitionStrategy<R>,
{
    /// Snapshots the race into a context for one recomputation pass.
    pub fn snapshot(race: &'a R, strategy: &'a T, config: &'a ChooserConfig) -> Self {
        ChooserContext {
            race,
            strategy,
            config,
            start_time: race.start_of_race(),
            waypoint_count: race.with_course(|course| course.waypoint_count()),
            gate_start: race.is_gate_start(),
        }
    }

    /// The per-hop view handed to the weighting strategy.
    pub fn transition<'b>(
        &self,
        competitor: CompetitorId,
        from: &'b Candidate,
        to: &'b Candidate,
    ) -> TransitionContext<'b, R>
    where
        'a: 'b,
    {
        TransitionContext {
            race: self.race,
            config: self.config,
            competitor,
            from,
            to,
            waypoint_count: self.waypoint_count,
        }
    }

    /// Where the start anchor sits on the time axis: the official start,
    /// pulled forward by the early-start allowance.
    pub fn start_anchor_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
            .map(|start| start - self.config.early_start_allowance)
    }
}

impl<R, T> Clone for ChooserContext<'_, R, T>
where
    R: RaceAdapter,
    T: TransitionStrategy<R>,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<R, T> Copy for ChooserContext<'_, R, T>
where
    R: RaceAdapter,
    T: TransitionStrategy<R>,
{
}

/// Everything a [`TransitionStrategy`](crate::costing::TransitionStrategy)
/// may consult when scoring one hop.
pub struct TransitionContext<'a, R>
where
    R: RaceAdapter,
{
    pub race: &'a R,
    pub config: &'a ChooserConfig,
    pub competitor: CompetitorId,

    /// The earlier hypothesis of the hop. May be the start anchor, in which
    /// case the leg span is evaluated as if departing the first waypoint at
    /// the anchor's time.
    pub from: &'a Candidate,

    /// The later hypothesis. Never the end anchor; hops into it are not
    /// distance-weighted.
    pub to: &'a Candidate,

    pub waypoint_count: u32,
}

impl<R> TransitionContext<'_, R>
where
    R: RaceAdapter,
{
    /// Whether the hop ends at the last waypoint of the course.
    pub fn onto_last_waypoint(&self) -> bool {
        self.to.one_based_index == self.waypoint_count
    }
}

impl<R> Clone for TransitionContext<'_, R>
where
    R: RaceAdapter,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for TransitionContext<'_, R> where R: RaceAdapter {}

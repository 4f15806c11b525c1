use log::trace;
use thiserror::Error;

use crate::costing::TransitionContext;
use crate::domain::CompetitorId;
use crate::race::RaceAdapter;

#[derive(Error, Debug)]
pub enum EstimateError {
    #[error("candidate carries no time point, cannot span a leg")]
    MissingTime,

    #[error("no track distance for {0} over the candidate span")]
    MissingTrackDistance(CompetitorId),
}

/// Scores how plausible it is that `to` directly follows `from` for this
/// competitor, in `[0, 1]`.
///
/// The engine multiplies the result with the later candidate's own
/// plausibility and the skip penalty for any waypoints jumped over; a result
/// at or below the skip plausibility means the hop is cheaper to explain as
/// a skip and the edge is not created. An `Err` drops the edge and is logged
/// by the caller; return `Ok(0.0)` for "implausible but well-defined".
pub trait TransitionStrategy<R>
where
    R: RaceAdapter,
{
    fn plausibility(&self, ctx: TransitionContext<'_, R>) -> Result<f64, EstimateError>;
}

/// The default strategy: compare the distance actually sailed between the
/// two candidate times against the minimum great-circle distance of the legs
/// spanned.
///
/// A ratio below `1` is physically suspect (the boat sailed *less* than the
/// leg minimum) and scores the ratio itself. Anything up to the configured
/// ratio bound is normal sailing and scores `1.0` — except onto the last
/// waypoint, where a slight slope down to the latest-finish factor prefers
/// the earlier of two otherwise equal finish candidates. Beyond the bound,
/// plausibility decays with `1 / (ratio - bound + 1)`.
pub struct LegDistanceRatio;

impl<R> TransitionStrategy<R> for LegDistanceRatio
where
    R: RaceAdapter,
{
    fn plausibility(&self, ctx: TransitionContext<'_, R>) -> Result<f64, EstimateError> {
        let from_time = ctx.from.time.ok_or(EstimateError::MissingTime)?;
        let to_time = ctx.to.time.ok_or(EstimateError::MissingTime)?;

        // Mark positions drift; evaluate the legs midway through the span.
        let midpoint = from_time + (to_time - from_time) / 2;

        // When departing the start anchor the span is judged as if the first
        // waypoint had been passed at the anchor's time.
        let departure_index = ctx.from.one_based_index.max(1);

        let mut minimum = 0.0f64;
        for onto in departure_index + 1..=ctx.to.one_based_index {
            let Some(leg) = ctx.race.minimum_leg_distance(onto, midpoint) else {
                trace!(
                    "no minimum distance for leg onto waypoint {onto}; scoring hop for {} as implausible",
                    ctx.competitor
                );
                return Ok(0.0);
            };
            // The leg may in fact have been shorter by the mark fix error on
            // either end.
            minimum += leg - 2.0 * ctx.config.fix_error_margin;
        }
        if minimum <= 0.0 {
            trace!(
                "degenerate minimum distance {minimum:.1}m between waypoints {} and {}",
                ctx.from.one_based_index, ctx.to.one_based_index
            );
            return Ok(0.0);
        }

        let sailed = ctx
            .race
            .distance_traveled(ctx.competitor, from_time, to_time)
            .ok_or(EstimateError::MissingTrackDistance(ctx.competitor))?;

        let floor = if ctx.onto_last_waypoint() {
            ctx.config.latest_finish_factor
        } else {
            1.0
        };
        Ok(ratio_plausibility(
            sailed / minimum,
            ctx.config.max_plausible_distance_ratio,
            floor,
        ))
    }
}

/// The ratio curve itself, separated out for testability.
///
/// ```text
///       1.0 -|        ________
///            |      /         ‾‾‾‾----____
///            |    /                        ‾‾‾----
///            |  /
///       0.0 -+------|--------|----------------------
///            0      1      bound           ratio ->
/// ```
/// The plateau is flat at `1.0` unless `floor < 1.0`, in which case it
/// slopes linearly from `1.0` at ratio `1` to `floor` at the bound, and the
/// falloff beyond the bound starts contiguously at `floor`.
pub(crate) fn ratio_plausibility(ratio: f64, bound: f64, floor: f64) -> f64 {
    if ratio <= 1.0 {
        ratio
    } else if ratio <= bound {
        1.0 - (1.0 - floor) * (ratio - 1.0) / (bound - 1.0)
    } else {
        floor / (ratio - bound + 1.0)
    }
}

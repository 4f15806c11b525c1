use chrono::TimeDelta;

/// Tuning constants for candidate weighting and start-line handling.
///
/// The defaults reflect what has proven workable on real regatta data; they
/// are grouped here so a calculator instance can be tuned per race without
/// touching any global state.
#[derive(Clone, Copy, Debug)]
pub struct ChooserConfig {
    /// Plausibility of skipping a single waypoint outright.
    ///
    /// Raised to the number of waypoints an edge jumps over, this keeps the
    /// candidate graph solvable even when whole roundings went unobserved.
    /// It doubles as the floor an ordinary edge must beat: a hop whose
    /// distance plausibility does not exceed this value is cheaper to
    /// explain as a skip and is not added to the graph.
    pub skip_plausibility: f64,

    /// Upper bound of the distance ratio band considered fully plausible.
    ///
    /// Sailing twice the great-circle length of a leg is still normal
    /// (beating upwind); beyond this ratio plausibility falls off with
    /// `1 / (ratio - bound + 1)`.
    pub max_plausible_distance_ratio: f64,

    /// Plausibility assigned at the far end of the ratio band when the hop
    /// ends at the last waypoint.
    ///
    /// The slight slope makes an earlier finish candidate win over a later,
    /// otherwise equally plausible one.
    pub latest_finish_factor: f64,

    /// How early before the official start a competitor may plausibly cross
    /// the line. The start anchor sits this far before the gun.
    pub early_start_allowance: TimeDelta,

    /// Gap from the official start after which the plausibility of a start
    /// candidate halves. Twice the gap gives a third, and so on.
    pub start_timing_half_life: TimeDelta,

    /// Typical positional error of a mark fix, in meters. Every leg minimum
    /// is shortened by twice this margin since the leg may in fact have been
    /// that much shorter.
    pub fix_error_margin: f64,
}

impl Default for ChooserConfig {
    fn default() -> Self {
        ChooserConfig {
            skip_plausibility: 0.1,
            max_plausible_distance_ratio: 2.0,
            latest_finish_factor: 0.95,
            early_start_allowance: TimeDelta::seconds(5),
            start_timing_half_life: TimeDelta::minutes(1),
            fix_error_margin: 5.0,
        }
    }
}

use chrono::{DateTime, TimeDelta, Utc};

/// Plausibility that a start candidate at `candidate_time` is the real
/// start, given the official `start_of_race`.
///
/// Being `half_life` off the gun scores `1/2`, twice that `1/3`, and so on;
/// a candidate exactly on the gun scores `1`.
pub fn start_timing_plausibility(
    half_life: TimeDelta,
    start_of_race: DateTime<Utc>,
    candidate_time: DateTime<Utc>,
) -> f64 {
    let gap = (candidate_time - start_of_race).abs();
    let half = half_life.num_milliseconds() as f64;
    half / (half + gap.num_milliseconds() as f64)
}

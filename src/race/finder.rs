use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::chooser::CandidateDelta;
use crate::domain::{CompetitorId, GpsFix, MarkId, WaypointId};
use crate::race::CourseView;

#[derive(Error, Debug)]
pub enum FinderError {
    #[error("no track loaded for {0}")]
    MissingTrack(CompetitorId),

    #[error("candidate source failed: {0}")]
    Source(String),
}

/// Turns raw fixes into passing hypotheses.
///
/// The finder owns the geometric judgement — which fixes look like a rounding
/// of which waypoint, and how believable each looks on its own. It is
/// stateful: it remembers what it has reported so it can *retire* hypotheses
/// that later evidence invalidates. The graph engine applies whatever deltas
/// the finder emits without second-guessing them.
pub trait CandidateFinder: Send + Sync {
    /// Competitor fixes whose candidate status may have changed because new
    /// mark fixes moved the geometry underneath them. They are re-scored
    /// together with the batch's own competitor fixes.
    fn fixes_affected_by_mark_fixes(
        &self,
        mark_fixes: &[(MarkId, GpsFix)],
    ) -> Result<FxHashMap<CompetitorId, Vec<GpsFix>>, FinderError>;

    /// Scores `fixes` for one competitor, returning hypotheses to take up
    /// and hypotheses to retire.
    fn candidate_deltas(
        &self,
        competitor: CompetitorId,
        fixes: &[GpsFix],
    ) -> Result<CandidateDelta, FinderError>;

    /// Full rebuild: forget every prior report for `competitor` and return
    /// the complete current candidate set (nothing to retire).
    fn all_candidates(&self, competitor: CompetitorId) -> Result<CandidateDelta, FinderError>;

    /// Re-evaluates stored fixes around a topology change.
    ///
    /// Called under the course read lock with the post-change `course`.
    /// Waypoints at or after `smallest_changed_zero_based` shifted position,
    /// so hypotheses referring to them must be re-indexed or retired, and
    /// fixes near `added` waypoints may yield new hypotheses.
    fn update_waypoints(
        &self,
        course: &dyn CourseView,
        added: &[WaypointId],
        removed: &[WaypointId],
        smallest_changed_zero_based: u32,
    ) -> Result<FxHashMap<CompetitorId, CandidateDelta>, FinderError>;
}

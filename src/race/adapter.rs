use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::{CompetitorId, GpsFix, MarkId, MarkPassing, WaypointId};

/// Read access to the course topology as one consistent snapshot.
///
/// Waypoint indices are one-based throughout; index `0` and
/// `waypoint_count() + 1` are reserved for the synthetic anchors of the
/// candidate graph and never appear on a course.
pub trait CourseView {
    /// Number of waypoints currently laid.
    fn waypoint_count(&self) -> u32;

    /// The waypoint at a one-based course position, if the course is that long.
    fn waypoint_at(&self, one_based_index: u32) -> Option<WaypointId>;

    /// The one-based course position of a waypoint, if it is (still) laid.
    fn index_of(&self, waypoint: WaypointId) -> Option<u32>;

    fn first_waypoint(&self) -> Option<WaypointId> {
        self.waypoint_at(1)
    }

    fn last_waypoint(&self) -> Option<WaypointId> {
        self.waypoint_at(self.waypoint_count())
    }
}

/// Receiver for the race's change notifications.
///
/// Implementations must return quickly; callbacks run on the thread that
/// recorded the change.
pub trait RaceChangeListener: Send + Sync {
    fn competitor_position_changed(&self, competitor: CompetitorId, fix: GpsFix);

    fn mark_position_changed(&self, mark: MarkId, fix: GpsFix);

    /// A waypoint was spliced into the course at `zero_based_index`.
    fn waypoint_added(&self, waypoint: WaypointId, zero_based_index: u32);

    /// The waypoint at `zero_based_index` left the course.
    fn waypoint_removed(&self, waypoint: WaypointId, zero_based_index: u32);
}

/// The tracked race as seen by the calculation core: environment, event
/// source and publication sink in one.
///
/// Implementations own the heavyweight state — tracks, course geometry,
/// leaderboard plumbing — and are shared across threads, so every method
/// takes `&self` and synchronizes internally.
pub trait RaceAdapter: Send + Sync {
    /// Human-readable race name, used for thread names and log output.
    fn name(&self) -> String;

    /// Runs `f` under the course read lock.
    ///
    /// The closure observes a single topology snapshot for its whole
    /// duration. Topology-sensitive work (candidate re-discovery and the
    /// end-anchor index) must happen inside one `with_course` span so both
    /// sides agree on the waypoint count.
    fn with_course<T>(&self, f: impl FnOnce(&dyn CourseView) -> T) -> T;

    /// The official (not inferred) start of race, once known.
    fn start_of_race(&self) -> Option<DateTime<Utc>>;

    /// Whether the race uses a gate start. Gate starts carry no usable
    /// start-line timing, so start candidates are not weighted by it.
    fn is_gate_start(&self) -> bool;

    /// The competitor set. Stable for the lifetime of the race.
    fn competitors(&self) -> Vec<CompetitorId>;

    /// Passings the race already knows for `competitor`, e.g. from an
    /// earlier calculator instance. Seeds the engine so unchanged state is
    /// not re-announced.
    fn known_mark_passings(&self, competitor: CompetitorId) -> Vec<MarkPassing>;

    /// Distance in meters actually sailed by `competitor` between the two
    /// instants, or `None` while the track has no data for the span.
    fn distance_traveled(
        &self,
        competitor: CompetitorId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<f64>;

    /// Minimum great-circle distance in meters of the leg *onto* the
    /// waypoint at `one_based_index`, with mark positions evaluated at `at`.
    /// `None` while a mark position on the leg is unknown.
    fn minimum_leg_distance(&self, one_based_index: u32, at: DateTime<Utc>) -> Option<f64>;

    /// Replaces the published passing sequence for `competitor`.
    ///
    /// `passings` is complete and course-ordered. The call must be atomic
    /// towards readers and idempotent; the core only invokes it when the
    /// sequence actually changed.
    fn update_mark_passings(&self, competitor: CompetitorId, passings: &[MarkPassing]);

    /// Registers `listener` for all future change notifications.
    fn subscribe(&self, listener: Arc<dyn RaceChangeListener>);
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CompetitorId, WaypointId};

/// The derived moment a competitor rounded a waypoint.
///
/// Passings are published to the race as a full, course-ordered sequence per
/// competitor and replace whatever sequence was published before.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPassing {
    pub competitor: CompetitorId,
    pub waypoint: WaypointId,
    pub time: DateTime<Utc>,
}

impl MarkPassing {
    pub fn new(competitor: CompetitorId, waypoint: WaypointId, time: DateTime<Utc>) -> Self {
        Self {
            competitor,
            waypoint,
            time,
        }
    }
}

use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};

/// A single positional report for a competitor or a mark.
///
/// Fixes arrive in no particular order and are never assumed complete; the
/// candidate source is free to re-interpret any of them when later evidence
/// (new mark fixes, topology changes) shifts the geometry underneath.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub position: Point,
    pub time: DateTime<Utc>,
}

impl GpsFix {
    pub fn new(position: Point, time: DateTime<Utc>) -> Self {
        Self { position, time }
    }
}

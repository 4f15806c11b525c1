use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A directed hop between two passing hypotheses of the same competitor.
///
/// Stores the cost of taking the hop, `1 - plausibility`, so the cheapest
/// path through a lane is the most plausible passing sequence. Costs add up
/// along a path; they are always within `[0, 1]` per edge.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PassingEdge {
    pub cost: f64,
}

impl PassingEdge {
    /// Builds the edge from the hop's combined plausibility, clamped into
    /// `[0, 1]` so a degenerate estimate can never produce a negative cost.
    #[inline]
    pub fn from_plausibility(plausibility: f64) -> Self {
        PassingEdge {
            cost: 1.0 - plausibility.clamp(0.0, 1.0),
        }
    }

    #[inline]
    pub fn plausibility(&self) -> f64 {
        1.0 - self.cost
    }
}

impl Eq for PassingEdge {}

impl PartialEq<Self> for PassingEdge {
    fn eq(&self, other: &Self) -> bool {
        self.cost.eq(&other.cost)
    }
}

impl PartialOrd<Self> for PassingEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PassingEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost.total_cmp(&other.cost)
    }
}

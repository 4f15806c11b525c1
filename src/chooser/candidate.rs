use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::domain::WaypointId;

/// Which of the synthetic path anchors a candidate is, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateKind {
    /// Anchors every path before the first waypoint, at index `0`.
    StartAnchor,

    /// Anchors every path behind the last waypoint, at index
    /// `waypoint count + 1`. Moves when the course grows or shrinks.
    EndAnchor,

    /// A real hypothesis derived from observed fixes.
    Observed,
}

/// One passing hypothesis: *this competitor may have rounded the waypoint at
/// `one_based_index` at `time`, and that looks `plausibility` believable on
/// its own*.
///
/// Identity is by value: two candidates are the same hypothesis iff they
/// name the same course index and the same time point. The anchors take part
/// in the same scheme through their reserved indices, so nothing in the
/// engine ever compares by reference or by node handle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: CandidateKind,

    /// The waypoint this hypothesis is about. `None` for the two anchors,
    /// which sit outside the course.
    pub waypoint: Option<WaypointId>,

    /// One-based position on the course; `0` and `waypoint count + 1` are
    /// reserved for the anchors.
    pub one_based_index: u32,

    /// `None` for the end anchor always, and for the start anchor while the
    /// official start of race is unknown.
    pub time: Option<DateTime<Utc>>,

    /// How believable the hypothesis is on its own, in `(0, 1]`. Anchors
    /// carry `1.0`.
    pub plausibility: f64,
}

impl Candidate {
    pub fn observed(
        waypoint: WaypointId,
        one_based_index: u32,
        time: DateTime<Utc>,
        plausibility: f64,
    ) -> Self {
        Candidate {
            kind: CandidateKind::Observed,
            waypoint: Some(waypoint),
            one_based_index,
            time: Some(time),
            plausibility,
        }
    }

    pub fn start_anchor(time: Option<DateTime<Utc>>) -> Self {
        Candidate {
            kind: CandidateKind::StartAnchor,
            waypoint: None,
            one_based_index: 0,
            time,
            plausibility: 1.0,
        }
    }

    pub fn end_anchor(one_based_index: u32) -> Self {
        Candidate {
            kind: CandidateKind::EndAnchor,
            waypoint: None,
            one_based_index,
            time: None,
            plausibility: 1.0,
        }
    }

    #[inline]
    pub fn is_anchor(&self) -> bool {
        self.kind != CandidateKind::Observed
    }

    /// The value identity of this hypothesis within a lane.
    #[inline]
    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            one_based_index: self.one_based_index,
            time: self.time,
        }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    /// Course order: by waypoint index, then by time with unknown times
    /// first. Gives lanes a deterministic edge construction order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Index-and-time identity of a [`Candidate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateKey {
    pub one_based_index: u32,
    pub time: Option<DateTime<Utc>>,
}

/// What a candidate source reports for one competitor: hypotheses to take up
/// and hypotheses to retire.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CandidateDelta {
    pub added: Vec<Candidate>,
    pub removed: Vec<Candidate>,
}

impl CandidateDelta {
    pub fn added(candidates: Vec<Candidate>) -> Self {
        CandidateDelta {
            added: candidates,
            removed: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

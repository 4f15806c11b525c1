use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::domain::{CompetitorId, GpsFix, MarkId, WaypointId};

/// One event from the race, immutable once enqueued.
///
/// Producers never wait for recomputation; they describe what happened and
/// move on. Indices on the wire are zero-based course positions, matching
/// how race infrastructure counts waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RaceCommand {
    CompetitorFix {
        competitor: CompetitorId,
        fix: GpsFix,
    },
    MarkFix {
        mark: MarkId,
        fix: GpsFix,
    },
    WaypointAdded {
        waypoint: WaypointId,
        zero_based_index: u32,
    },
    WaypointRemoved {
        waypoint: WaypointId,
        zero_based_index: u32,
    },
    FixPassing {
        competitor: CompetitorId,
        zero_based_index: u32,
        time: DateTime<Utc>,
    },
    UnfixPassing {
        competitor: CompetitorId,
        zero_based_index: u32,
    },
    SuppressPassings {
        competitor: CompetitorId,
        zero_based_index: u32,
    },
    UnsuppressPassings {
        competitor: CompetitorId,
    },
    /// Wakes the consumer without carrying anything, so buffered work is
    /// processed after a resume.
    Flush,
    /// Tells the consumer to exit. Nothing after it is looked at.
    Shutdown,
}

impl RaceCommand {
    /// Whether this command ends the consumer loop.
    pub fn is_end_marker(&self) -> bool {
        matches!(self, RaceCommand::Shutdown)
    }

    /// Folds the command into `batch`.
    pub fn apply(self, batch: &mut CommandBatch) {
        match self {
            RaceCommand::CompetitorFix { competitor, fix } => {
                batch.competitor_fixes.entry(competitor).or_default().push(fix);
            }
            RaceCommand::MarkFix { mark, fix } => {
                batch.mark_fixes.push((mark, fix));
            }
            RaceCommand::WaypointAdded {
                waypoint,
                zero_based_index,
            } => {
                batch.added_waypoints.push(waypoint);
                batch.note_changed_index(zero_based_index);
            }
            RaceCommand::WaypointRemoved {
                waypoint,
                zero_based_index,
            } => {
                batch.removed_waypoints.push(waypoint);
                batch.note_changed_index(zero_based_index);
            }
            RaceCommand::FixPassing {
                competitor,
                zero_based_index,
                time,
            } => {
                batch.fixed.push((competitor, zero_based_index, time));
            }
            RaceCommand::UnfixPassing {
                competitor,
                zero_based_index,
            } => {
                batch.unfixed.push((competitor, zero_based_index));
            }
            RaceCommand::SuppressPassings {
                competitor,
                zero_based_index,
            } => {
                batch.suppressed.push((competitor, zero_based_index));
            }
            RaceCommand::UnsuppressPassings { competitor } => {
                batch.unsuppressed.push(competitor);
            }
            RaceCommand::Flush | RaceCommand::Shutdown => {}
        }
    }
}

/// Everything the consumer drained since it last got to work, grouped the
/// way processing wants it.
///
/// The batch survives a failed processing round untouched, so transient
/// failures (a track mid-load, say) retry with nothing lost. It is only
/// cleared once a round ran to completion.
#[derive(Debug, Default)]
pub struct CommandBatch {
    pub competitor_fixes: FxHashMap<CompetitorId, Vec<GpsFix>>,
    pub mark_fixes: Vec<(MarkId, GpsFix)>,

    pub added_waypoints: Vec<WaypointId>,
    pub removed_waypoints: Vec<WaypointId>,
    /// Lowest zero-based course position touched by a topology change, i.e.
    /// where candidate re-discovery has to start.
    pub smallest_changed_index: Option<u32>,

    pub fixed: Vec<(CompetitorId, u32, DateTime<Utc>)>,
    pub unfixed: Vec<(CompetitorId, u32)>,
    pub suppressed: Vec<(CompetitorId, u32)>,
    pub unsuppressed: Vec<CompetitorId>,
}

impl CommandBatch {
    pub fn has_topology_change(&self) -> bool {
        !self.added_waypoints.is_empty() || !self.removed_waypoints.is_empty()
    }

    pub(crate) fn note_changed_index(&mut self, zero_based_index: u32) {
        self.smallest_changed_index = Some(match self.smallest_changed_index {
            Some(existing) => existing.min(zero_based_index),
            None => zero_based_index,
        });
    }

    pub fn clear(&mut self) {
        self.competitor_fixes.clear();
        self.mark_fixes.clear();
        self.added_waypoints.clear();
        self.removed_waypoints.clear();
        self.smallest_changed_index = None;
        self.fixed.clear();
        self.unfixed.clear();
        self.suppressed.clear();
        self.unsuppressed.clear();
    }
}

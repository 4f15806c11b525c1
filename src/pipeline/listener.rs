use chrono::{DateTime, Utc};
use log::debug;
use std::sync::mpsc::Sender;

use crate::domain::{CompetitorId, GpsFix, MarkId, WaypointId};
use crate::pipeline::RaceCommand;
use crate::race::RaceChangeListener;

/// The producing end of the calculator's command queue.
///
/// Registered with the race for its change notifications, and used directly
/// by officiating code for the manual overrides. Every call enqueues one
/// command and returns immediately; the queue is unbounded, so producers
/// never block behind a slow recomputation.
pub struct UpdateListener {
    queue: Sender<RaceCommand>,
}

impl UpdateListener {
    pub(crate) fn new(queue: Sender<RaceCommand>) -> Self {
        UpdateListener { queue }
    }

    /// Pins the passing of the waypoint at `zero_based_index` to `time`.
    pub fn add_fixed_passing(
        &self,
        competitor: CompetitorId,
        zero_based_index: u32,
        time: DateTime<Utc>,
    ) {
        self.enqueue(RaceCommand::FixPassing {
            competitor,
            zero_based_index,
            time,
        });
    }

    /// Reverts to the computed passing at `zero_based_index`.
    pub fn remove_fixed_passing(&self, competitor: CompetitorId, zero_based_index: u32) {
        self.enqueue(RaceCommand::UnfixPassing {
            competitor,
            zero_based_index,
        });
    }

    /// Withholds passings from `zero_based_index` on until further notice.
    pub fn add_suppressed_passing(&self, competitor: CompetitorId, zero_based_index: u32) {
        self.enqueue(RaceCommand::SuppressPassings {
            competitor,
            zero_based_index,
        });
    }

    pub fn remove_suppressed_passing(&self, competitor: CompetitorId) {
        self.enqueue(RaceCommand::UnsuppressPassings { competitor });
    }

    /// Wakes the consumer so it processes whatever has buffered.
    pub(crate) fn flush(&self) {
        self.enqueue(RaceCommand::Flush);
    }

    /// Asks the consumer to exit once it reaches this command.
    pub(crate) fn stop(&self) {
        self.enqueue(RaceCommand::Shutdown);
    }

    fn enqueue(&self, command: RaceCommand) {
        // Fire and forget. A send only fails once the consumer is gone, at
        // which point nobody is interested in the command either.
        if let Err(err) = self.queue.send(command) {
            debug!("consumer gone, dropping {:?}", err.0);
        }
    }
}

impl RaceChangeListener for UpdateListener {
    fn competitor_position_changed(&self, competitor: CompetitorId, fix: GpsFix) {
        self.enqueue(RaceCommand::CompetitorFix { competitor, fix });
    }

    fn mark_position_changed(&self, mark: MarkId, fix: GpsFix) {
        self.enqueue(RaceCommand::MarkFix { mark, fix });
    }

    fn waypoint_added(&self, waypoint: WaypointId, zero_based_index: u32) {
        self.enqueue(RaceCommand::WaypointAdded {
            waypoint,
            zero_based_index,
        });
    }

    fn waypoint_removed(&self, waypoint: WaypointId, zero_based_index: u32) {
        self.enqueue(RaceCommand::WaypointRemoved {
            waypoint,
            zero_based_index,
        });
    }
}

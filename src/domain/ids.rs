use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one competitor (boat) of the tracked race.
///
/// The competitor set is fixed for the lifetime of a calculator; ids are
/// handed out by the surrounding race management and only compared here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CompetitorId(u64);

/// Identifies a waypoint of the course.
///
/// A waypoint is a *position in the course sequence*; the same physical mark
/// may appear behind several waypoint ids when it is rounded more than once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct WaypointId(u64);

/// Identifies a physical mark (buoy, vessel) whose position is tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct MarkId(u64);

macro_rules! id_impls {
    ($name:ident, $prefix:literal) => {
        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

id_impls!(CompetitorId, "competitor-");
id_impls!(WaypointId, "waypoint-");
id_impls!(MarkId, "mark-");

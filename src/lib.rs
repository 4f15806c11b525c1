#![doc = include_str!("../readme.md")]
#![allow(dead_code)]

pub mod chooser;
pub mod config;
pub mod costing;
pub mod domain;
pub mod pipeline;
pub mod race;

#[cfg(test)]
pub(crate) mod fixture;

// Re-Exports
#[doc(inline)]
pub use chooser::*;
#[doc(inline)]
pub use config::*;
#[doc(inline)]
pub use costing::*;
#[doc(inline)]
pub use domain::*;
#[doc(inline)]
pub use pipeline::*;
#[doc(inline)]
pub use race::*;

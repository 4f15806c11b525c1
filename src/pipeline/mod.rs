//! The asynchronous shell around the graph engine.
//!
//! Race infrastructure produces events on many threads; the engine wants
//! them one at a time. The pieces here bridge the two: a [`RaceCommand`]
//! queue fed by the [`UpdateListener`], a single consumer owned by the
//! [`MarkPassingCalculator`] that drains the queue into a [`CommandBatch`]
//! and applies it, and a [`TaskExecutor`] that fans the per-competitor work
//! out over a thread pool.

pub mod calculator;
pub mod command;
pub mod executor;
pub mod listener;

#[doc(inline)]
pub use calculator::*;
#[doc(inline)]
pub use command::*;
#[doc(inline)]
pub use executor::*;
#[doc(inline)]
pub use listener::*;

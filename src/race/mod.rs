//! The boundary to the surrounding race infrastructure.
//!
//! Everything the calculation core needs from the outside world — track
//! distances, course topology, the passing sink, candidate discovery — is
//! reached through the traits in this module, keeping the core testable
//! against scripted implementations.

pub mod adapter;
pub mod finder;

#[doc(inline)]
pub use adapter::*;
#[doc(inline)]
pub use finder::*;

//! The graph engine: passing hypotheses per competitor, connected by
//! weighted edges, solved by cheapest path on every change.

pub mod candidate;
pub mod edge;
pub mod engine;
pub mod lane;

#[doc(inline)]
pub use candidate::*;
#[doc(inline)]
pub use edge::*;
#[doc(inline)]
pub use engine::*;
#[doc(inline)]
pub use lane::*;

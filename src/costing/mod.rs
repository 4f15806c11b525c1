//! Edge weighting: how plausible is it that one hypothesis directly
//! follows another?

pub mod context;
pub mod strategy;
pub mod timing;

#[doc(inline)]
pub use context::*;
#[doc(inline)]
pub use strategy::*;
#[doc(inline)]
pub use timing::*;

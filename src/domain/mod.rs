//! Value types shared across the crate: identifiers,
//! positional fixes and derived mark passings.

pub mod fix;
pub mod ids;
pub mod passing;

#[doc(inline)]
pub use fix::*;
#[doc(inline)]
pub use ids::*;
#[doc(inline)]
pub use passing::*;

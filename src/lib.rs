//! Typed query construction, draft tracking and change triggers over relational data.
//!
//! Everything lives in [`keel_core`], this crate is the name users depend on.
pub use keel_core::*;

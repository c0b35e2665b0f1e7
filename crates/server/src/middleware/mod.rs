//! The fixed request pipeline every registered route runs through:
//! panic guard, context, trace, admission gate, handler, finalizer, release.

mod finalize;
pub(crate) mod panic;
mod pipeline;

pub use pipeline::{Pipeline, TRACE_EXEMPT_PATHS};
pub(crate) use pipeline::Route;

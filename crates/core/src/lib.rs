//! Building blocks shared by the request pipeline: business errors and codes,
//! the trace/audit record, observability sinks, the admission gate,
//! configuration and process lifecycle helpers.

pub mod code;
pub mod config;
pub mod env;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod rate_limit;
pub mod sink;
pub mod trace;

pub use error::{AggregatedError, BindError, BusinessError, FrameworkError};

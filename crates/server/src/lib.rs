//! HTTP request lifecycle on top of axum.
//!
//! Routes registered on an [`Engine`] run through one fixed [`Pipeline`]:
//! a panic guard, a pooled [`Context`], trace id assignment, the admission
//! gate, the handler and a finalizer that writes exactly one response plus
//! at most one metrics record, one alert and one `trace-log` line.

mod bind;
pub mod context;
pub mod engine;
pub mod handler;
pub mod launcher;
pub mod middleware;
pub mod pool;

pub use context::{Context, RequestScope};
pub use engine::{Engine, EngineBuilder, Group};
pub use handler::{BoxFuture, Handler};
pub use launcher::Launcher;
pub use middleware::Pipeline;
pub use pool::{ContextPool, PooledContext};

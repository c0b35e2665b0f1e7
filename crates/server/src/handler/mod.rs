//! Handler trait for routes served through the request pipeline.
//!
//! A handler receives the request [`Context`] mutably and reports its
//! outcome through it: a payload, a graph payload, or
//! [`abort_with_error`](Context::abort_with_error). Panics are caught by
//! the pipeline.
//!
//! ```rust,no_run
//! use ferrule_server::{BoxFuture, Context};
//!
//! fn ping(ctx: &mut Context) -> BoxFuture<'_, ()> {
//!     Box::pin(async move {
//!         ctx.payload(&serde_json::json!({ "pong": true }));
//!     })
//! }
//! ```

pub mod health;

use crate::context::Context;

pub use futures::future::BoxFuture;

/// Implemented for every route handler.
///
/// Any `fn(&mut Context) -> BoxFuture<'_, ()>` qualifies through the blanket
/// impl; stateful handlers implement it on their own type.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        self(ctx)
    }
}

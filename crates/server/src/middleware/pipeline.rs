use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use ferrule_core::code;
use ferrule_core::env::Environment;
use ferrule_core::error::BusinessError;
use ferrule_core::rate_limit::AdmissionGate;
use ferrule_core::sink::{NotifySink, RecordSink};
use ferrule_core::trace::{TRACE_HEADER, Trace};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error, info_span};

use super::panic;
use crate::handler::Handler;
use crate::pool::ContextPool;

/// Paths that never get a trace id, a trace header or a `trace-log` line.
pub const TRACE_EXEMPT_PATHS: &[&str] = &[
    "/metrics",
    "/debug/pprof/",
    "/debug/pprof/cmdline",
    "/debug/pprof/profile",
    "/debug/pprof/symbol",
    "/debug/pprof/trace",
    "/debug/pprof/allocs",
    "/debug/pprof/block",
    "/debug/pprof/goroutine",
    "/debug/pprof/heap",
    "/debug/pprof/mutex",
    "/debug/pprof/threadcreate",
    "/favicon.ico",
    "/system/health",
];

/// A registered route as the pipeline sees it.
pub(crate) struct Route {
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) alias: Option<String>,
}

/// How the handler stage ended.
pub(super) enum Outcome {
    /// The context was aborted before the handler could run.
    Skipped,
    Completed,
    Panicked { message: String, stack: String },
}

/// Shared by every route of one engine.
pub struct Pipeline {
    pub(crate) project_name: String,
    pub(crate) env: Environment,
    pub(crate) pool: ContextPool,
    pub(crate) trace_exempt: HashSet<String>,
    pub(crate) gate: Option<Arc<dyn AdmissionGate>>,
    pub(crate) notify: Option<Arc<dyn NotifySink>>,
    pub(crate) record: Option<Arc<dyn RecordSink>>,
    pub(crate) logger: Span,
    pub(crate) body_limit: usize,
}

impl Pipeline {
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Runs one request through every stage and returns the single response
    /// written for it.
    ///
    /// The stages run on their own task. If the client goes away the request
    /// scope is cancelled, but the handler still finishes and the finalizer
    /// still emits its records.
    pub(crate) async fn dispatch(
        self: Arc<Self>,
        route: Arc<Route>,
        request: Request,
        params: Vec<(String, String)>,
    ) -> Response {
        let cancellation = CancellationToken::new();
        let cancel_on_drop = cancellation.clone().drop_guard();
        let logger = self.logger.clone();
        let task = tokio::spawn(async move {
            self.run(&route, request, params, cancellation).await
        });
        let joined = task.await;
        cancel_on_drop.disarm();

        match joined {
            Ok(response) => response,
            Err(err) => {
                // the finalizer itself failed; nothing was written yet
                let reason = if err.is_panic() {
                    panic::message(&*err.into_panic())
                } else {
                    err.to_string()
                };
                error!(parent: &logger, panic = %reason, "got panic outside handler");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    async fn run(
        &self,
        route: &Route,
        request: Request,
        params: Vec<(String, String)>,
        cancellation: CancellationToken,
    ) -> Response {
        let started = Instant::now();
        let (parts, body) = request.into_parts();
        let span = info_span!(
            parent: &self.logger,
            "request",
            method = %parts.method,
            path = %parts.uri.path()
        );

        let (body, body_error) = match axum::body::to_bytes(body, self.body_limit).await {
            Ok(bytes) => (bytes, None),
            Err(e) => (Bytes::new(), Some(e)),
        };

        let mut ctx = self.pool.acquire(parts, body, params);
        ctx.set_cancellation(cancellation);
        ctx.set_logger(span);
        ctx.enable_record_metrics();
        if let Some(alias) = &route.alias {
            ctx.set_alias(alias);
        }
        if let Some(err) = body_error {
            ctx.abort_with_error(
                BusinessError::from_code(400, code::BODY_READ_ERROR).with_cause(err),
            );
        }

        if !self.trace_exempt.contains(ctx.path()) {
            let trace = Trace::new(ctx.get_header(TRACE_HEADER));
            ctx.set_trace(trace);
        }

        if !ctx.is_aborted()
            && let Some(gate) = &self.gate
            && !gate.admit()
        {
            ctx.abort_with_error(BusinessError::too_many_requests());
        }

        let outcome = if ctx.is_aborted() {
            Outcome::Skipped
        } else {
            let span = ctx.logger().clone();
            let result = AssertUnwindSafe(panic::capturing(route.handler.call(&mut ctx)))
                .catch_unwind()
                .instrument(span)
                .await;
            match result {
                Ok(()) => Outcome::Completed,
                Err(payload) => Outcome::Panicked {
                    message: panic::message(&*payload),
                    stack: panic::take_backtrace(),
                },
            }
        };

        self.finalize(&mut ctx, outcome, started)
    }
}

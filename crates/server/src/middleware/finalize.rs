//! Last stage of the pipeline. Writes the response, then emits the metrics
//! record, the alert and the `trace-log` line for the request.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use ferrule_core::error::{AggregatedError, BusinessError};
use ferrule_core::sink::{AlertMessage, MetricsMessage};
use ferrule_core::trace::{TRACE_HEADER, TraceRequest, TraceResponse};
use tracing::{Span, error, info};

use super::panic;
use super::pipeline::{Outcome, Pipeline};
use crate::context::Context;

impl Pipeline {
    pub(super) fn finalize(
        &self,
        ctx: &mut Context,
        outcome: Outcome,
        started: Instant,
    ) -> Response {
        let trace_id = ctx
            .trace()
            .map(|t| t.id().to_string())
            .unwrap_or_default();
        if !trace_id.is_empty() {
            ctx.set_header(TRACE_HEADER, &trace_id);
        }

        if let Outcome::Panicked { message, stack } = outcome {
            error!(parent: ctx.logger(), panic = %message, stack = %stack, "got panic");
            ctx.abort_with_error(BusinessError::server_error());
            self.alert(ctx, &trace_id, message, stack);
        }

        let mut errors = AggregatedError::default();
        errors.extend(ctx.take_errors());

        let (status, wire_body, log_body, business_code, business_code_msg) =
            match ctx.abort_error().cloned() {
                Some(err) => {
                    if err.is_alert() {
                        self.alert(ctx, &trace_id, err.message().to_string(), err.stack());
                    }
                    let envelope = serde_json::to_value(err.envelope()).ok();
                    let (status, code, msg) =
                        (err.status(), err.business_code(), err.message().to_string());
                    errors.push(err);
                    (status, envelope.clone(), envelope, code, msg)
                }
                None => {
                    let wire = ctx
                        .get_payload()
                        .or_else(|| ctx.get_graph_payload())
                        .cloned();
                    let log = ctx
                        .get_graph_payload()
                        .or_else(|| ctx.get_payload())
                        .cloned();
                    (StatusCode::OK, wire, log, 0, String::new())
                }
            };

        let mut response = match &wire_body {
            Some(body) => (status, Json(body)).into_response(),
            None => status.into_response(),
        };
        response.headers_mut().extend(ctx.response_headers().clone());

        let success = !ctx.is_aborted() && status == StatusCode::OK;

        if ctx.is_record_metrics()
            && let Some(sink) = &self.record
        {
            let message = MetricsMessage {
                project_name: self.project_name.clone(),
                env: self.env.to_string(),
                trace_id: trace_id.clone(),
                host: ctx.host().to_string(),
                path: ctx.alias().unwrap_or(ctx.path()).to_string(),
                method: ctx.method().to_string(),
                http_code: status.as_u16(),
                business_code,
                cost_seconds: started.elapsed().as_secs_f64(),
                is_success: success,
            };
            isolate(ctx.logger(), "metrics", || sink.record(&message));
        }

        if let Some(mut trace) = ctx.take_trace() {
            let decoded_url = ctx.uri();
            let cost_seconds = started.elapsed().as_secs_f64();
            trace.with_request(TraceRequest {
                ttl: "un-limit".to_string(),
                method: ctx.method().to_string(),
                decoded_url: decoded_url.clone(),
                header: BTreeMap::from([(
                    "Content-Type".to_string(),
                    ctx.content_type().unwrap_or_default().to_string(),
                )]),
                body: String::from_utf8_lossy(ctx.raw_data()).into_owned(),
            });
            trace.with_response(TraceResponse {
                header: header_snapshot(response.headers()),
                http_code: status.as_u16(),
                http_code_msg: status.canonical_reason().unwrap_or_default().to_string(),
                business_code,
                business_code_msg,
                body: log_body,
                cost_seconds,
            });
            trace.success = success;
            trace.cost_seconds = cost_seconds;

            let trace_info = serde_json::to_string(&trace).unwrap_or_default();
            let error = (!errors.is_empty()).then(|| errors.to_string());
            info!(
                parent: ctx.logger(),
                method = %ctx.method(),
                path = %decoded_url,
                http_code = status.as_u16(),
                business_code,
                success,
                cost_seconds,
                trace_id = %trace.id(),
                trace_info = %trace_info,
                error = error.as_deref(),
                "trace-log"
            );
        }

        response
    }

    fn alert(&self, ctx: &Context, trace_id: &str, error_message: String, error_stack: String) {
        let Some(sink) = &self.notify else {
            return;
        };
        let message = AlertMessage {
            project_name: self.project_name.clone(),
            env: self.env.to_string(),
            trace_id: trace_id.to_string(),
            host: ctx.host().to_string(),
            uri: ctx.uri(),
            method: ctx.method().to_string(),
            error_message,
            error_stack,
            timestamp: Utc::now(),
        };
        isolate(ctx.logger(), "alert", || sink.notify(&message));
    }
}

/// Runs a sink call; a panicking sink is logged and never changes the response.
fn isolate(logger: &Span, sink: &str, f: impl FnOnce()) {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        error!(
            parent: logger,
            sink,
            panic = %panic::message(&*payload),
            "observability sink failed"
        );
    }
}

fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

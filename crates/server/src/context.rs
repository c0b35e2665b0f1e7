//! Per-request mutable state handed to every handler.
//!
//! A [`Context`] is checked out of the [`ContextPool`](crate::pool::ContextPool)
//! when a request enters the pipeline, reset so it carries nothing from a
//! previous request, and returned when the owning guard drops.

use std::borrow::Cow;

use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request};
use bytes::Bytes;
use ferrule_core::code;
use ferrule_core::error::BusinessError;
use ferrule_core::trace::Trace;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Span;

pub struct Context {
    parts: Parts,
    params: Vec<(String, String)>,
    body: Bytes,
    trace: Option<Trace>,
    logger: Span,
    payload: Option<Value>,
    graph_payload: Option<Value>,
    abort_error: Option<BusinessError>,
    errors: Vec<anyhow::Error>,
    alias: Option<String>,
    record_metrics: bool,
    response_headers: HeaderMap,
    cancellation: CancellationToken,
}

/// Identity and cancellation of the request, detached from the context borrow.
///
/// The token is cancelled when the client goes away before the handler
/// finishes, so work spawned from a handler can stop early.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub trace_id: Option<String>,
    pub logger: Span,
    pub cancellation: CancellationToken,
}

impl Context {
    pub(crate) fn new() -> Self {
        Self {
            parts: empty_parts(),
            params: Vec::new(),
            body: Bytes::new(),
            trace: None,
            logger: Span::none(),
            payload: None,
            graph_payload: None,
            abort_error: None,
            errors: Vec::new(),
            alias: None,
            record_metrics: false,
            response_headers: HeaderMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Rebinds the instance to a new request, clearing every field.
    pub(crate) fn reset(&mut self, parts: Parts, body: Bytes, params: Vec<(String, String)>) {
        self.clear();
        self.parts = parts;
        self.body = body;
        self.params = params;
    }

    /// Drops everything tied to the previous request.
    pub(crate) fn clear(&mut self) {
        self.parts = empty_parts();
        self.params.clear();
        self.body = Bytes::new();
        self.trace = None;
        self.logger = Span::none();
        self.payload = None;
        self.graph_payload = None;
        self.abort_error = None;
        self.errors.clear();
        self.alias = None;
        self.record_metrics = false;
        self.response_headers.clear();
        self.cancellation = CancellationToken::new();
    }

    // ── trace and logger ────────────────────────────────────────────────────

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    pub fn trace_mut(&mut self) -> Option<&mut Trace> {
        self.trace.as_mut()
    }

    pub fn set_trace(&mut self, trace: Trace) {
        self.trace = Some(trace);
    }

    /// Stops this request from being audit-logged.
    pub fn disable_trace(&mut self) {
        self.trace = None;
    }

    pub(crate) fn take_trace(&mut self) -> Option<Trace> {
        self.trace.take()
    }

    pub fn logger(&self) -> &Span {
        &self.logger
    }

    pub fn set_logger(&mut self, logger: Span) {
        self.logger = logger;
    }

    pub fn scope(&self) -> RequestScope {
        RequestScope {
            trace_id: self.trace.as_ref().map(|t| t.id().to_string()),
            logger: self.logger.clone(),
            cancellation: self.cancellation.clone(),
        }
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Binds the token the serving side cancels when the client goes away.
    pub(crate) fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancellation = token;
    }

    // ── outputs ─────────────────────────────────────────────────────────────

    /// Sets the success body. A value that cannot be serialized aborts the
    /// request with a server error instead.
    pub fn payload<T: Serialize + ?Sized>(&mut self, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.payload = Some(value),
            Err(e) => self.abort_unserializable(e),
        }
    }

    pub fn get_payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Sets the graph-shaped body. It takes precedence over [`payload`](Self::payload)
    /// in the audit log.
    pub fn graph_payload<T: Serialize + ?Sized>(&mut self, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.graph_payload = Some(value),
            Err(e) => self.abort_unserializable(e),
        }
    }

    pub fn get_graph_payload(&self) -> Option<&Value> {
        self.graph_payload.as_ref()
    }

    fn abort_unserializable(&mut self, err: serde_json::Error) {
        self.abort_with_error(
            BusinessError::from_code(500, code::SERVER_ERROR)
                .with_alert()
                .with_cause(err),
        );
    }

    /// Aborts the request with `err`; `None` is a no-op. A later call replaces
    /// the stored error.
    pub fn abort_with_error(&mut self, err: impl Into<Option<BusinessError>>) {
        if let Some(err) = err.into() {
            self.abort_error = Some(err);
        }
    }

    pub fn abort_error(&self) -> Option<&BusinessError> {
        self.abort_error.as_ref()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_error.is_some()
    }

    /// Records a transport-level error. Collected errors only reach the audit log.
    pub fn push_error(&mut self, err: impl Into<anyhow::Error>) {
        self.errors.push(err.into());
    }

    pub(crate) fn take_errors(&mut self) -> Vec<anyhow::Error> {
        std::mem::take(&mut self.errors)
    }

    // ── flags ───────────────────────────────────────────────────────────────

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub(crate) fn set_alias(&mut self, alias: &str) {
        let alias = alias.trim();
        if !alias.is_empty() {
            self.alias = Some(alias.to_string());
        }
    }

    pub fn enable_record_metrics(&mut self) {
        self.record_metrics = true;
    }

    /// Suppresses the metrics record for this request.
    pub fn disable_record_metrics(&mut self) {
        self.record_metrics = false;
    }

    pub fn is_record_metrics(&self) -> bool {
        self.record_metrics
    }

    // ── request accessors ───────────────────────────────────────────────────

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Host header, falling back to the URI authority.
    pub fn host(&self) -> &str {
        self.parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.parts.uri.host())
            .unwrap_or_default()
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// Percent-decoded path and query.
    pub fn uri(&self) -> String {
        let raw = self
            .parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.parts.uri.path());
        urlencoding::decode(raw)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| raw.to_string())
    }

    pub fn query(&self) -> &str {
        self.parts.uri.query().unwrap_or_default()
    }

    /// A copy of the request headers; changes do not affect the request.
    pub fn header(&self) -> HeaderMap {
        self.parts.headers.clone()
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Sets a header on the response. Invalid names or values are logged and skipped.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.response_headers.insert(name, value);
            }
            _ => tracing::warn!(parent: &self.logger, header = name, "invalid response header skipped"),
        }
    }

    pub(crate) fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// The request body, cached on entry so it can be read any number of times.
    pub fn raw_data(&self) -> &Bytes {
        &self.body
    }
}

fn empty_parts() -> Parts {
    Request::new(()).into_parts().0
}

//! Per-request trace/audit record.
//!
//! A [`Trace`] is created when the pipeline assigns a trace id, filled in
//! once by the finalizer, written to the log as a single `trace-log` event and
//! then dropped. Nothing here is persisted.

use std::collections::BTreeMap;

use serde::Serialize;

/// Header carrying the trace id, read on entry and echoed on the response.
pub const TRACE_HEADER: &str = "trace-id";

#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    #[serde(rename = "trace_id")]
    pub identifier: String,
    pub request: Option<TraceRequest>,
    pub response: Option<TraceResponse>,
    pub success: bool,
    pub cost_seconds: f64,
}

/// Snapshot of the inbound request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceRequest {
    pub ttl: String,
    pub method: String,
    pub decoded_url: String,
    pub header: BTreeMap<String, String>,
    pub body: String,
}

/// Snapshot of what was written back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceResponse {
    pub header: BTreeMap<String, String>,
    pub http_code: u16,
    pub http_code_msg: String,
    pub business_code: i32,
    pub business_code_msg: String,
    pub body: Option<serde_json::Value>,
    pub cost_seconds: f64,
}

impl Trace {
    /// Reuses `inbound` as the identifier when it is non-blank, otherwise mints one.
    pub fn new(inbound: Option<&str>) -> Self {
        let identifier = match inbound.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => new_id(),
        };
        Self {
            identifier,
            request: None,
            response: None,
            success: false,
            cost_seconds: 0.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.identifier
    }

    pub fn with_request(&mut self, request: TraceRequest) {
        self.request = Some(request);
    }

    pub fn with_response(&mut self, response: TraceResponse) {
        self.response = Some(response);
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

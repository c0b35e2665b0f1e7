//! Observability sink contracts invoked by the request finalizer.
//!
//! Both sinks are optional and called synchronously, once per request at
//! most. Implementations swallow their own failures.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sent when a request panicked or aborted with an alertable error.
#[derive(Debug, Clone, Serialize)]
pub struct AlertMessage {
    pub project_name: String,
    pub env: String,
    pub trace_id: String,
    pub host: String,
    pub uri: String,
    pub method: String,
    pub error_message: String,
    pub error_stack: String,
    pub timestamp: DateTime<Utc>,
}

/// One record per finished request while metrics recording is enabled.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsMessage {
    pub project_name: String,
    pub env: String,
    pub trace_id: String,
    pub host: String,
    pub path: String,
    pub method: String,
    pub http_code: u16,
    pub business_code: i32,
    pub cost_seconds: f64,
    pub is_success: bool,
}

pub trait NotifySink: Send + Sync {
    fn notify(&self, message: &AlertMessage);
}

pub trait RecordSink: Send + Sync {
    fn record(&self, message: &MetricsMessage);
}

impl<F> NotifySink for F
where
    F: Fn(&AlertMessage) + Send + Sync,
{
    fn notify(&self, message: &AlertMessage) {
        self(message);
    }
}

impl<F> RecordSink for F
where
    F: Fn(&MetricsMessage) + Send + Sync,
{
    fn record(&self, message: &MetricsMessage) {
        self(message);
    }
}

/// Writes every alert as an `error` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifySink;

impl NotifySink for TracingNotifySink {
    fn notify(&self, message: &AlertMessage) {
        tracing::error!(
            project = %message.project_name,
            env = %message.env,
            trace_id = %message.trace_id,
            host = %message.host,
            method = %message.method,
            uri = %message.uri,
            stack = %message.error_stack,
            "alert: {}",
            message.error_message
        );
    }
}

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::code::{self, Failure};

/// A failed request outcome, raised by a handler or by the pipeline itself.
///
/// Only the business code and message reach the client. The cause chain is
/// kept for the audit log and for alerts.
#[derive(Debug, Clone)]
pub struct BusinessError {
    http_code: u16,
    business_code: i32,
    message: String,
    alert: bool,
    cause: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<str>>,
}

impl BusinessError {
    /// `http_code` of 0 means "use the default 500".
    pub fn new(http_code: u16, business_code: i32, message: impl Into<String>) -> Self {
        Self {
            http_code,
            business_code,
            message: message.into(),
            alert: false,
            cause: None,
            backtrace: None,
        }
    }

    /// Builds an error whose message is the default text for `business_code`.
    pub fn from_code(http_code: u16, business_code: i32) -> Self {
        Self::new(http_code, business_code, code::text(business_code))
    }

    /// The error the pipeline substitutes for a caught panic. The panic is
    /// alerted on its own, so this carries no alert flag.
    pub fn server_error() -> Self {
        Self::from_code(500, code::SERVER_ERROR)
    }

    pub fn too_many_requests() -> Self {
        Self::from_code(429, code::TOO_MANY_REQUESTS)
    }

    /// Marks the error as alert-worthy and records where it was raised, so
    /// the alert carries a stack even without a cause.
    #[must_use]
    pub fn with_alert(mut self) -> Self {
        self.alert = true;
        if self.backtrace.is_none() {
            self.backtrace = Some(Backtrace::force_capture().to_string().into());
        }
        self
    }

    /// Attaches an underlying cause. Never sent on the wire.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(Arc::new(cause.into()));
        self
    }

    /// The raw status as constructed, possibly 0.
    pub fn http_code(&self) -> u16 {
        self.http_code
    }

    /// Status actually written to the client.
    pub fn status(&self) -> StatusCode {
        match self.http_code {
            0 => StatusCode::INTERNAL_SERVER_ERROR,
            code => StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn business_code(&self) -> i32 {
        self.business_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_alert(&self) -> bool {
        self.alert
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    /// Cause chain for logs and alerts, falling back to the backtrace taken
    /// by [`with_alert`](Self::with_alert), then to the message.
    pub fn stack(&self) -> String {
        match (&self.cause, &self.backtrace) {
            (Some(cause), _) => format!("{cause:?}"),
            (None, Some(backtrace)) => format!("{}\n{backtrace}", self.message),
            (None, None) => self.message.clone(),
        }
    }

    pub fn envelope(&self) -> Failure {
        Failure {
            code: self.business_code,
            message: self.message.clone(),
        }
    }
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (business code {})", self.message, self.business_code)
    }
}

impl std::error::Error for BusinessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| &**cause as &(dyn std::error::Error + 'static))
    }
}

impl IntoResponse for BusinessError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}

/// Failure to decode client input into a handler's type.
///
/// Returned to the handler unchanged; the pipeline never aborts on its own.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("query binding failed: {0}")]
    Query(#[source] serde_urlencoded::de::Error),

    #[error("form binding failed: {0}")]
    Form(#[source] serde_urlencoded::de::Error),

    #[error("json binding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("path binding failed: {0}")]
    Path(#[source] serde_urlencoded::de::Error),
}

impl BindError {
    /// Converts the failure into the 400 business error handlers usually abort with.
    pub fn into_business_error(self) -> BusinessError {
        BusinessError::new(400, code::PARAM_BIND_ERROR, self.to_string()).with_cause(self)
    }
}

/// Every error collected for one request, used only for the audit log.
#[derive(Debug, Default)]
pub struct AggregatedError {
    errors: Vec<anyhow::Error>,
}

impl AggregatedError {
    pub fn push(&mut self, err: impl Into<anyhow::Error>) {
        self.errors.push(err.into());
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = anyhow::Error>) {
        self.errors.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

impl fmt::Display for AggregatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err:#}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedError {}

/// Startup and serving failures.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(String),
}

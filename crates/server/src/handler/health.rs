use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use chrono::{DateTime, Utc};
use ferrule_core::env::Environment;
use serde::Serialize;

use super::{BoxFuture, Handler};
use crate::context::Context;

#[derive(Debug, Serialize)]
struct HealthStatus {
    timestamp: DateTime<Utc>,
    environment: &'static str,
    host: String,
    status: &'static str,
}

/// `GET /system/health`, served through the pipeline but never traced.
pub struct Health {
    env: Environment,
}

impl Health {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }
}

impl Handler for Health {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let status = HealthStatus {
                timestamp: Utc::now(),
                environment: self.env.as_str(),
                host: ctx.host().to_string(),
                status: "ok",
            };
            ctx.payload(&status);
        })
    }
}

/// Fallback for unmatched routes; answers before any pipeline stage runs.
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html("404 not found")).into_response()
}

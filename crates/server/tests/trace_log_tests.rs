use std::io;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use ferrule_core::config::Config;
use ferrule_core::error::BusinessError;
use ferrule_server::{BoxFuture, Context, Engine};
use serde_json::{Value, json};
use tower::ServiceExt;
use tracing::subscriber::DefaultGuard;

fn both_payloads(ctx: &mut Context) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        ctx.payload(&json!({ "plain": true }));
        ctx.graph_payload(&json!({ "graph": true }));
    })
}

fn missing(ctx: &mut Context) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        ctx.abort_with_error(BusinessError::new(404, 40401, "user not found"));
    })
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    /// Fields of every `trace-log` event seen so far.
    fn trace_logs(&self) -> Vec<Value> {
        let raw = self.0.lock().unwrap().clone();
        String::from_utf8(raw)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap())
            .filter(|event| event["fields"]["message"] == "trace-log")
            .map(|event| event["fields"].clone())
            .collect()
    }
}

fn router() -> Router {
    let mut engine = Engine::builder(Config::default()).build();
    engine.get("/both", both_payloads).get("/missing", missing);
    engine.into_router()
}

async fn send(router: &Router, request: Request<Body>) -> StatusCode {
    router.clone().oneshot(request).await.unwrap().status()
}

fn trace_info(fields: &Value) -> Value {
    serde_json::from_str(fields["trace_info"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_trace_log_records_request_and_logged_body() {
    let (capture, _guard) = Capture::install();
    let router = router();

    let request = Request::builder()
        .uri("/both?q=a%20b")
        .header("trace-id", "tid-9")
        .header("content-type", "text/plain")
        .header("authorization", "Bearer secret")
        .body(Body::from("hello"))
        .unwrap();
    assert_eq!(send(&router, request).await, StatusCode::OK);

    let logs = capture.trace_logs();
    assert_eq!(logs.len(), 1);
    let fields = &logs[0];
    assert_eq!(fields["trace_id"], "tid-9");
    assert_eq!(fields["path"], "/both?q=a b");
    assert_eq!(fields["http_code"], 200);
    assert_eq!(fields["success"], true);
    assert!(fields.get("error").is_none());

    let info = trace_info(fields);
    assert_eq!(info["trace_id"], "tid-9");
    assert_eq!(info["success"], true);
    assert_eq!(info["request"]["ttl"], "un-limit");
    assert_eq!(info["request"]["method"], "GET");
    assert_eq!(info["request"]["decoded_url"], "/both?q=a b");
    assert_eq!(info["request"]["header"], json!({ "Content-Type": "text/plain" }));
    assert_eq!(info["request"]["body"], "hello");
    assert_eq!(info["response"]["body"], json!({ "graph": true }));
    assert_eq!(info["response"]["http_code"], 200);
    assert_eq!(info["response"]["http_code_msg"], "OK");
    assert_eq!(info["response"]["header"]["trace-id"], "tid-9");
}

#[tokio::test]
async fn test_trace_log_carries_errors_on_abort() {
    let (capture, _guard) = Capture::install();
    let router = router();

    let request = Request::builder().uri("/missing").body(Body::empty()).unwrap();
    assert_eq!(send(&router, request).await, StatusCode::NOT_FOUND);

    let logs = capture.trace_logs();
    assert_eq!(logs.len(), 1);
    let fields = &logs[0];
    assert_eq!(fields["business_code"], 40401);
    assert_eq!(fields["success"], false);
    assert!(fields["error"].as_str().unwrap().contains("user not found"));

    let info = trace_info(fields);
    assert_eq!(info["response"]["business_code"], 40401);
    assert_eq!(info["response"]["business_code_msg"], "user not found");
    assert_eq!(
        info["response"]["body"],
        json!({ "code": 40401, "message": "user not found" })
    );
    assert_eq!(info["response"]["http_code_msg"], "Not Found");
}

#[tokio::test]
async fn test_exempt_path_writes_no_trace_log() {
    let (capture, _guard) = Capture::install();
    let router = router();

    let request = Request::builder().uri("/system/health").body(Body::empty()).unwrap();
    assert_eq!(send(&router, request).await, StatusCode::OK);
    assert!(capture.trace_logs().is_empty());

    let request = Request::builder().uri("/both").body(Body::empty()).unwrap();
    send(&router, request).await;
    assert_eq!(capture.trace_logs().len(), 1);
}

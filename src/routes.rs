//! Sample API served by the binary.

use axum::routing::MethodFilter;
use ferrule_core::error::BusinessError;
use ferrule_server::{BoxFuture, Context, Engine};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub fn register(engine: &mut Engine) {
    engine
        .group("/api")
        .get("/ping", ping)
        .post("/echo", echo)
        .handle_with_alias(MethodFilter::GET, "/users/{id}", "/api/users/:id", user);
}

fn ping(ctx: &mut Context) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        ctx.payload(&json!({ "pong": true }));
    })
}

fn echo(ctx: &mut Context) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        match ctx.bind_json::<serde_json::Value>() {
            Ok(body) => ctx.payload(&body),
            Err(e) => ctx.abort_with_error(e.into_business_error()),
        }
    })
}

#[derive(Deserialize)]
struct UserPath {
    id: u64,
}

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
}

fn user(ctx: &mut Context) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let path = match ctx.bind_uri::<UserPath>() {
            Ok(path) => path,
            Err(e) => return ctx.abort_with_error(e.into_business_error()),
        };
        if path.id == 0 {
            return ctx.abort_with_error(BusinessError::new(404, 40401, "user not found"));
        }
        tracing::debug!(id = path.id, "loading user");
        ctx.payload(&User {
            id: path.id,
            name: format!("user-{}", path.id),
        });
    })
}

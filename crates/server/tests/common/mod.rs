//! Shared harness for server integration tests.

#![allow(dead_code)]

pub mod mocks;
pub mod server;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub use server::TestEnv;

/// Send a request through the router with identity headers attached.
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    identity: Option<(Uuid, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, role)) = identity {
        builder = builder
            .header("x-user-id", user_id.to_string())
            .header("x-user-role", role);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("failed to build request"),
        None => builder.body(Body::empty()).expect("failed to build request"),
    };

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response is not json")
    };
    (status, json)
}

pub fn admin() -> (Uuid, &'static str) {
    (Uuid::new_v4(), "admin")
}

pub fn user() -> (Uuid, &'static str) {
    (Uuid::new_v4(), "user")
}

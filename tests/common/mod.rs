#![allow(dead_code)]

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub use impart_api::testing::TestContext;

pub const PASSWORD: &str = "pa55word";

/// Response pieces the tests assert on
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("valid request")
}

/// Same request as if it arrived from `peer` over a real connection
pub fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().expect("valid socket address");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub async fn send(app: &Router, request: Request<Body>) -> Result<TestResponse> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await?.to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok(TestResponse { status, headers, body })
}

pub async fn get(app: &Router, uri: &str, token: Option<&str>) -> Result<TestResponse> {
    send(app, request(Method::GET, uri, token, None)).await
}

pub async fn post(app: &Router, uri: &str, token: Option<&str>, body: Value) -> Result<TestResponse> {
    send(app, request(Method::POST, uri, token, Some(body))).await
}

pub async fn put(app: &Router, uri: &str, token: Option<&str>, body: Value) -> Result<TestResponse> {
    send(app, request(Method::PUT, uri, token, Some(body))).await
}

pub async fn patch(app: &Router, uri: &str, token: Option<&str>, body: Value) -> Result<TestResponse> {
    send(app, request(Method::PATCH, uri, token, Some(body))).await
}

pub async fn delete(app: &Router, uri: &str, token: Option<&str>) -> Result<TestResponse> {
    send(app, request(Method::DELETE, uri, token, None)).await
}

mod common;

use std::net::SocketAddr;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use common::*;

async fn limited(rps: f64, burst: u32) -> Result<TestContext> {
    let mut config = TestContext::config();
    config.limiter.enabled = true;
    config.limiter.rps = rps;
    config.limiter.burst = burst;
    TestContext::with_config(config).await
}

#[tokio::test]
async fn burst_then_too_many_requests() -> Result<()> {
    let ctx = limited(0.1, 3).await?;
    let app = ctx.router();

    for _ in 0..3 {
        let req = from_peer(request(Method::GET, "/v1/healthcheck", None, None), "10.1.1.1:4000");
        assert_eq!(send(&app, req).await?.status, StatusCode::OK);
    }

    let req = from_peer(request(Method::GET, "/v1/healthcheck", None, None), "10.1.1.1:4001");
    let rejected = send(&app, req).await?;
    assert_eq!(rejected.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejected.body["code"], "TOO_MANY_REQUESTS");

    let req = from_peer(request(Method::GET, "/v1/healthcheck", None, None), "10.1.1.2:4000");
    assert_eq!(send(&app, req).await?.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn limit_applies_before_authentication() -> Result<()> {
    let ctx = limited(0.1, 1).await?;
    let app = ctx.router();

    let req = from_peer(request(Method::GET, "/v1/roles", Some("bogus"), None), "10.2.2.2:5000");
    assert_eq!(send(&app, req).await?.status, StatusCode::UNAUTHORIZED);

    let req = from_peer(request(Method::GET, "/v1/roles", Some("bogus"), None), "10.2.2.2:5000");
    assert_eq!(send(&app, req).await?.status, StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

#[tokio::test]
async fn missing_peer_address_is_internal_error() -> Result<()> {
    let ctx = limited(1.0, 5).await?;
    let response = get(&ctx.router(), "/v1/healthcheck", None).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["code"], "INTERNAL_SERVER_ERROR");
    Ok(())
}

#[tokio::test]
async fn disabled_limiter_ignores_peer_address() -> Result<()> {
    let ctx = TestContext::new().await?;
    let app = ctx.router();

    for _ in 0..20 {
        assert_eq!(get(&app, "/v1/healthcheck", None).await?.status, StatusCode::OK);
    }
    assert!(ctx.state.limiter.is_empty());
    Ok(())
}

#[tokio::test]
async fn limits_real_connections_by_peer_ip() -> Result<()> {
    let ctx = limited(0.1, 2).await?;
    let app = ctx.router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
    });

    let client = reqwest::Client::new();
    let url = format!("http://{}/v1/healthcheck", addr);
    let mut statuses = Vec::new();
    for _ in 0..3 {
        statuses.push(client.get(&url).send().await?.status().as_u16());
    }
    server.abort();

    assert_eq!(statuses, vec![200, 200, 429]);
    assert_eq!(ctx.state.limiter.len(), 1);
    Ok(())
}

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod middleware;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validator;

use anyhow::Context;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post, put, MethodRouter},
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::auth::guards::{enforce, Gate, Policy};
use crate::auth::principal::authenticate;
use crate::config::AppConfig;
use crate::database::models::role::ADMIN;
use crate::database::Store;
use crate::handlers::{health, roles, tokens, users};
use crate::state::AppState;

pub use crate::error::ApiError;

/// Attach a guard policy to every method in `route`
fn guarded(state: &AppState, policy: Policy, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(
        Gate::new(state.store.roles.clone(), policy),
        enforce,
    ))
}

/// Full application router. Outermost first: trace, rate limit, CORS, panic
/// recovery, principal resolution, then per-route guards.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/healthcheck", get(health::healthcheck))
        .merge(user_routes(&state))
        .merge(role_routes(&state))
        .merge(token_routes(&state));

    Router::new()
        .nest("/v1", api)
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
                .layer(middleware::cors_layer(&state.config.security.cors_trusted_origins))
                .layer(middleware::recover_layer())
                .layer(from_fn_with_state(state.clone(), authenticate))
                .layer(from_fn(middleware::json_method_not_allowed)),
        )
        .with_state(state)
}

fn user_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            post(users::register).merge(guarded(state, Policy::AnyRole(users::VIEW_ROLES), get(users::list))),
        )
        .route("/users/activated", put(users::activate))
        .route(
            "/users/:id",
            guarded(state, Policy::Activated, get(users::get).patch(users::update))
                .merge(guarded(state, Policy::Role(ADMIN), axum::routing::delete(users::delete))),
        )
}

fn role_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/roles",
            get(roles::list).merge(guarded(state, Policy::Role(ADMIN), post(roles::create))),
        )
        .route(
            "/roles/:id",
            guarded(state, Policy::Activated, get(roles::get)).merge(guarded(
                state,
                Policy::Role(ADMIN),
                patch(roles::update).delete(roles::delete),
            )),
        )
}

fn token_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/tokens/authentication",
            post(tokens::login).merge(guarded(
                state,
                Policy::Authenticated,
                axum::routing::delete(tokens::logout),
            )),
        )
        .route("/tokens/activation", post(tokens::create_activation))
        .route("/tokens/validate", post(tokens::validate))
        .route(
            "/tokens/user/:user_id",
            guarded(state, Policy::Role(ADMIN), axum::routing::delete(tokens::revoke_for_user)),
        )
}

/// `RUST_LOG` wins over the configured level
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    info!(
        environment = config.environment.as_str(),
        port = config.server.port,
        limiter_enabled = config.limiter.enabled,
        "Starting impart API"
    );

    let pool = database::postgres::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    let store = Store::postgres(pool.clone(), config.query_timeout());

    let state = AppState::new(config, store).context("failed to build application state")?;
    let sweeper = state
        .limiter
        .spawn_sweeper(Duration::from_secs(state.config.limiter.sweep_interval_secs));

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    let app = router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    pool.close().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

//! Dashboard API
//!
//! Usage-tracking dashboard served over HTTP with typed-rpc:
//! - `health`
//! - `project.getUsage`, `project.setDiscordID`
//! - `category.getEventCategories`, `category.createEventCategory`,
//!   `category.deleteCategory`

pub mod config;
pub mod rpc;

use config::{ConfigError, ServerConfig};
use rpc::{AppState, MemoryStore, Plan, User, compile_router};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use typed_rpc::{CompileError, CompiledRouter};

/// Failure to start or run the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot compile router: {0}")]
    Compile(#[from] CompileError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Create the shared state, seeding the demo user when configured.
pub fn create_app_state(config: &ServerConfig) -> AppState {
    let store = MemoryStore::new();
    if let Some(api_key) = &config.demo_api_key {
        store.insert_user(User::new("demo", "demo@example.com", Plan::Free), api_key.clone());
        tracing::info!("Demo user created");
    }
    AppState::new(Arc::new(store))
}

/// The HTTP service: compiled routes wrapped in request tracing.
pub fn app(compiled: CompiledRouter) -> axum::Router {
    compiled.into_axum().layer(TraceLayer::new_for_http())
}

/// Bind and serve until ctrl-c.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let addr = config.addr()?;
    let state = create_app_state(&config);
    let compiled = compile_router(state, config.rpc.clone())?;
    for route in compiled.routes() {
        tracing::debug!(operation = %route.name, method = %route.method, path = %route.path, "Route");
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let local_addr = listener.local_addr().map_err(ServerError::Serve)?;
    tracing::info!("Dashboard API listening on {}", local_addr);

    axum::serve(listener, app(compiled))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    tracing::info!("Dashboard API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

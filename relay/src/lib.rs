//! Forwarding relay for browser code that must reach third-party origins.
//!
//! Requests arrive at `http://<relay>/<mount>` carrying their true
//! destination in the `X-Proxy-Target` header or the `target` query
//! parameter. The relay re-issues them against that destination and streams
//! the origin's response back unmodified, including upgraded connections.
//!
//! Each request is handled independently; no mutable state is shared between
//! requests beyond the HTTP client's connection pool.

pub mod config;
pub mod error;
pub mod forward;
pub mod logging;
pub mod routes;
pub mod target;
pub mod upgrade;

use std::future::Future;

use tokio::net::TcpListener;

pub use config::RelayConfig;
pub use error::{ErrorBody, RelayError, Result};
pub use routes::{build_router, AppState, HealthStatus};

/// Bind the listener described by `config`.
pub async fn bind(config: &RelayConfig) -> Result<TcpListener> {
    let addr = config.listen_addr();
    TcpListener::bind(addr).await.map_err(|source| RelayError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Serve the relay on `listener` until the process exits.
pub async fn serve(listener: TcpListener, config: RelayConfig) -> Result<()> {
    serve_with_shutdown(listener, config, std::future::pending()).await
}

/// Serve the relay on `listener` until `shutdown` resolves, then drain
/// in-flight requests.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    config: RelayConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(AppState::new(&config)?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

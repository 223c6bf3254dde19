//! HTTP server lifecycle

use super::handlers::{router, AppState};
use crate::backend::InMemoryBackend;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::mcp::dispatcher::{Dispatcher, RpcHandler};
use crate::session::{spawn_sweeper, ActorSessionStore, SessionStore};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// MCP Streamable HTTP server
pub struct McpHttpServer {
    config: ServerConfig,
    sessions: Arc<ActorSessionStore>,
    handler: Arc<dyn RpcHandler>,
    /// Shutdown signal for background tasks
    shutdown_tx: broadcast::Sender<()>,
    sweeper_handle: Option<JoinHandle<()>>,
}

impl McpHttpServer {
    /// Server dispatching to `handler`
    pub fn new(config: ServerConfig, handler: Arc<dyn RpcHandler>) -> Result<Self> {
        config.validate()?;
        let sessions = Arc::new(ActorSessionStore::with_timeout(config.store_timeout()));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            sessions,
            handler,
            shutdown_tx,
            sweeper_handle: None,
        })
    }

    /// Server backed by the in-process memory backend
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let backend = Arc::new(InMemoryBackend::with_search_limit(config.search_limit_max));
        let handler: Arc<dyn RpcHandler> = Arc::new(Dispatcher::new(backend));
        Self::new(config, handler)
    }

    pub fn sessions(&self) -> &Arc<ActorSessionStore> {
        &self.sessions
    }

    /// Router for this server's state
    pub fn router(&self) -> Result<Router> {
        let sessions: Arc<dyn SessionStore> = self.sessions.clone();
        let state = AppState::new(
            sessions,
            self.handler.clone(),
            self.config.default_namespace()?,
        )
        .with_shutdown(self.shutdown_tx.clone());
        Ok(router(state))
    }

    /// Bind and serve until `shutdown` resolves
    ///
    /// Tries the configured address first, then up to `port_fallbacks`
    /// successive ports.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = bind_with_fallback(self.config.bind_addr, self.config.port_fallbacks).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// When `shutdown` fires, open event streams are ended first so the
    /// graceful drain does not wait on them.
    pub async fn serve_on<F>(mut self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router()?;
        info!("MCP server listening on http://{}/mcp", listener.local_addr()?);

        self.sweeper_handle = Some(spawn_sweeper(
            self.sessions.clone(),
            self.config.sweep_interval(),
            self.config.session_retention(),
            self.shutdown_tx.subscribe(),
        ));

        let shutdown_tx = self.shutdown_tx.clone();
        let signal = async move {
            shutdown.await;
            debug!("Shutdown requested, closing event streams");
            let _ = shutdown_tx.send(());
        };
        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await?;

        info!("MCP server stopped, releasing sessions");
        if let Some(handle) = self.sweeper_handle.take() {
            if let Err(e) = handle.await {
                warn!("Session sweeper ended abnormally: {}", e);
            }
        }
        self.sessions.shutdown().await;
        Ok(())
    }
}

impl Drop for McpHttpServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.sweeper_handle.take() {
            handle.abort();
            debug!("Session sweeper aborted on server drop");
        }
    }
}

/// Bind `addr`, falling back to the next `fallbacks` ports when in use
pub async fn bind_with_fallback(addr: SocketAddr, fallbacks: u16) -> anyhow::Result<TcpListener> {
    let base_port = addr.port();
    let mut last_error = None;

    for offset in 0..=fallbacks {
        let Some(port) = base_port.checked_add(offset) else {
            break;
        };
        let candidate = SocketAddr::new(addr.ip(), port);
        match TcpListener::bind(candidate).await {
            Ok(listener) => {
                if offset > 0 {
                    info!("Port {} in use, bound {} instead", base_port, port);
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                debug!("Port {} in use", port);
                last_error = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(anyhow::anyhow!(
        "All ports ({}-{}) on {} are in use: {}",
        base_port,
        base_port.saturating_add(fallbacks),
        addr.ip(),
        last_error.map_or_else(|| "port range exhausted".to_string(), |e| e.to_string())
    ))
}

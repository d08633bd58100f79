//! Relay server listener
//!
//! Handles TCP accept loop and spawns connection handlers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::registry::{Broadcaster, GroupRegistry, RegistryConfig};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::handler::{DefaultHandler, RelayHandler};
use crate::server::handshake;
use crate::session::SessionContext;
use crate::stats::{ConnectionCounters, RelayStats};

/// Group relay server
pub struct RelayServer<H: RelayHandler = DefaultHandler> {
    config: ServerConfig,
    handler: Arc<H>,
    registry: Arc<GroupRegistry>,
    broadcaster: Broadcaster,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    counters: Arc<ConnectionCounters>,
}

impl<H: RelayHandler> RelayServer<H> {
    /// Create a new server with the given configuration and handler
    pub fn new(config: ServerConfig, handler: H) -> Self {
        Self::with_registry_config(config, handler, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(
        config: ServerConfig,
        handler: H,
        registry_config: RegistryConfig,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = Arc::new(GroupRegistry::with_config(registry_config));
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        Self {
            config,
            handler: Arc::new(handler),
            registry,
            broadcaster,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            counters: Arc::new(ConnectionCounters::new()),
        }
    }

    /// Get a reference to the group registry
    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    /// Get the broadcaster bound to this server's registry
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_until(listener, std::future::pending()).await
    }

    /// Serve connections from an already bound listener until `shutdown` completes
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, path = %self.config.path, "Relay server listening");

        let stats_handle = self.spawn_stats_task();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        if let Some(handle) = stats_handle {
            handle.abort();
        }

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let path = self.config.path.clone();
        let handshake_timeout = self.config.handshake_timeout;
        let broadcaster = self.broadcaster.clone();
        let handler = Arc::clone(&self.handler);
        let active = self.counters.open();

        tokio::spawn(async move {
            let _permit = permit;
            let _active = active;

            let (ws, join) = match handshake::accept(socket, &path, handshake_timeout).await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::debug!(
                        session_id = session_id,
                        peer = %peer_addr,
                        error = %e,
                        "Handshake failed"
                    );
                    return;
                }
            };

            let ctx = SessionContext::new(session_id, peer_addr, join.group, join.member);
            let connection = Connection::new(ws, ctx, broadcaster, handler);

            match connection.run().await {
                Ok(stats) => {
                    tracing::debug!(
                        session_id = session_id,
                        messages = stats.messages_received,
                        deliveries = stats.deliveries,
                        "Connection closed"
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        session_id = session_id,
                        error = %e,
                        "Connection error"
                    );
                }
            }
        });
    }

    /// Spawn the periodic stats logger, if enabled
    fn spawn_stats_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        let interval = self.config.stats_interval?;
        let registry = Arc::clone(&self.registry);
        let counters = Arc::clone(&self.counters);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let groups = registry.group_count().await;
                let members = registry.member_count().await;
                tracing::info!(
                    groups = groups,
                    members = members,
                    active_connections = counters.active(),
                    total_connections = counters.total(),
                    "Relay stats"
                );
            }
        }))
    }

    /// Get server-wide statistics
    pub async fn stats(&self) -> RelayStats {
        RelayStats {
            total_connections: self.counters.total(),
            active_connections: self.counters.active(),
            groups: self.registry.group_count().await,
            members: self.registry.member_count().await,
            uptime: self.counters.uptime(),
        }
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

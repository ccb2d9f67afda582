//! TCP listener.

use crate::config::Config;
use crate::connection::Connection;
use crate::error::ServerError;
use crate::handler::RequestDispatcher;
use crate::query::QueryEngine;
use cqlwire_protocol::{DEFAULT_PORT, MAX_FRAME_SIZE};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Pause after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest accepted frame body.
    pub max_frame_bytes: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: 1000,
            max_frame_bytes: MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: u32) -> Self {
        self.max_frame_bytes = max;
        self
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            max_connections: config.network.max_connections,
            max_frame_bytes: config.protocol.max_frame_bytes,
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Native protocol server.
pub struct Server {
    config: ServerConfig,
    dispatcher: Arc<RequestDispatcher>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a server that sends queries to `engine`.
    pub fn new(config: ServerConfig, engine: Arc<dyn QueryEngine>) -> Self {
        Self::with_dispatcher(config, RequestDispatcher::new(engine))
    }

    /// Creates a server around a preconfigured dispatcher.
    pub fn with_dispatcher(config: ServerConfig, dispatcher: RequestDispatcher) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections accepted on `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        // Subscribe before flagging as running so an early shutdown is seen.
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);

        tracing::info!("Server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                                continue;
                            }

                            if let Err(e) = tcp_stream.set_nodelay(true) {
                                tracing::debug!("[{}] Cannot set TCP_NODELAY: {}", addr, e);
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let dispatcher = self.dispatcher.clone();
                            let stats = self.stats.clone();
                            let max_frame_bytes = self.config.max_frame_bytes;
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                tracing::info!("Client connected: {}", addr);
                                let mut conn = Connection::new(tcp_stream, addr.to_string(), dispatcher)
                                    .with_max_frame_bytes(max_frame_bytes);

                                let result = tokio::select! {
                                    result = conn.run() => result,
                                    _ = conn_shutdown.recv() => {
                                        tracing::debug!("[{}] Shutdown signal received", addr);
                                        Ok(())
                                    }
                                };

                                if let Err(e) = result {
                                    if e.is_protocol_violation() {
                                        tracing::warn!("[{}] Closing connection: {}", addr, e);
                                    } else {
                                        tracing::debug!("[{}] Connection error: {}", addr, e);
                                    }
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Initiates server shutdown. The accept loop stops and open
    /// connections are dropped.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::UnconfiguredQueryEngine;
    use cqlwire_protocol::{decode_header, FrameHeader, Opcode, ProtocolVersion};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start(config: ServerConfig) -> (Arc<Server>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(Server::new(config, Arc::new(UnconfiguredQueryEngine)));

        let s = server.clone();
        tokio::spawn(async move { s.serve(listener).await });
        (server, addr)
    }

    async fn options_roundtrip(client: &mut TcpStream, stream_id: i16) -> FrameHeader {
        let request = FrameHeader::request(ProtocolVersion::V3, stream_id, Opcode::Options, 0);
        client.write_all(&request.encode().unwrap()).await.unwrap();

        let mut raw = [0u8; 9];
        client.read_exact(&mut raw).await.unwrap();
        let (header, _) = decode_header(Some(ProtocolVersion::V3), &raw).unwrap();
        let mut body = vec![0u8; header.body_length as usize];
        client.read_exact(&mut body).await.unwrap();
        header
    }

    async fn wait_for(cond: impl Fn() -> bool) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_server_config_from_config() {
        let mut config = Config::default();
        config.network.max_connections = 3;
        config.protocol.max_frame_bytes = 512;

        let server_config = ServerConfig::from(&config);
        assert_eq!(server_config.bind_addr, config.network.bind_addr);
        assert_eq!(server_config.max_connections, 3);
        assert_eq!(server_config.max_frame_bytes, 512);
    }

    #[test]
    fn test_server_not_running_before_serve() {
        let server = Server::new(ServerConfig::default(), Arc::new(UnconfiguredQueryEngine));
        assert!(!server.is_running());
        assert_eq!(server.config().bind_addr.port(), 9042);
    }

    #[tokio::test]
    async fn test_serves_independent_connections() {
        let (server, addr) = start(ServerConfig::default()).await;

        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();

        assert_eq!(options_roundtrip(&mut a, 1).await.opcode, Opcode::Supported);
        assert_eq!(options_roundtrip(&mut b, 2).await.stream_id, 2);

        // A protocol violation on one connection leaves the other untouched
        a.write_all(&[0x7F]).await.unwrap();
        let mut rest = Vec::new();
        a.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        assert_eq!(options_roundtrip(&mut b, 3).await.opcode, Opcode::Supported);
        wait_for(|| server.stats().errors_total.load(Ordering::Relaxed) == 1).await;
        assert_eq!(server.stats().connections_total.load(Ordering::Relaxed), 2);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let (server, addr) = start(ServerConfig::default().with_max_connections(1)).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        options_roundtrip(&mut first, 0).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut rest = Vec::new();
        second.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(server.stats().connections_rejected.load(Ordering::Relaxed), 1);

        drop(first);
        wait_for(|| server.stats().connections_active.load(Ordering::Relaxed) == 0).await;

        let mut third = TcpStream::connect(addr).await.unwrap();
        assert_eq!(options_roundtrip(&mut third, 5).await.opcode, Opcode::Supported);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_frame_limit_applies_to_connections() {
        let (server, addr) = start(ServerConfig::default().with_max_frame_bytes(8)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let header = FrameHeader::request(ProtocolVersion::V3, 0, Opcode::Query, 64);
        client.write_all(&header.encode().unwrap()).await.unwrap();

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        wait_for(|| server.stats().errors_total.load(Ordering::Relaxed) == 1).await;

        server.shutdown();
    }

    #[test]
    fn test_accept_error_backoff() {
        assert!(ACCEPT_ERROR_BACKOFF >= Duration::from_millis(10));
        assert!(ACCEPT_ERROR_BACKOFF <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_connections() {
        let (server, addr) = start(ServerConfig::default()).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        options_roundtrip(&mut client, 1).await;
        assert_eq!(server.stats().connections_active.load(Ordering::Relaxed), 1);

        server.shutdown();

        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_empty());
        wait_for(|| server.stats().connections_active.load(Ordering::Relaxed) == 0).await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_accept_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(Server::new(
            ServerConfig::default(),
            Arc::new(UnconfiguredQueryEngine),
        ));

        let s = server.clone();
        let handle = tokio::spawn(async move { s.serve(listener).await });
        wait_for(|| server.is_running()).await;

        server.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(!server.is_running());
    }
}

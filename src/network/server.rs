//! WebSocket Host
//!
//! Serves the rendering surface over WebSocket. Each connection gets its
//! own [`GameController`]; all controllers share one store. Text frames
//! are handed to the controller in arrival order, and outbound messages
//! are written back as JSON text frames.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::network::controller::{ControllerConfig, GameController};
use crate::network::protocol::OutboundMessage;
use crate::persistence::store::{FileStore, KeyValueStore, MemoryStore, StoreError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Directory for saved games. `None` keeps them in memory.
    pub save_dir: Option<PathBuf>,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-connection channel capacity.
    pub outbound_buffer: usize,
    /// Settings for each connection's controller.
    pub controller: ControllerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8048)),
            save_dir: None,
            // one panel per host
            max_connections: 1,
            outbound_buffer: 64,
            controller: ControllerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `TWENTY48_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("TWENTY48_BIND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            save_dir: std::env::var("TWENTY48_SAVE_DIR").ok().map(PathBuf::from),
            controller: ControllerConfig::from_env(),
            ..defaults
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Save store could not be opened.
    #[error("Failed to open save store: {0}")]
    Store(#[from] StoreError),
}

/// Store shared by every connection.
pub type SharedStore = Arc<Mutex<Box<dyn KeyValueStore>>>;

/// Holds one connection slot; released on drop.
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        let previous = active.fetch_add(1, Ordering::SeqCst);
        if previous >= limit {
            active.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self { active: active.clone() })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// WebSocket game host.
pub struct GameServer {
    config: ServerConfig,
    store: SharedStore,
    active: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server over `store`.
    pub fn new(config: ServerConfig, store: Box<dyn KeyValueStore>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            store: Arc::new(Mutex::new(store)),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Create a server with the store named by `config.save_dir`.
    pub fn open(config: ServerConfig) -> Result<Self, GameServerError> {
        let store: Box<dyn KeyValueStore> = match &config.save_dir {
            Some(dir) => {
                info!("Saving games under {}", dir.display());
                Box::new(FileStore::open(dir)?)
            }
            None => {
                info!("Saving games in memory");
                Box::new(MemoryStore::new())
            }
        };
        Ok(Self::new(config, store))
    }

    /// Configuration in use.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open connections.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Bind `config.bind_addr` and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Serve connections from `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("Game server listening on {}", addr),
            Err(e) => warn!("Game server listening on unknown address: {}", e),
        }
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let Some(slot) = ConnectionSlot::acquire(&self.active, self.config.max_connections) else {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            };
                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr, slot);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, slot: ConnectionSlot) {
        let store = self.store.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _slot = slot;
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(config.outbound_buffer);
            let (in_tx, in_rx) = mpsc::channel::<String>(config.outbound_buffer);

            let mut controller = GameController::new(config.controller.clone(), Box::new(store));
            if let Err(e) = controller.attach_sink(Box::new(out_tx)).await {
                error!("Failed to attach sink for {}: {}", addr, e);
                return;
            }

            // Ends once the controller drops its sink.
            let writer = tokio::spawn(async move {
                while let Some(msg) = out_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let session = tokio::spawn(async move {
                if let Err(e) = controller.run(in_rx).await {
                    error!("Controller for {} stopped: {}", addr, e);
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(text).await.is_err() {
                                    debug!("Controller for {} is gone", addr);
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            drop(in_tx);
            if let Err(e) = session.await {
                error!("Controller task for {} failed: {}", addr, e);
            }
            let _ = writer.await;
            info!("Client {} cleaned up", addr);
        });
    }
}

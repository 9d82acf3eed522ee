//! Test server harness for integration tests.
//!
//! Spins up the real router on a random port for integration testing with
//! HTTP, SSE and WebSocket clients.

use std::net::SocketAddr;

use chat_canvas_server::{router, AppState, RegistryLimits, ServerConfig, SessionRegistry};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

/// A test server instance with control handles.
pub struct TestServer {
    addr: SocketAddr,
    sessions: SessionRegistry,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
    expiry: Option<(JoinHandle<()>, oneshot::Sender<()>)>,
}

impl TestServer {
    /// Start a new test server on a random available port.
    ///
    /// # Panics
    ///
    /// Panics if no port is available or server fails to bind.
    pub async fn start() -> Self {
        Self::start_with_limits(RegistryLimits::default()).await
    }

    /// Start a test server with custom registry limits.
    ///
    /// # Panics
    ///
    /// Panics if no port is available or server fails to bind.
    pub async fn start_with_limits(limits: RegistryLimits) -> Self {
        Self::start_with_config(ServerConfig {
            limits,
            ..ServerConfig::default()
        })
        .await
    }

    /// Start a test server with a custom configuration. The port is always
    /// picked at random; session expiry runs as configured.
    ///
    /// # Panics
    ///
    /// Panics if no port is available or server fails to bind.
    #[allow(dead_code)]
    pub async fn start_with_config(config: ServerConfig) -> Self {
        let port = portpicker::pick_unused_port().expect("no available port");
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let config = ServerConfig { port, ..config };
        let state = AppState::from_config(config);
        let sessions = state.sessions.clone();
        let expiry = state.spawn_expiry_sweep();

        let app = router(state).layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));

        let listener = TcpListener::bind(addr).await.expect("failed to bind");
        let actual_addr = listener.local_addr().expect("failed to get local addr");

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        // Spawn the server
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("server error");
        });

        // Give the server a moment to start
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        Self {
            addr: actual_addr,
            sessions,
            shutdown_tx: Some(shutdown_tx),
            handle,
            expiry,
        }
    }

    /// Get the server's socket address.
    #[allow(dead_code)]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL for an HTTP path.
    #[allow(dead_code)]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// WebSocket URL for one session.
    #[allow(dead_code)]
    pub fn ws_url(&self, session_id: &str) -> String {
        format!("ws://{}/ws/{}", self.addr, session_id)
    }

    /// Direct access to the registry (for test setup and assertions).
    #[allow(dead_code)]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Gracefully shut down the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some((handle, tx)) = self.expiry.take() {
            let _ = tx.send(());
            let _ = handle.await;
        }
        let _ = tokio::time::timeout(tokio::time::Duration::from_secs(5), self.handle).await;
    }
}

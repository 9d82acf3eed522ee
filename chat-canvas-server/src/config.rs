//! Server configuration.
//!
//! Every setting is a command-line flag with an environment fallback, so the
//! server runs unchanged from a shell or a container.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use crate::sessions::{RegistryLimits, DEFAULT_EVENT_CAPACITY};
use crate::validation::{DEFAULT_MAX_FRAGMENT_BYTES, DEFAULT_MAX_SESSIONS};

/// Default port for the chat canvas server.
pub const DEFAULT_PORT: u16 = 9474;

/// Default idle time before a session expires (1 hour).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Default time between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Command-line arguments for chat-canvas.
#[derive(Debug, Clone, Parser)]
#[command(name = "chat-canvas")]
#[command(about = "Streaming chat canvas parser server")]
#[command(version)]
pub struct CliArgs {
    /// Port to listen on
    #[arg(long, env = "CHAT_CANVAS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind (localhost unless explicitly overridden)
    #[arg(long, env = "CHAT_CANVAS_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Maximum number of live sessions
    #[arg(long, env = "CHAT_CANVAS_MAX_SESSIONS", default_value_t = DEFAULT_MAX_SESSIONS)]
    pub max_sessions: usize,

    /// Maximum bytes per fragment or parse request
    #[arg(long, env = "CHAT_CANVAS_MAX_FRAGMENT_BYTES", default_value_t = DEFAULT_MAX_FRAGMENT_BYTES)]
    pub max_fragment_bytes: usize,

    /// Events buffered per subscriber before it is resynced from a snapshot
    #[arg(long, env = "CHAT_CANVAS_EVENT_CAPACITY", default_value_t = DEFAULT_EVENT_CAPACITY)]
    pub event_capacity: usize,

    /// Seconds a session may stay idle before it is dropped (0 keeps sessions forever)
    #[arg(long, env = "CHAT_CANVAS_SESSION_TTL_SECS", default_value_t = DEFAULT_SESSION_TTL_SECS)]
    pub session_ttl_secs: u64,

    /// Seconds between idle-session sweeps
    #[arg(long, env = "CHAT_CANVAS_SWEEP_INTERVAL_SECS", default_value_t = DEFAULT_SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,
}

/// Resolved server configuration.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Bind address.
    pub host: IpAddr,
    /// Bind port.
    pub port: u16,
    /// Session registry limits.
    pub limits: RegistryLimits,
    /// Idle time before a session expires; `None` disables expiry.
    pub session_ttl: Option<Duration>,
    /// Time between expiry sweeps.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            limits: RegistryLimits::default(),
            session_ttl: Some(Duration::from_secs(DEFAULT_SESSION_TTL_SECS)),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl ServerConfig {
    /// Socket address to bind.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl From<CliArgs> for ServerConfig {
    fn from(args: CliArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            limits: RegistryLimits {
                max_sessions: args.max_sessions,
                max_fragment_bytes: args.max_fragment_bytes,
                event_capacity: args.event_capacity.max(1),
            },
            session_ttl: (args.session_ttl_secs > 0).then(|| Duration::from_secs(args.session_ttl_secs)),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs.max(1)),
        }
    }
}

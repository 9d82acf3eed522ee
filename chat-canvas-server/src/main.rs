//! # Chat Canvas Server
//!
//! Streams assistant text through the chat canvas parser for any number of
//! concurrent chat sessions. Binds to localhost unless configured otherwise.

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chat_canvas_server::{metrics, router, AppState, CliArgs, ServerConfig};

/// Build a CORS layer that only allows localhost origins.
fn build_cors_layer(port: u16) -> CorsLayer {
    let localhost_origins = [
        format!("http://localhost:{port}"),
        format!("http://127.0.0.1:{port}"),
        // Common development ports for chat frontends
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(), // Vite
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ];

    let origins: Vec<HeaderValue> = localhost_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,chat_canvas_server=debug,tower_http=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output (recommended for production).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,chat_canvas_server=debug,chat_canvas_core=info,tower_http=debug")
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from(CliArgs::parse());

    init_tracing();

    let metrics_handle = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to initialize Prometheus metrics: {}", e))?;
    tracing::info!("Prometheus metrics initialized");

    let state = AppState::from_config(config);
    let expiry = state.spawn_expiry_sweep();

    // Build metrics router with PrometheusHandle
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let app = router(state)
        .merge(metrics_router)
        // Request ID for distributed tracing correlation
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(build_cors_layer(config.port))
        // Structured request tracing with timing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let addr = config.addr();
    if !addr.ip().is_loopback() {
        tracing::warn!("Binding to non-loopback address {}", addr.ip());
    }
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        max_sessions = config.limits.max_sessions,
        max_fragment_bytes = config.limits.max_fragment_bytes,
        "Chat canvas server starting on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((handle, shutdown_tx)) = expiry {
        let _ = shutdown_tx.send(());
        let _ = handle.await;
    }

    tracing::info!("Chat canvas server stopped");
    Ok(())
}

/// Resolve on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Prometheus metrics endpoint.
#[tracing::instrument(name = "metrics", skip(handle))]
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

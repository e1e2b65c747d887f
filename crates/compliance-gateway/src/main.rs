//! Compliance Gateway - HTTP façade for the compliance-data backend
//!
//! This is the main entry point for the gateway service. It resolves the
//! configuration, installs logging, wires the backend client lifecycle into
//! the router and serves HTTP or HTTPS until SIGINT/SIGTERM.
//!
//! # Configuration
//!
//! See [`compliance_gateway::config`] for every setting. Only configuration
//! errors stop the process; a missing `BACKEND_ACCESS_TOKEN` is reported on
//! the first request or health check instead.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;

use compliance_client::HttpConnector;
use compliance_gateway::config::{self, Env};
use compliance_gateway::{create_router, logging, ClientLifecycle, ClientSettings, GatewayState};

/// How long in-flight requests may drain after a shutdown signal on TLS.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration errors are fatal before anything binds
    let env: Env = std::env::vars().collect();
    let (config, secrets) = config::load(&env)?;

    logging::init(&config.logging)?;

    tracing::info!("Starting Compliance Gateway");
    tracing::info!(
        listen_addr = %config.server.listen_addr(),
        tls_enabled = config.server.tls_enabled,
        backend_url_template = %config.backend.base_url_template,
        backend_timeout_ms = config.backend.timeout_ms,
        backend_retries = config.backend.retries,
        cors_enabled = config.cors.enabled,
        "Gateway configuration loaded"
    );

    if secrets.access_token.is_none() {
        tracing::warn!(
            "No {} set - backend calls and /health will fail until it is provided",
            config::ACCESS_TOKEN_ENV
        );
    }

    // The client is created lazily on first use
    let settings = ClientSettings::from_config(&config.backend, &secrets);
    let lifecycle = Arc::new(ClientLifecycle::new(HttpConnector::new(), settings));

    let addr = resolve_addr(&config.server.listen_addr()).await?;
    let tls = config
        .server
        .tls_paths()
        .map(|(key, cert)| (key.to_path_buf(), cert.to_path_buf()));

    let state = GatewayState::new(lifecycle, config);
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    match tls {
        Some((key, cert)) => serve_tls(addr, app, &cert, &key).await?,
        None => serve(addr, app).await?,
    }

    tracing::info!("Compliance Gateway stopped");
    Ok(())
}

async fn resolve_addr(listen_addr: &str) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    tokio::net::lookup_host(listen_addr)
        .await?
        .next()
        .ok_or_else(|| format!("could not resolve listen address {listen_addr}").into())
}

async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    tracing::info!(listen_addr = %addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn serve_tls(
    addr: SocketAddr,
    app: Router,
    cert: &Path,
    key: &Path,
) -> std::io::Result<()> {
    let tls_config = RustlsConfig::from_pem_file(cert, key).await?;

    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
    });

    tracing::info!(listen_addr = %addr, cert = %cert.display(), "Starting HTTPS server");
    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

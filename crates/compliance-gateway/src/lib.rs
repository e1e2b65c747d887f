//! HTTP gateway in front of the compliance-data backend.
//!
//! This crate provides a stable REST surface over the backend's workspaces,
//! relations and vaults. It handles:
//!
//! - Layered configuration (TOML file + environment, secrets env-only)
//! - One lazily created, shared, authenticated backend client
//! - Uniform request validation, forwarding and error mapping
//! - Health reporting based on the backend client lifecycle
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ HTTP
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    compliance-gateway                       │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Router +   │ │  Gateway    │ │  Health / Internal  │    │
//! │  │  Handlers   │ │  (validate, │ │  (check, reset)     │    │
//! │  │             │ │   forward)  │ │                     │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! │                  ┌─────────────────────┐                    │
//! │                  │  ClientLifecycle    │                    │
//! │                  │  (single shared     │                    │
//! │                  │   backend client)   │                    │
//! │                  └─────────────────────┘                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                   ┌─────────────────────┐
//!                   │  compliance-client  │
//!                   │  (backend over HTTP)│
//!                   └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use compliance_client::HttpConnector;
//! use compliance_gateway::config::{self, Env};
//! use compliance_gateway::{create_router, ClientLifecycle, ClientSettings, GatewayState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let env: Env = std::env::vars().collect();
//! let (config, secrets) = config::load(&env)?;
//!
//! let settings = ClientSettings::from_config(&config.backend, &secrets);
//! let lifecycle = Arc::new(ClientLifecycle::new(HttpConnector::new(), settings));
//!
//! let app = create_router(GatewayState::new(lifecycle, config));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod lifecycle;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::{ConfigError, ResolvedConfig, Secrets};
pub use error::{ApiError, ErrorKind, NormalizedError};
pub use gateway::RequestContext;
pub use lifecycle::{ClientLifecycle, ClientSettings, LifecycleError, LifecycleState};
pub use routes::create_router;
pub use state::GatewayState;

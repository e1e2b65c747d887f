//! Client for the remote compliance-data backend.
//!
//! This crate is the collaborator the gateway delegates every domain
//! operation to: workspaces, business types, relations, vaults, encrypted
//! answers and files. It owns the backend's wire format, authentication and
//! retry/backoff behavior.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  connect(options)  ┌──────────────────┐
//! │   Gateway        │───────────────────▶│ BackendConnector │
//! │   (lifecycle)    │                    │ (trait)          │
//! └────────┬─────────┘                    └────────┬─────────┘
//!          │ operations                            │ creates
//!          ▼                                       ▼
//! ┌──────────────────┐                    ┌──────────────────┐
//! │ ComplianceBackend│◀───────────────────│ HttpBackendClient│
//! │ (trait)          │                    │ (reqwest)        │
//! └──────────────────┘                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use compliance_client::{
//!     BackendConnector, ComplianceBackend, ConnectOptions, Credentials, HttpConnector,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ConnectOptions {
//!     credentials: Credentials::new("token"),
//!     base_url_template: "https://{service}.backend.example.com".to_string(),
//!     timeout: Duration::from_secs(30),
//!     retries: 3,
//!     on_unauthorized: Arc::new(|| eprintln!("token rejected")),
//! };
//!
//! let client = HttpConnector::new().connect(options).await?;
//! let workspace = client.get_workspace_details("6ba7b810-9dad-11d1-80b4-00c04fd430c8").await?;
//! println!("{workspace}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod credentials;
pub mod error;
pub mod http;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use backend::{
    BackendConnector, ByteStream, ComplianceBackend, ConnectOptions, NewVault,
    UnauthorizedCallback,
};
pub use credentials::Credentials;
pub use secrecy::{ExposeSecret, SecretString};
pub use error::{BackendError, Result};
pub use http::{HttpBackendClient, HttpConnector, Service};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{InMemoryBackend, InMemoryClient, InMemoryConnector};

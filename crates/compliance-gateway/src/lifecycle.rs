//! Backend client lifecycle.
//!
//! The gateway talks to the backend through a single shared client. This
//! module owns that client and the state machine around it:
//!
//! - `Absent` → `Initializing` on the first `get_client()` call
//! - `Initializing` → `Ready` when the connect attempt succeeds
//! - `Initializing` → `Absent` when it fails (failures are never cached)
//! - `Ready` → `Absent` on `reset()`
//!
//! Callers that arrive while an attempt is in flight attach to the same
//! shared future, so the backend sees exactly one handshake no matter how
//! many requests race for the first client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use compliance_client::{BackendConnector, ConnectOptions, Credentials, UnauthorizedCallback};

use crate::config::{BackendConfig, Secrets};

/// Errors from lazily creating the backend client.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// No access token was configured.
    #[error("backend access token is not configured")]
    MissingToken,

    /// The connector failed (handshake rejected, backend unreachable).
    #[error("backend client initialization failed: {0}")]
    Initialization(String),
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No client exists.
    Absent,
    /// A connect attempt is in flight.
    Initializing,
    /// A client is available.
    Ready,
}

/// Settings the lifecycle hands to the connector on every attempt.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Credentials, or `None` when no token is configured.
    pub credentials: Option<Credentials>,
    /// Base URL with a `{service}` placeholder.
    pub base_url_template: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries for retriable failures.
    pub retries: u32,
}

impl ClientSettings {
    /// Build settings from resolved configuration and secrets.
    #[must_use]
    pub fn from_config(backend: &BackendConfig, secrets: &Secrets) -> Self {
        Self {
            credentials: secrets.credentials(),
            base_url_template: backend.base_url_template.clone(),
            timeout: backend.timeout(),
            retries: backend.retries,
        }
    }
}

type Attempt<C> = Shared<BoxFuture<'static, Result<Arc<C>, LifecycleError>>>;

enum Slot<C> {
    Absent,
    Initializing { id: u64, attempt: Attempt<C> },
    Ready(Arc<C>),
}

struct Inner<C> {
    slot: Slot<C>,
    next_attempt: u64,
}

/// Owner of the single shared backend client.
pub struct ClientLifecycle<B: BackendConnector> {
    connector: Arc<B>,
    settings: ClientSettings,
    inner: Mutex<Inner<B::Client>>,
    unauthorized: Arc<AtomicU64>,
    unauthorized_hook: Option<UnauthorizedCallback>,
}

impl<B: BackendConnector> ClientLifecycle<B> {
    /// Create a lifecycle in the `Absent` state. Nothing is contacted yet.
    #[must_use]
    pub fn new(connector: B, settings: ClientSettings) -> Self {
        Self {
            connector: Arc::new(connector),
            settings,
            inner: Mutex::new(Inner {
                slot: Slot::Absent,
                next_attempt: 0,
            }),
            unauthorized: Arc::new(AtomicU64::new(0)),
            unauthorized_hook: None,
        }
    }

    /// Add a hook called whenever the backend rejects the current token.
    ///
    /// The hook is for monitoring; it must not reset the client.
    #[must_use]
    pub fn with_unauthorized_hook(mut self, hook: UnauthorizedCallback) -> Self {
        self.unauthorized_hook = Some(hook);
        self
    }

    /// Get the shared client, creating it if necessary.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError` if no token is configured or the connector
    /// fails. The lifecycle is then back in `Absent`, so the next call
    /// retries.
    pub async fn get_client(&self) -> Result<Arc<B::Client>, LifecycleError> {
        let (id, attempt) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match &inner.slot {
                Slot::Ready(client) => return Ok(Arc::clone(client)),
                Slot::Initializing { id, attempt } => (*id, attempt.clone()),
                Slot::Absent => {
                    inner.next_attempt += 1;
                    let id = inner.next_attempt;
                    let attempt = self.start_attempt(id);
                    inner.slot = Slot::Initializing {
                        id,
                        attempt: attempt.clone(),
                    };
                    (id, attempt)
                }
            }
        };

        let result = attempt.await;
        self.settle(id, &result);
        result
    }

    /// Drop the current client, whatever the state.
    ///
    /// An attempt in flight still completes for its waiters, but its result
    /// is not cached. Returns the state before the reset.
    pub fn reset(&self) -> LifecycleState {
        let mut inner = self.inner.lock();
        let previous = state_of(&inner.slot);
        inner.slot = Slot::Absent;
        if previous == LifecycleState::Initializing {
            tracing::info!("Backend client reset; the attempt in flight will not be cached");
        } else {
            tracing::info!(previous = ?previous, "Backend client reset");
        }
        previous
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        state_of(&self.inner.lock().slot)
    }

    /// How many times the backend has rejected the token.
    #[must_use]
    pub fn unauthorized_count(&self) -> u64 {
        self.unauthorized.load(Ordering::Relaxed)
    }

    fn start_attempt(&self, id: u64) -> Attempt<B::Client> {
        let connector = Arc::clone(&self.connector);
        let credentials = self.settings.credentials.clone();
        let base_url_template = self.settings.base_url_template.clone();
        let timeout = self.settings.timeout;
        let retries = self.settings.retries;
        let on_unauthorized = self.unauthorized_callback();

        async move {
            let Some(credentials) = credentials else {
                tracing::error!(attempt = id, "Cannot initialize backend client without an access token");
                return Err(LifecycleError::MissingToken);
            };

            tracing::info!(attempt = id, base_url_template = %base_url_template, "Initializing backend client");
            let started = Instant::now();
            let options = ConnectOptions {
                credentials,
                base_url_template,
                timeout,
                retries,
                on_unauthorized,
            };

            match connector.connect(options).await {
                Ok(client) => {
                    tracing::info!(
                        attempt = id,
                        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Backend client ready"
                    );
                    Ok(Arc::new(client))
                }
                Err(err) => {
                    tracing::error!(attempt = id, error = %err, "Backend client initialization failed");
                    Err(LifecycleError::Initialization(err.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Record the outcome of attempt `id`, unless it was superseded.
    fn settle(&self, id: u64, result: &Result<Arc<B::Client>, LifecycleError>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let current = matches!(&inner.slot, Slot::Initializing { id: slot_id, .. } if *slot_id == id);
        if current {
            inner.slot = match result {
                Ok(client) => Slot::Ready(Arc::clone(client)),
                Err(_) => Slot::Absent,
            };
        }
    }

    fn unauthorized_callback(&self) -> UnauthorizedCallback {
        let count = Arc::clone(&self.unauthorized);
        let hook = self.unauthorized_hook.clone();
        Arc::new(move || {
            let total = count.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(total, "Backend rejected the access token");
            if let Some(hook) = &hook {
                hook();
            }
        })
    }
}

fn state_of<C>(slot: &Slot<C>) -> LifecycleState {
    match slot {
        Slot::Absent => LifecycleState::Absent,
        Slot::Initializing { .. } => LifecycleState::Initializing,
        Slot::Ready(_) => LifecycleState::Ready,
    }
}

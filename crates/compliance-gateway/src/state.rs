//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use compliance_client::BackendConnector;

use crate::config::ResolvedConfig;
use crate::lifecycle::ClientLifecycle;

/// Shared application state for the gateway.
///
/// Owned by the composition root and handed to the router; the lifecycle is
/// the only mutable piece and it synchronizes itself.
pub struct GatewayState<B>
where
    B: BackendConnector,
{
    /// Owner of the shared backend client.
    pub lifecycle: Arc<ClientLifecycle<B>>,
    /// Resolved configuration.
    pub config: Arc<ResolvedConfig>,
}

impl<B> GatewayState<B>
where
    B: BackendConnector,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(lifecycle: Arc<ClientLifecycle<B>>, config: ResolvedConfig) -> Self {
        Self {
            lifecycle,
            config: Arc::new(config),
        }
    }
}

impl<B> Clone for GatewayState<B>
where
    B: BackendConnector,
{
    fn clone(&self) -> Self {
        Self {
            lifecycle: Arc::clone(&self.lifecycle),
            config: Arc::clone(&self.config),
        }
    }
}

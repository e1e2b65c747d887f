//! Credentials used to authenticate against the backend.
//!
//! Secret values are held as [`SecretString`], whose `Debug` output never
//! contains the underlying value. Read them with [`ExposeSecret`] only at the
//! point of use.

use std::collections::HashMap;

use secrecy::SecretString;

/// Credentials handed to a connector when a client is created.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Bearer token for every backend request.
    pub access_token: SecretString,
    /// Per-workspace decryption keys, keyed by workspace UUID.
    pub decryption_keys: HashMap<String, SecretString>,
}

impl Credentials {
    /// Create credentials with only an access token.
    #[must_use]
    pub fn new(access_token: impl Into<SecretString>) -> Self {
        Self {
            access_token: access_token.into(),
            decryption_keys: HashMap::new(),
        }
    }

    /// Attach per-workspace decryption keys.
    #[must_use]
    pub fn with_decryption_keys(mut self, keys: HashMap<String, SecretString>) -> Self {
        self.decryption_keys = keys;
        self
    }

    /// Look up the decryption key for a workspace.
    #[must_use]
    pub fn decryption_key(&self, workspace_uuid: &str) -> Option<&SecretString> {
        self.decryption_keys.get(workspace_uuid)
    }
}

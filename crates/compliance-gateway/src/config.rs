//! Gateway configuration.
//!
//! Settings come from two layers: a TOML file with non-secret defaults and
//! environment variables that override it field by field. Secrets are only
//! ever read from the environment.
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `CONFIG_FILE` | path of the TOML file | `config/default.toml` |
//! | `PORT` | `server.port` | `3000` |
//! | `HOST` | `server.host` | `0.0.0.0` |
//! | `TLS_ENABLED` | `server.tls_enabled` | `false` |
//! | `TLS_KEY_PATH` | `server.key_path` | unset |
//! | `TLS_CERT_PATH` | `server.cert_path` | unset |
//! | `BACKEND_URL_TEMPLATE` | `backend.base_url_template` | `https://{service}.backend.example.com` |
//! | `BACKEND_TIMEOUT_MS` | `backend.timeout_ms` | `30000` |
//! | `BACKEND_RETRIES` | `backend.retries` | `3` |
//! | `LOG_LEVEL` | `logging.level` | `info` |
//! | `LOG_FORMAT` | `logging.format` (`json` or `pretty`) | `pretty` |
//! | `CORS_ENABLED` | `cors.enabled` | `true` |
//! | `CORS_ORIGIN` | `cors.origin` | `*` |
//! | `BACKEND_ACCESS_TOKEN` | secret access token | unset |
//! | `BACKEND_DECRYPTION_KEYS` | secret JSON object `{workspace: key}` | empty |

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use axum::http::{HeaderValue, Uri};
use compliance_client::http::SERVICE_PLACEHOLDER;
use compliance_client::{Credentials, SecretString};
use serde::Deserialize;
use thiserror::Error;

/// Environment variables as a plain map, so resolution stays a pure function.
pub type Env = HashMap<String, String>;

/// Config file used when `CONFIG_FILE` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Path of the TOML config file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
/// Listener port.
pub const PORT_ENV: &str = "PORT";
/// Listener host.
pub const HOST_ENV: &str = "HOST";
/// Serve HTTPS instead of HTTP.
pub const TLS_ENABLED_ENV: &str = "TLS_ENABLED";
/// PEM private key for TLS.
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
/// PEM certificate chain for TLS.
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
/// Backend base URL with a `{service}` placeholder.
pub const BACKEND_URL_TEMPLATE_ENV: &str = "BACKEND_URL_TEMPLATE";
/// Backend request timeout in milliseconds.
pub const BACKEND_TIMEOUT_MS_ENV: &str = "BACKEND_TIMEOUT_MS";
/// Retries for retriable backend failures.
pub const BACKEND_RETRIES_ENV: &str = "BACKEND_RETRIES";
/// Log level or filter directive.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
/// Log format, `json` or `pretty`.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
/// Whether CORS headers are sent.
pub const CORS_ENABLED_ENV: &str = "CORS_ENABLED";
/// Allowed origin(s), comma separated, or `*`.
pub const CORS_ORIGIN_ENV: &str = "CORS_ORIGIN";
/// Secret backend access token.
pub const ACCESS_TOKEN_ENV: &str = "BACKEND_ACCESS_TOKEN";
/// Secret per-workspace decryption keys as a JSON object.
pub const DECRYPTION_KEYS_ENV: &str = "BACKEND_DECRYPTION_KEYS";

/// Errors that stop the gateway from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for the expected schema.
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but cannot be used.
    #[error("invalid value {value:?} for {field}: {reason}")]
    InvalidValue {
        /// Environment variable or file field.
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// TLS is enabled without both a key and a certificate.
    #[error("TLS is enabled but {missing} is not set")]
    IncompleteTls {
        /// Which path is missing.
        missing: &'static str,
    },

    /// A secret is present but malformed. The value is never included.
    #[error("invalid secret {name}: {reason}")]
    InvalidSecret {
        /// Environment variable holding the secret.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable output.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err("expected \"json\" or \"pretty\"".to_string()),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listener port.
    pub port: u16,
    /// Listener host.
    pub host: String,
    /// Serve HTTPS.
    pub tls_enabled: bool,
    /// PEM private key, required with TLS.
    pub key_path: Option<PathBuf>,
    /// PEM certificate chain, required with TLS.
    pub cert_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Address to bind, e.g. `0.0.0.0:3000`.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Key and certificate paths, only when TLS is enabled.
    #[must_use]
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        if !self.tls_enabled {
            return None;
        }
        Some((self.key_path.as_deref()?, self.cert_path.as_deref()?))
    }
}

/// Backend client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL with a `{service}` placeholder.
    pub base_url_template: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries for retriable failures.
    pub retries: u32,
}

impl BackendConfig {
    /// Get the backend timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level or `EnvFilter` directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// CORS settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    /// Whether CORS headers are sent.
    pub enabled: bool,
    /// Allowed origin(s), comma separated, or `*`.
    pub origin: String,
}

impl CorsConfig {
    /// The configured origins, trimmed, with empty entries dropped.
    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.origin.split(',').map(str::trim).filter(|o| !o.is_empty())
    }
}

/// Immutable settings built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Listener settings.
    pub server: ServerConfig,
    /// Backend client settings.
    pub backend: BackendConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// CORS settings.
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            tls_enabled: false,
            key_path: None,
            cert_path: None,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url_template: "https://{service}.backend.example.com".to_string(),
            timeout_ms: 30_000,
            retries: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origin: "*".to_string(),
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// Secret material, sourced only from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    /// Backend access token. Its absence surfaces when the client is first needed.
    pub access_token: Option<SecretString>,
    /// Per-workspace decryption keys.
    pub decryption_keys: HashMap<String, SecretString>,
}

impl Secrets {
    /// Build client credentials, if a token is configured.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.access_token.as_ref().map(|token| {
            Credentials::new(token.clone()).with_decryption_keys(self.decryption_keys.clone())
        })
    }
}

// =============================================================================
// File layer
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    backend: FileBackend,
    #[serde(default)]
    logging: FileLogging,
    #[serde(default)]
    cors: FileCors,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileServer {
    port: Option<u16>,
    host: Option<String>,
    tls_enabled: Option<bool>,
    key_path: Option<PathBuf>,
    cert_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileBackend {
    base_url_template: Option<String>,
    timeout_ms: Option<u64>,
    retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileCors {
    enabled: Option<bool>,
    origin: Option<String>,
}

// =============================================================================
// Resolution
// =============================================================================

/// Read the config file and environment of this process.
///
/// # Errors
///
/// Returns a `ConfigError` for any unreadable, malformed, or inconsistent
/// setting.
pub fn load(env: &Env) -> Result<(ResolvedConfig, Secrets), ConfigError> {
    let (path, explicit) = match env_value(env, CONFIG_FILE_ENV) {
        Some(path) => (PathBuf::from(path), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    let contents = read_config_file(&path, explicit)?;
    let config = resolve(contents.as_deref(), env)?;
    let secrets = resolve_secrets(env)?;
    Ok((config, secrets))
}

/// Read a config file. A missing file is only an error when it was asked for.
///
/// # Errors
///
/// Returns `ConfigError::Io` if the file cannot be read.
pub fn read_config_file(path: &Path, explicit: bool) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(None)
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Merge file contents and environment into one `ResolvedConfig`.
///
/// For each field a parseable environment value wins, then the file value,
/// then the default.
///
/// # Errors
///
/// Returns a `ConfigError` if the file is malformed, a value does not parse,
/// or TLS is only partially configured.
pub fn resolve(file_contents: Option<&str>, env: &Env) -> Result<ResolvedConfig, ConfigError> {
    let file: FileConfig = match file_contents {
        Some(contents) => toml::from_str(contents)?,
        None => FileConfig::default(),
    };

    let defaults = ResolvedConfig::default();

    let server = ServerConfig {
        port: layered(env, PORT_ENV, file.server.port, parse_number)?
            .unwrap_or(defaults.server.port),
        host: layered(env, HOST_ENV, file.server.host, parse_string)?
            .unwrap_or(defaults.server.host),
        tls_enabled: layered(env, TLS_ENABLED_ENV, file.server.tls_enabled, parse_bool)?
            .unwrap_or(defaults.server.tls_enabled),
        key_path: layered(env, TLS_KEY_PATH_ENV, file.server.key_path, parse_path)?,
        cert_path: layered(env, TLS_CERT_PATH_ENV, file.server.cert_path, parse_path)?,
    };

    let backend = BackendConfig {
        base_url_template: layered(
            env,
            BACKEND_URL_TEMPLATE_ENV,
            file.backend.base_url_template,
            parse_string,
        )?
        .unwrap_or(defaults.backend.base_url_template),
        timeout_ms: layered(env, BACKEND_TIMEOUT_MS_ENV, file.backend.timeout_ms, parse_number)?
            .unwrap_or(defaults.backend.timeout_ms),
        retries: layered(env, BACKEND_RETRIES_ENV, file.backend.retries, parse_number)?
            .unwrap_or(defaults.backend.retries),
    };

    let logging = LoggingConfig {
        level: layered(env, LOG_LEVEL_ENV, file.logging.level, parse_string)?
            .unwrap_or(defaults.logging.level),
        format: layered(env, LOG_FORMAT_ENV, file.logging.format, LogFormat::from_str)?
            .unwrap_or(defaults.logging.format),
    };

    let cors = CorsConfig {
        enabled: layered(env, CORS_ENABLED_ENV, file.cors.enabled, parse_bool)?
            .unwrap_or(defaults.cors.enabled),
        origin: layered(env, CORS_ORIGIN_ENV, file.cors.origin, parse_string)?
            .unwrap_or(defaults.cors.origin),
    };

    let config = ResolvedConfig {
        server,
        backend,
        logging,
        cors,
    };
    validate(&config)?;
    Ok(config)
}

/// Read secrets from the environment.
///
/// # Errors
///
/// Returns `ConfigError::InvalidSecret` if the decryption keys are not a JSON
/// object of strings.
pub fn resolve_secrets(env: &Env) -> Result<Secrets, ConfigError> {
    let access_token = env_value(env, ACCESS_TOKEN_ENV).map(SecretString::from);

    let decryption_keys = match env_value(env, DECRYPTION_KEYS_ENV) {
        Some(raw) => serde_json::from_str::<HashMap<String, String>>(raw)
            .map_err(|_| ConfigError::InvalidSecret {
                name: DECRYPTION_KEYS_ENV,
                reason: "expected a JSON object mapping workspace UUIDs to key strings"
                    .to_string(),
            })?
            .into_iter()
            .map(|(workspace, key)| (workspace, SecretString::from(key)))
            .collect(),
        None => HashMap::new(),
    };

    Ok(Secrets {
        access_token,
        decryption_keys,
    })
}

fn validate(config: &ResolvedConfig) -> Result<(), ConfigError> {
    if config.server.tls_enabled {
        if config.server.key_path.is_none() {
            return Err(ConfigError::IncompleteTls {
                missing: TLS_KEY_PATH_ENV,
            });
        }
        if config.server.cert_path.is_none() {
            return Err(ConfigError::IncompleteTls {
                missing: TLS_CERT_PATH_ENV,
            });
        }
    }

    let template = &config.backend.base_url_template;
    if !template.contains(SERVICE_PLACEHOLDER) {
        return Err(invalid(
            BACKEND_URL_TEMPLATE_ENV,
            template,
            format!("must contain {SERVICE_PLACEHOLDER}"),
        ));
    }
    if !(template.starts_with("http://") || template.starts_with("https://")) {
        return Err(invalid(
            BACKEND_URL_TEMPLATE_ENV,
            template,
            "must start with http:// or https://",
        ));
    }

    if config.backend.timeout_ms == 0 {
        return Err(invalid(BACKEND_TIMEOUT_MS_ENV, "0", "must be greater than zero"));
    }

    if config.cors.enabled {
        for origin in config.cors.origins() {
            check_origin(origin).map_err(|reason| invalid(CORS_ORIGIN_ENV, origin, reason))?;
        }
    }

    Ok(())
}

/// An allowed origin is `*` or `scheme://host[:port]` with no path.
fn check_origin(origin: &str) -> Result<(), &'static str> {
    if origin == "*" {
        return Ok(());
    }
    if HeaderValue::from_str(origin).is_err() {
        return Err("not a valid header value");
    }
    let uri: Uri = origin
        .parse()
        .map_err(|_| "expected an origin such as https://app.example.com")?;
    match (uri.scheme_str(), uri.authority()) {
        (Some("http" | "https"), Some(_)) if uri.path() == "/" && uri.query().is_none() => {
            if origin.ends_with('/') {
                Err("an origin has no trailing slash")
            } else {
                Ok(())
            }
        }
        _ => Err("expected an origin such as https://app.example.com"),
    }
}

fn invalid(field: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// A set, non-blank environment variable.
fn env_value<'a>(env: &'a Env, name: &str) -> Option<&'a str> {
    env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Pick the environment value if present, else the file value.
///
/// A present environment value that does not parse is an error, never a
/// silent fallback.
fn layered<T, E>(
    env: &Env,
    name: &'static str,
    file_value: Option<T>,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Result<Option<T>, ConfigError>
where
    E: fmt::Display,
{
    match env_value(env, name) {
        Some(raw) => parse(raw)
            .map(Some)
            .map_err(|e| invalid(name, raw, e.to_string())),
        None => Ok(file_value),
    }
}

fn parse_number<T>(raw: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>().map_err(|e| e.to_string())
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err("expected true/false, 1/0 or yes/no".to_string()),
    }
}

#[allow(clippy::unnecessary_wraps)]
fn parse_string(raw: &str) -> Result<String, String> {
    Ok(raw.to_string())
}

#[allow(clippy::unnecessary_wraps)]
fn parse_path(raw: &str) -> Result<PathBuf, String> {
    Ok(PathBuf::from(raw))
}

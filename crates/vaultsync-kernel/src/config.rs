//! Layered configuration.
//!
//! Settings are addressed by dotted keys (`sync.base_url`) and resolved
//! through an ordered list of named providers; the first provider holding a
//! non-empty value wins:
//!
//! 1. [`OverrideProvider`]: explicit `--set key=value` overrides
//! 2. [`EnvProvider`]: `VAULTSYNC_*` environment variables
//! 3. [`FileProvider`]: the persisted TOML settings file
//! 4. [`DefaultsProvider`]: compiled-in defaults
//!
//! [`AppConfig::resolve`] turns the layered view into typed settings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vaultsync_auth::OAuthConfig;
use vaultsync_auth::oauth::{DEFAULT_SCOPES, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL};
use vaultsync_auth::DEFAULT_LOOPBACK_PORT;
use vaultsync_sync::DEFAULT_SYNC_TIMEOUT;

use crate::error::{KernelError, Result};

/// Setting keys understood by [`AppConfig::resolve`].
pub mod keys {
    pub const OAUTH_CLIENT_ID: &str = "oauth.client_id";
    pub const OAUTH_CLIENT_SECRET: &str = "oauth.client_secret";
    pub const OAUTH_SCOPES: &str = "oauth.scopes";
    pub const OAUTH_AUTH_URL: &str = "oauth.auth_url";
    pub const OAUTH_TOKEN_URL: &str = "oauth.token_url";
    pub const OAUTH_LOOPBACK_PORT: &str = "oauth.loopback_port";
    pub const OAUTH_CALLBACK_TIMEOUT_SECS: &str = "oauth.callback_timeout_secs";
    pub const SYNC_BASE_URL: &str = "sync.base_url";
    pub const SYNC_BEARER_TOKEN: &str = "sync.bearer_token";
    pub const SYNC_USER_ID: &str = "sync.user_id";
    pub const SYNC_DEVICE_ID: &str = "sync.device_id";
    pub const SYNC_TIMEOUT_MS: &str = "sync.timeout_ms";
    pub const STORAGE_DATA_DIR: &str = "storage.data_dir";
    pub const LOG_LEVEL: &str = "log_level";

    /// Every key, in display order.
    pub const ALL: &[&str] = &[
        OAUTH_CLIENT_ID,
        OAUTH_CLIENT_SECRET,
        OAUTH_SCOPES,
        OAUTH_AUTH_URL,
        OAUTH_TOKEN_URL,
        OAUTH_LOOPBACK_PORT,
        OAUTH_CALLBACK_TIMEOUT_SECS,
        SYNC_BASE_URL,
        SYNC_BEARER_TOKEN,
        SYNC_USER_ID,
        SYNC_DEVICE_ID,
        SYNC_TIMEOUT_MS,
        STORAGE_DATA_DIR,
        LOG_LEVEL,
    ];

    /// Keys whose values must not be printed.
    pub fn is_secret(key: &str) -> bool {
        matches!(key, OAUTH_CLIENT_SECRET | SYNC_BEARER_TOKEN)
    }
}

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VAULTSYNC_";

/// Default settings file name inside the data directory.
pub const SETTINGS_FILE: &str = "settings.toml";

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// A named source of setting values.
pub trait ConfigProvider: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory values, used for command-line overrides.
#[derive(Debug, Default, Clone)]
pub struct OverrideProvider {
    values: HashMap<String, String>,
}

impl OverrideProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Parse `key=value` assignments.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut provider = Self::new();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let Some((key, value)) = assignment.split_once('=') else {
                return Err(KernelError::InvalidSetting {
                    key: assignment.to_string(),
                    reason: "expected key=value".into(),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(KernelError::InvalidSetting {
                    key: assignment.to_string(),
                    reason: "empty key".into(),
                });
            }
            provider.set(key, value.trim());
        }
        Ok(provider)
    }
}

impl ConfigProvider for OverrideProvider {
    fn name(&self) -> &str {
        "override"
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// `VAULTSYNC_*` variables; `sync.base_url` reads `VAULTSYNC_SYNC_BASE_URL`.
#[derive(Debug, Clone)]
pub struct EnvProvider {
    prefix: String,
    vars: HashMap<String, String>,
}

impl EnvProvider {
    /// Snapshot the process environment.
    pub fn from_process() -> Self {
        let vars = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        Self::with_vars(vars)
    }

    /// Use an explicit variable map instead of the process environment.
    pub fn with_vars(vars: HashMap<String, String>) -> Self {
        Self {
            prefix: ENV_PREFIX.to_string(),
            vars,
        }
    }

    /// The variable name backing `key`.
    pub fn var_name(&self, key: &str) -> String {
        let suffix: String = key
            .chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{suffix}", self.prefix)
    }
}

impl ConfigProvider for EnvProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(&self.var_name(key)).cloned()
    }
}

/// A TOML settings file; dotted keys address nested tables.
///
/// A missing or unparseable file yields an empty provider.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
    table: toml::Table,
}

impl FileProvider {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let table = match std::fs::read_to_string(&path) {
            Ok(content) => match content.parse::<toml::Table>() {
                Ok(table) => {
                    tracing::debug!(path = %path.display(), "loaded settings file");
                    table
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable settings file");
                    toml::Table::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read settings file");
                toml::Table::new()
            }
        };
        Self { path, table }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl ConfigProvider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut parts = key.split('.');
        let mut value = self.table.get(parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        toml_scalar(value)
    }
}

fn toml_scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(toml_scalar)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        toml::Value::Datetime(dt) => Some(dt.to_string()),
        toml::Value::Table(_) => None,
    }
}

/// Compiled-in defaults.
#[derive(Debug, Clone)]
pub struct DefaultsProvider {
    values: HashMap<String, String>,
}

impl DefaultsProvider {
    pub fn standard() -> Self {
        let values = [
            (keys::OAUTH_SCOPES, DEFAULT_SCOPES.join(" ")),
            (keys::OAUTH_AUTH_URL, GOOGLE_AUTH_URL.to_string()),
            (keys::OAUTH_TOKEN_URL, GOOGLE_TOKEN_URL.to_string()),
            (keys::OAUTH_LOOPBACK_PORT, DEFAULT_LOOPBACK_PORT.to_string()),
            (keys::OAUTH_CALLBACK_TIMEOUT_SECS, "300".to_string()),
            (keys::SYNC_USER_ID, "default-user".to_string()),
            (keys::SYNC_DEVICE_ID, default_device_id()),
            (
                keys::SYNC_TIMEOUT_MS,
                DEFAULT_SYNC_TIMEOUT.as_millis().to_string(),
            ),
            (
                keys::STORAGE_DATA_DIR,
                default_data_dir().display().to_string(),
            ),
            (keys::LOG_LEVEL, "info".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { values }
    }
}

impl ConfigProvider for DefaultsProvider {
    fn name(&self) -> &str {
        "defaults"
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Device identifier used when none is configured.
pub fn default_device_id() -> String {
    format!("vaultsync-{}", std::env::consts::OS)
}

/// The platform-local data directory, or `./.vaultsync` when the platform
/// gives no hint.
pub fn default_data_dir() -> PathBuf {
    let env_dir = |name: &str| {
        std::env::var_os(name)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    };

    let base = if cfg!(windows) {
        env_dir("LOCALAPPDATA")
    } else if cfg!(target_os = "macos") {
        env_dir("HOME").map(|h| h.join("Library").join("Application Support"))
    } else {
        env_dir("XDG_DATA_HOME").or_else(|| env_dir("HOME").map(|h| h.join(".local").join("share")))
    };

    match base {
        Some(base) => base.join("vaultsync"),
        None => PathBuf::from(".vaultsync"),
    }
}

// ---------------------------------------------------------------------------
// Layered view
// ---------------------------------------------------------------------------

/// Ordered providers queried front to back.
#[derive(Default)]
pub struct LayeredConfig {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl LayeredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider with lower precedence than those already added.
    pub fn with_provider(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// The standard chain: overrides, environment, settings file, defaults.
    pub fn standard(overrides: OverrideProvider, env: EnvProvider, file: FileProvider) -> Self {
        Self::new()
            .with_provider(overrides)
            .with_provider(env)
            .with_provider(file)
            .with_provider(DefaultsProvider::standard())
    }

    /// The first non-empty value for `key` and the provider that supplied it.
    pub fn lookup(&self, key: &str) -> Option<(String, &str)> {
        self.providers.iter().find_map(|p| {
            p.get(key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| (v, p.name()))
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lookup(key).map(|(value, _)| value)
    }

    /// Name of the provider that answers for `key`.
    pub fn source(&self, key: &str) -> Option<&str> {
        self.lookup(key).map(|(_, source)| source)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| KernelError::InvalidSetting {
                    key: key.to_string(),
                    reason: format!("'{raw}': {e}"),
                })
            })
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Typed settings
// ---------------------------------------------------------------------------

/// OAuth settings.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub loopback_port: u16,
    pub callback_timeout: Duration,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("loopback_port", &self.loopback_port)
            .field("callback_timeout", &self.callback_timeout)
            .finish()
    }
}

/// Remote sync settings. No `base_url` means sync is skipped.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub base_url: Option<String>,
    pub bearer_token: Option<String>,
    pub user_id: String,
    pub device_id: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for SyncSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSettings")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Fully resolved application settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub oauth: OAuthSettings,
    pub sync: SyncSettings,
    pub data_dir: PathBuf,
    pub log_level: String,
}

impl AppConfig {
    pub fn resolve(config: &LayeredConfig) -> Result<Self> {
        let text = |key: &str| config.get(key).map(|v| v.trim().to_string());

        let scopes = text(keys::OAUTH_SCOPES)
            .map(|raw| {
                raw.split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect());

        let oauth = OAuthSettings {
            client_id: text(keys::OAUTH_CLIENT_ID),
            client_secret: text(keys::OAUTH_CLIENT_SECRET),
            scopes,
            auth_url: text(keys::OAUTH_AUTH_URL).unwrap_or_else(|| GOOGLE_AUTH_URL.into()),
            token_url: text(keys::OAUTH_TOKEN_URL).unwrap_or_else(|| GOOGLE_TOKEN_URL.into()),
            loopback_port: config
                .parse(keys::OAUTH_LOOPBACK_PORT)?
                .unwrap_or(DEFAULT_LOOPBACK_PORT),
            callback_timeout: Duration::from_secs(
                config.parse(keys::OAUTH_CALLBACK_TIMEOUT_SECS)?.unwrap_or(300),
            ),
        };

        let timeout_ms: u64 = config
            .parse(keys::SYNC_TIMEOUT_MS)?
            .unwrap_or(DEFAULT_SYNC_TIMEOUT.as_millis() as u64);
        if timeout_ms == 0 {
            return Err(KernelError::InvalidSetting {
                key: keys::SYNC_TIMEOUT_MS.into(),
                reason: "must be greater than zero".into(),
            });
        }

        let sync = SyncSettings {
            base_url: text(keys::SYNC_BASE_URL),
            bearer_token: text(keys::SYNC_BEARER_TOKEN),
            user_id: text(keys::SYNC_USER_ID).unwrap_or_else(|| "default-user".into()),
            device_id: text(keys::SYNC_DEVICE_ID).unwrap_or_else(default_device_id),
            timeout: Duration::from_millis(timeout_ms),
        };

        Ok(Self {
            oauth,
            sync,
            data_dir: text(keys::STORAGE_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            log_level: text(keys::LOG_LEVEL).unwrap_or_else(|| "info".into()),
        })
    }

    /// OAuth client settings; fails when no client id is configured.
    pub fn oauth_config(&self) -> Result<OAuthConfig> {
        let Some(client_id) = self.oauth.client_id.clone() else {
            return Err(KernelError::MissingSetting {
                key: keys::OAUTH_CLIENT_ID.into(),
            });
        };
        Ok(OAuthConfig {
            client_id,
            client_secret: self.oauth.client_secret.clone(),
            auth_url: self.oauth.auth_url.clone(),
            token_url: self.oauth.token_url.clone(),
            scopes: self.oauth.scopes.clone(),
            loopback_port: self.oauth.loopback_port,
            callback_timeout: self.oauth.callback_timeout,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Shared helpers for the vaultsync CLI: tracing setup, configuration
//! loading, and the platform capabilities the kernel consumes.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing_subscriber::EnvFilter;
use vaultsync_kernel::config::{SETTINGS_FILE, keys};
use vaultsync_kernel::{
    AppConfig, BrowserLauncher, DefaultsProvider, EnvProvider, FileProvider, LayeredConfig,
    OverrideProvider, PasskeySecretProvider, VaultSyncOrchestrator,
};
use vaultsync_vault::{
    KeychainSecretBox, SecretBox, StaticSecretProvider, UnavailableSecretProvider,
    platform_keychain,
};

use crate::cli::Cli;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins; otherwise `default_level` applies.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Resolved settings plus the layered view they came from.
pub struct Settings {
    pub layered: LayeredConfig,
    pub app: AppConfig,
    pub settings_path: PathBuf,
}

/// Build the provider chain from the command line, the environment and the
/// settings file.
///
/// Without `--config`, the settings file is looked up in the data directory
/// as resolved from overrides, environment and defaults.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let overrides = OverrideProvider::from_assignments(&cli.overrides)
        .context("invalid --set override")?;
    let env = EnvProvider::from_process();

    let settings_path = match &cli.config {
        Some(path) => path.clone(),
        None => {
            let bootstrap = LayeredConfig::new()
                .with_provider(overrides.clone())
                .with_provider(env.clone())
                .with_provider(DefaultsProvider::standard());
            let data_dir = bootstrap
                .get(keys::STORAGE_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(vaultsync_kernel::config::default_data_dir);
            data_dir.join(SETTINGS_FILE)
        }
    };

    let layered = LayeredConfig::standard(overrides, env, FileProvider::load(&settings_path));
    let app = AppConfig::resolve(&layered).context("failed to resolve settings")?;
    Ok(Settings {
        layered,
        app,
        settings_path,
    })
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Opens URLs with the platform's default browser.
pub struct SystemBrowser;

#[async_trait]
impl BrowserLauncher for SystemBrowser {
    async fn open(&self, url: &str) -> vaultsync_auth::Result<()> {
        eprintln!("  Opening the browser for sign-in. If it does not open, visit:");
        eprintln!("  {url}");

        let spawned = if cfg!(target_os = "macos") {
            Command::new("open").arg(url).spawn()
        } else if cfg!(windows) {
            Command::new("rundll32")
                .args(["url.dll,FileProtocolHandler", url])
                .spawn()
        } else {
            Command::new("xdg-open").arg(url).spawn()
        };

        if let Err(e) = spawned {
            // The URL is printed above, so the user can still finish.
            tracing::warn!(error = %e, "could not launch a browser");
        }
        Ok(())
    }
}

/// The passkey capability for this invocation.
///
/// A secret file stands in for the platform passkey ceremony; without one the
/// vault is sealed with the device key only.
pub fn passkey_provider(secret_file: Option<&Path>) -> Result<Arc<dyn PasskeySecretProvider>> {
    match secret_file {
        Some(path) => {
            let mut secret = std::fs::read(path)
                .with_context(|| format!("failed to read passkey secret {}", path.display()))?;
            while secret.last().is_some_and(|b| matches!(b, b'\n' | b'\r')) {
                secret.pop();
            }
            Ok(Arc::new(StaticSecretProvider::new(secret)))
        }
        None => Ok(Arc::new(UnavailableSecretProvider::new(
            "no passkey secret provided (use --passkey-secret-file)",
        ))),
    }
}

/// The device-bound secret box for `data_dir`.
pub fn device_secret_box(data_dir: &Path) -> Arc<KeychainSecretBox> {
    Arc::new(KeychainSecretBox::new(platform_keychain(data_dir)))
}

/// Wire the orchestrator for this invocation.
pub fn build_orchestrator(
    app: &AppConfig,
    passkey_secret_file: Option<&Path>,
) -> Result<VaultSyncOrchestrator> {
    let secret_box: Arc<dyn SecretBox> = device_secret_box(&app.data_dir);
    let orchestrator = VaultSyncOrchestrator::new(
        app,
        secret_box,
        passkey_provider(passkey_secret_file)?,
        Arc::new(SystemBrowser),
    )?;
    Ok(orchestrator)
}

/// Display form of a setting value; secrets are masked.
pub fn display_value(key: &str, value: &str) -> String {
    if keys::is_secret(key) {
        "********".to_string()
    } else {
        value.to_string()
    }
}

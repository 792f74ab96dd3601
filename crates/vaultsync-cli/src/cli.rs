//! CLI argument definitions for vaultsync.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// vaultsync -- device-sealed vault provisioning and sync.
#[derive(Parser)]
#[command(
    name = "vaultsync",
    version,
    about = "vaultsync -- device-sealed vault provisioning and sync",
    long_about = "Signs in with a delegated identity provider, seals a local vault with a \
                  device-bound key and synchronizes it with a self-hosted sync server."
)]
pub struct Cli {
    /// Settings file (TOML). Defaults to `settings.toml` in the data directory.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override a setting, e.g. `--set sync.user_id=alice`. Repeatable.
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in through the browser and store the refresh token.
    Authorize,

    /// Manage the stored credential.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Seal a vault, save it locally and sync it when a server is configured.
    Provision {
        /// Read the vault plaintext from this file instead of generating a
        /// fresh random 32-byte vault key.
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// File holding the passkey-derived secret.
        #[arg(long, value_name = "FILE")]
        passkey_secret_file: Option<PathBuf>,
    },

    /// Decrypt the local vault and report its size and fingerprint.
    Unlock {
        /// File holding the passkey-derived secret.
        #[arg(long, value_name = "FILE")]
        passkey_secret_file: Option<PathBuf>,
    },

    /// Fetch the remote vault record and compare it with the local copy.
    Pull,

    /// Show connection, storage, configuration and sync state.
    Status,

    /// Delete the stored refresh token.
    Disconnect,
}

/// Actions for the stored credential.
#[derive(Subcommand)]
pub enum AuthAction {
    /// Exchange the stored refresh token for an access token.
    Refresh,
}

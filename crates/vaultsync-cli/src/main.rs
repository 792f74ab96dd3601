//! CLI entry point for vaultsync.
//!
//! This binary provides the `vaultsync` command with subcommands for signing
//! in, provisioning and unlocking the vault, and inspecting sync state.

mod cli;
mod helpers;

use anyhow::{Context, Result};
use clap::Parser;
use vaultsync_kernel::config::keys;
use vaultsync_kernel::{KernelError, SyncOutcome};
use vaultsync_vault::VaultError;

use cli::{AuthAction, Cli, Commands};
use helpers::{Settings, build_orchestrator, display_value, init_tracing, load_settings};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = load_settings(&cli)?;
    init_tracing(&settings.app.log_level);

    let result = match cli.command {
        Commands::Authorize => cmd_authorize(&settings).await,
        Commands::Auth {
            action: AuthAction::Refresh,
        } => cmd_auth_refresh(&settings).await,
        Commands::Provision {
            input,
            passkey_secret_file,
        } => cmd_provision(&settings, input.as_deref(), passkey_secret_file.as_deref()).await,
        Commands::Unlock {
            passkey_secret_file,
        } => cmd_unlock(&settings, passkey_secret_file.as_deref()).await,
        Commands::Pull => cmd_pull(&settings).await,
        Commands::Status => cmd_status(&settings),
        Commands::Disconnect => cmd_disconnect(&settings),
    };

    if let Err(ref e) = result
        && let Some(hint) = e.downcast_ref::<KernelError>().and_then(KernelError::hint)
    {
        eprintln!("  hint: {hint}");
    }
    result
}

// ---------------------------------------------------------------------------
// Subcommand: authorize / auth refresh
// ---------------------------------------------------------------------------

async fn cmd_authorize(settings: &Settings) -> Result<()> {
    let orchestrator = build_orchestrator(&settings.app, None)?;
    let outcome = orchestrator.authorize().await?;

    println!();
    if outcome.refresh_token_rotated {
        println!("  Signed in. Refresh token stored.");
    } else {
        println!("  Signed in. No new refresh token was issued; the stored one is kept.");
    }
    println!("  Scope:   {}", outcome.scope);
    println!(
        "  Storage: {}",
        orchestrator.token_store().storage_path().display()
    );
    println!();
    Ok(())
}

async fn cmd_auth_refresh(settings: &Settings) -> Result<()> {
    let orchestrator = build_orchestrator(&settings.app, None)?;
    let flow = orchestrator
        .oauth_flow()
        .ok_or_else(|| KernelError::MissingSetting {
            key: keys::OAUTH_CLIENT_ID.into(),
        })?;

    let tokens = match flow.refresh(orchestrator.token_store()).await {
        Ok(tokens) => tokens,
        Err(e) => {
            if let Some(diagnostics) = flow.last_diagnostics() {
                eprintln!("  last token error: {diagnostics}");
            }
            return Err(KernelError::from(e).into());
        }
    };

    println!();
    println!("  Stored credential is valid.");
    println!("  Access token expires in {}s", tokens.expires_in_seconds);
    if !tokens.scope.is_empty() {
        println!("  Scope: {}", tokens.scope);
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: provision / unlock
// ---------------------------------------------------------------------------

async fn cmd_provision(
    settings: &Settings,
    input: Option<&std::path::Path>,
    passkey_secret_file: Option<&std::path::Path>,
) -> Result<()> {
    let plaintext = match input {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("failed to read vault input {}", path.display()))?,
        None => vaultsync_vault::crypto::random_bytes(32).context("failed to generate vault key")?,
    };

    let orchestrator = build_orchestrator(&settings.app, passkey_secret_file)?;
    let report = orchestrator.run(&plaintext).await?;

    println!();
    println!("  Vault provisioned");
    println!("  =================");
    println!("  State:        {}", report.state);
    println!("  Protection:   {}", report.mode);
    println!("  Signed in:    {}", if report.authorized { "yes (new)" } else { "existing credential" });
    println!("  Local vault:  {} ({} bytes)", orchestrator.vault_path().display(), report.ciphertext_len);
    println!("  Fingerprint:  {}", report.vault_fingerprint);
    match &report.sync {
        SyncOutcome::Synced {
            vault_version,
            updated_at,
            retried,
        } => {
            let note = if *retried { " after a version conflict" } else { "" };
            println!("  Sync:         version {vault_version} at {updated_at}{note}");
        }
        SyncOutcome::Skipped { reason } => println!("  Sync:         skipped ({reason})"),
        SyncOutcome::Failed { error } => {
            println!("  Sync:         FAILED (local save is kept)");
            println!("  Warning:      {}", error.diagnostic());
            if let Some(hint) = error.hint() {
                println!("  Hint:         {hint}");
            }
        }
    }
    println!();
    Ok(())
}

async fn cmd_unlock(
    settings: &Settings,
    passkey_secret_file: Option<&std::path::Path>,
) -> Result<()> {
    let orchestrator = build_orchestrator(&settings.app, passkey_secret_file)?;
    let unlocked = orchestrator.unlock().await?;

    println!();
    println!("  Vault unlocked");
    println!("  Size:        {} bytes", unlocked.plaintext.len());
    println!("  Protection:  {}", unlocked.mode);
    println!("  Fingerprint: {}", unlocked.fingerprint);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: pull
// ---------------------------------------------------------------------------

async fn cmd_pull(settings: &Settings) -> Result<()> {
    let orchestrator = build_orchestrator(&settings.app, None)?;
    let status = orchestrator.fetch_remote().await?;
    let record = &status.record;

    println!();
    println!("  Remote vault");
    println!("  ============");
    println!("  User:         {}", record.user_id);
    println!("  Version:      {} (local cursor {})", record.vault_version, status.cursor_version);
    println!("  Updated at:   {}", record.meta.updated_at);
    println!("  Last writer:  {}", record.meta.last_writer_device_id);
    println!("  Key scheme:   {}", record.key_envelope.kek_scheme);
    match status.matches_local() {
        Some(true) => println!("  Local copy:   in sync"),
        Some(false) => println!("  Local copy:   DIFFERS from remote"),
        None => println!("  Local copy:   none"),
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

fn cmd_status(settings: &Settings) -> Result<()> {
    let orchestrator = build_orchestrator(&settings.app, None)?;

    println!();
    println!("  vaultsync Status");
    println!("  ================");
    println!();

    let connection = orchestrator.token_store().diagnose();
    println!("  Connection:   {}", connection.label());
    if let Some(hint) = connection.hint() {
        println!("                {hint}");
    }

    println!("  Data dir:     {}", settings.app.data_dir.display());
    println!("  Settings:     {}", settings.settings_path.display());

    match orchestrator.envelope().read_local() {
        Ok(ciphertext) => println!(
            "  Local vault:  OK ({} bytes, {})",
            ciphertext.len(),
            orchestrator.vault_path().display()
        ),
        Err(e @ VaultError::VaultMissing { .. }) => println!("  Local vault:  MISSING ({e})"),
        Err(e) => {
            println!("  Local vault:  UNUSABLE ({e})");
            if let Some(hint) = e.hint() {
                println!("                {hint}");
            }
        }
    }

    match &settings.app.sync.base_url {
        Some(url) => println!("  Sync server:  {url}"),
        None => println!("  Sync server:  NOT CONFIGURED (sync is skipped)"),
    }
    match orchestrator.cursor().load() {
        Some(cursor) => println!(
            "  Sync cursor:  user {} at version {} ({})",
            cursor.user_id, cursor.vault_version, cursor.updated_at
        ),
        None => println!("  Sync cursor:  none"),
    }

    println!();
    println!("  Settings ({})", settings.layered.provider_names().join(" > "));
    for key in keys::ALL {
        match settings.layered.lookup(key) {
            Some((value, source)) => {
                println!("    {key:<28} {:<40} [{source}]", display_value(key, &value));
            }
            None => println!("    {key:<28} (unset)"),
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: disconnect
// ---------------------------------------------------------------------------

fn cmd_disconnect(settings: &Settings) -> Result<()> {
    let orchestrator = build_orchestrator(&settings.app, None)?;
    if orchestrator.disconnect()? {
        println!("  Stored credential removed.");
    } else {
        println!("  No stored credential to remove.");
    }
    Ok(())
}

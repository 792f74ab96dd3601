//! Self-hosted vault sync client for vaultsync.
//!
//! The sync server stores one encrypted vault record per user and enforces
//! optimistic concurrency: every write names the version it expects to
//! replace, and a stale write is rejected with the server's current version.
//!
//! - `GET {base}/v1/vaults/{user_id}` returns a [`VaultRecord`]
//! - `PUT {base}/v1/vaults/{user_id}` takes a [`PutVaultRequest`]
//!
//! Every failure is a [`SyncError`] value carrying the observed
//! [`SyncHttpStatus`]; the client never panics across its boundary.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use vaultsync_sync::SyncClient;
//!
//! # async fn example() -> vaultsync_sync::Result<()> {
//! let client = SyncClient::new("https://sync.example.com")?.with_bearer_token("token");
//! let record = client.get_vault("alice").await?;
//! println!("remote version: {}", record.vault_version);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::{DEFAULT_SYNC_TIMEOUT, SyncClient};
pub use error::{Result, SyncError};
pub use types::{PutVaultRequest, PutVaultResponse, SyncHttpStatus, VaultRecord};

//! Passkey secret capability.
//!
//! The platform ceremony that creates a passkey and returns an HMAC-derived
//! secret happens outside this workspace. It is consumed through
//! [`PasskeySecretProvider`], which has exactly two non-error outcomes: a
//! secret, or an explicit statement that none is available.

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of asking the platform for a passkey-derived secret.
pub enum PasskeySecret {
    /// The authenticator produced a secret.
    Secret(Vec<u8>),
    /// The platform or authenticator cannot produce a secret.
    Unavailable { reason: String },
}

impl std::fmt::Debug for PasskeySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secret(bytes) => write!(f, "Secret(<{} bytes>)", bytes.len()),
            Self::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Platform capability that creates a passkey and returns its secret.
///
/// Implementations return `Err` only for user cancellation
/// ([`VaultError::Cancelled`](crate::VaultError::Cancelled)) or a genuine
/// failure; lack of support is [`PasskeySecret::Unavailable`].
#[async_trait]
pub trait PasskeySecretProvider: Send + Sync {
    async fn create_secret(&self) -> Result<PasskeySecret>;
}

/// Provider returning a fixed secret, e.g. one read from a file.
pub struct StaticSecretProvider {
    secret: Vec<u8>,
}

impl StaticSecretProvider {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl PasskeySecretProvider for StaticSecretProvider {
    async fn create_secret(&self) -> Result<PasskeySecret> {
        if self.secret.is_empty() {
            return Ok(PasskeySecret::Unavailable {
                reason: "configured passkey secret is empty".into(),
            });
        }
        Ok(PasskeySecret::Secret(self.secret.clone()))
    }
}

/// Provider for platforms without a passkey secret capability.
pub struct UnavailableSecretProvider {
    reason: String,
}

impl UnavailableSecretProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PasskeySecretProvider for UnavailableSecretProvider {
    async fn create_secret(&self) -> Result<PasskeySecret> {
        Ok(PasskeySecret::Unavailable {
            reason: self.reason.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_secret() {
        let provider = StaticSecretProvider::new(b"prf".to_vec());
        match provider.create_secret().await.unwrap() {
            PasskeySecret::Secret(bytes) => assert_eq!(bytes, b"prf"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_static_secret_is_unavailable() {
        let provider = StaticSecretProvider::new(Vec::new());
        assert!(matches!(
            provider.create_secret().await.unwrap(),
            PasskeySecret::Unavailable { .. }
        ));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let rendered = format!("{:?}", PasskeySecret::Secret(b"hunter2".to_vec()));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("7 bytes"));
    }
}

//! PKCE (RFC 7636) parameters for one authorization attempt.

use vaultsync_vault::crypto;

use crate::error::Result;

/// Random bytes behind the `state` parameter.
pub const STATE_BYTES: usize = 16;

/// Random bytes behind the code verifier (86 characters once encoded).
pub const VERIFIER_BYTES: usize = 64;

/// `state`, verifier and challenge for a single authorization attempt.
///
/// Created fresh per attempt and never persisted.
pub struct PkceSession {
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkceSession {
    /// Generate a new session from the system CSPRNG.
    ///
    /// # Errors
    ///
    /// Fails if the CSPRNG fails. There is no weaker fallback.
    pub fn generate() -> Result<Self> {
        let state = crypto::random_urlsafe(STATE_BYTES)?;
        let code_verifier = crypto::random_urlsafe(VERIFIER_BYTES)?;
        let code_challenge = challenge_for(&code_verifier);
        Ok(Self {
            state,
            code_verifier,
            code_challenge,
        })
    }
}

impl std::fmt::Debug for PkceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceSession")
            .field("state", &self.state)
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

/// `BASE64URL(SHA256(verifier))`, the S256 challenge method.
pub fn challenge_for(verifier: &str) -> String {
    crypto::base64url_encode(&crypto::sha256(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc7636_appendix_b_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            challenge_for(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn generated_session_is_consistent() {
        let session = PkceSession::generate().unwrap();

        assert_eq!(session.code_verifier.len(), 86);
        assert!((43..=128).contains(&session.code_verifier.len()));
        assert_eq!(session.state.len(), 22);
        assert_eq!(
            session.code_challenge,
            challenge_for(&session.code_verifier)
        );

        let digest = crypto::base64url_decode(&session.code_challenge).unwrap();
        assert_eq!(digest, crypto::sha256(session.code_verifier.as_bytes()));
    }

    #[test]
    fn sessions_are_unique() {
        let a = PkceSession::generate().unwrap();
        let b = PkceSession::generate().unwrap();
        assert_ne!(a.state, b.state);
        assert_ne!(a.code_verifier, b.code_verifier);
    }

    #[test]
    fn debug_redacts_verifier() {
        let session = PkceSession::generate().unwrap();
        let rendered = format!("{session:?}");
        assert!(!rendered.contains(&session.code_verifier));
    }
}

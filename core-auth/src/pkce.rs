//! PKCE and CSRF-state generation (RFC 7636).
//!
//! Every interactive flow gets a fresh verifier/challenge pair and a fresh
//! state nonce; neither is ever reused across flows or logged.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;

/// A PKCE verifier/challenge pair using the S256 method.
///
/// The verifier is the base64url (no padding) encoding of 32 random bytes;
/// the challenge is `BASE64URL(SHA256(verifier))`. Only the challenge is
/// sent in the authorize request; the verifier goes to the token endpoint
/// over TLS when the code is exchanged.
#[derive(Clone)]
pub struct PkcePair {
    verifier: String,
    challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair from cryptographically secure randomness.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();

        // 32 random bytes encode to 43 characters, within RFC 7636's 43-128
        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);
        let challenge = s256_challenge(&verifier);

        Self {
            verifier,
            challenge,
        }
    }

    /// The code verifier, sent only to the token endpoint.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// The code challenge, sent in the authorize request.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// The challenge method advertised to the provider.
    pub fn method(&self) -> &'static str {
        "S256"
    }
}

/// Compute `BASE64URL(SHA256(verifier))`.
fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

// The verifier is secret; keep it out of Debug output.
impl fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Per-flow CSRF state: a random nonce echoed back by the provider on the
/// loopback callback. A mismatch fails the flow closed.
#[derive(Debug, Clone)]
pub struct FlowState {
    nonce: String,
}

impl FlowState {
    /// Generate a fresh nonce: lowercase hex of 16 random bytes.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 16];
        rng.fill(&mut bytes);
        let nonce = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self { nonce }
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s256_challenge_rfc7636_vector() {
        // RFC 7636 appendix B
        let challenge = s256_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_pkce_pair_generation() {
        let pair = PkcePair::generate();

        // 32 bytes -> 43 base64url characters, no padding
        assert_eq!(pair.verifier().len(), 43);
        assert!(!pair.verifier().contains('='));
        assert!(!pair.challenge().contains('='));
        assert_eq!(pair.method(), "S256");

        // Challenge must match the verifier
        assert_eq!(pair.challenge(), s256_challenge(pair.verifier()));
    }

    #[test]
    fn test_pkce_pairs_are_unique() {
        let a = PkcePair::generate();
        let b = PkcePair::generate();
        assert_ne!(a.verifier(), b.verifier());
        assert_ne!(a.challenge(), b.challenge());
    }

    #[test]
    fn test_pkce_debug_redacts_verifier() {
        let pair = PkcePair::generate();
        let debug = format!("{:?}", pair);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(pair.verifier()));
    }

    #[test]
    fn test_flow_state_is_lowercase_hex() {
        let state = FlowState::generate();
        assert_eq!(state.nonce().len(), 32);
        assert!(state
            .nonce()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_flow_states_are_unique() {
        let a = FlowState::generate();
        let b = FlowState::generate();
        assert_ne!(a.nonce(), b.nonce());
    }
}

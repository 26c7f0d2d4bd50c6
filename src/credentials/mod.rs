//! API key/secret issuance and secret digests.
//!
//! Keys and secrets are independent 256-bit tokens read from the operating
//! system's random source and encoded as URL-safe base64. Only a salted
//! SHA-256 digest of the secret is ever stored.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

const TOKEN_BYTES: usize = 32;
const SALT_BYTES: usize = 16;
const DIGEST_SCHEME: &str = "sha256";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Entropy unavailable: {0}")]
    EntropyUnavailable(String),
}

/// Source of random bytes. Failure must surface, never degrade to a weaker source.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), CredentialError>;
}

pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), CredentialError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CredentialError::EntropyUnavailable(e.to_string()))
    }
}

/// A freshly issued pair. The plaintext secret exists only in this value.
pub struct IssuedCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct CredentialIssuer {
    entropy: Arc<dyn EntropySource>,
}

impl Default for CredentialIssuer {
    fn default() -> Self {
        Self::new(Arc::new(OsEntropy))
    }
}

impl CredentialIssuer {
    pub fn new(entropy: Arc<dyn EntropySource>) -> Self {
        Self { entropy }
    }

    /// Generate an independent key and secret
    pub fn generate(&self) -> Result<IssuedCredentials, CredentialError> {
        let api_key = self.token()?;
        let api_secret = self.token()?;
        Ok(IssuedCredentials { api_key, api_secret })
    }

    /// Salted one-way digest of a secret, formatted as `sha256$<salt>$<hex digest>`
    pub fn hash_secret(&self, secret: &str) -> Result<String, CredentialError> {
        let mut salt = [0u8; SALT_BYTES];
        self.entropy.fill(&mut salt)?;
        let salt = URL_SAFE_NO_PAD.encode(salt);
        Ok(format!("{}${}${}", DIGEST_SCHEME, salt, digest(&salt, secret)))
    }

    fn token(&self) -> Result<String, CredentialError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.entropy.fill(&mut bytes)?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Check a plaintext secret against a stored digest
pub fn verify_secret(secret: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(scheme), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if scheme != DIGEST_SCHEME {
        return false;
    }
    constant_time_eq(digest(salt, secret).as_bytes(), expected.as_bytes())
}

fn digest(salt: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

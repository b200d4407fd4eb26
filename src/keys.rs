//! Ed25519 key management for signing scenario diff exports
//!
//! Keys live in small JSON files holding the base64 private and public
//! halves. Verifiers only ever need the public half, which can be passed
//! around as base64 on its own.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::errors::DiffError;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid signature length: expected 64 bytes, got {0}")]
    InvalidSignatureLength(usize),

    #[error("Key signature error: {0}")]
    Signature(#[from] ed25519_dalek::SignatureError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    #[error("Public key mismatch in key file")]
    PublicKeyMismatch,
}

impl From<KeyError> for DiffError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Io(source) => DiffError::io("key file", source),
            KeyError::Signature(e) => DiffError::signature(e.to_string()),
            other => DiffError::crypto(other.to_string()),
        }
    }
}

/// On-disk key file format
#[derive(Serialize, Deserialize)]
struct KeyData {
    /// Base64-encoded private key (32 bytes)
    private_key_b64: String,
    /// Base64-encoded public key (32 bytes)
    public_key_b64: String,
    /// Key generation timestamp
    created_at: String,
    /// Key purpose/description
    purpose: String,
}

/// An Ed25519 key pair used to sign diff exports
#[derive(Debug, Clone)]
pub struct DiffSigningKey {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

fn key_array(bytes: &[u8]) -> Result<[u8; 32], KeyError> {
    bytes
        .try_into()
        .map_err(|_| KeyError::InvalidKeyLength(bytes.len()))
}

/// Parse a base64 public key.
pub fn verifying_key_from_b64(b64: &str) -> Result<VerifyingKey, KeyError> {
    let bytes = B64.decode(b64.trim())?;
    Ok(VerifyingKey::from_bytes(&key_array(&bytes)?)?)
}

/// Short stable identifier for a public key: the first 16 hex characters
/// of its SHA-256.
pub fn key_id_for(verifying_key: &VerifyingKey) -> String {
    let digest = format!("{:x}", Sha256::digest(verifying_key.as_bytes()));
    digest[..16].to_string()
}

/// Decode a base64 signature and check it over `message`.
pub fn verify_detached(
    verifying_key: &VerifyingKey,
    message: &[u8],
    signature_b64: &str,
) -> Result<(), KeyError> {
    let sig_bytes = B64.decode(signature_b64)?;
    let sig_len = sig_bytes.len();
    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| KeyError::InvalidSignatureLength(sig_len))?;
    let signature = Signature::from_bytes(&sig_array);
    verifying_key.verify(message, &signature)?;
    Ok(())
}

impl DiffSigningKey {
    /// Generate a new random Ed25519 key pair
    pub fn generate() -> Result<Self, KeyError> {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).map_err(|e| KeyError::Entropy(e.to_string()))?;
        Ok(Self::from_seed(&seed))
    }

    /// Build a key pair from a 32-byte secret seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Load a signing key from a base64-encoded private key string
    pub fn load_signing_key_b64(b64: &str) -> Result<Self, KeyError> {
        let sk_bytes = B64.decode(b64.trim())?;
        Ok(Self::from_seed(&key_array(&sk_bytes)?))
    }

    /// Load a key pair from a JSON key file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, KeyError> {
        let content = fs::read_to_string(path)?;
        let key_data: KeyData = serde_json::from_str(&content)?;
        let key = Self::load_signing_key_b64(&key_data.private_key_b64)?;
        if key.public_key_b64() != key_data.public_key_b64 {
            return Err(KeyError::PublicKeyMismatch);
        }
        Ok(key)
    }

    /// Save the key pair to a JSON key file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, purpose: &str) -> Result<(), KeyError> {
        let key_data = KeyData {
            private_key_b64: B64.encode(self.signing_key.to_bytes()),
            public_key_b64: self.public_key_b64(),
            created_at: chrono::Utc::now().to_rfc3339(),
            purpose: purpose.to_string(),
        };

        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&key_data)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Get the base64-encoded public key
    pub fn public_key_b64(&self) -> String {
        B64.encode(self.verifying_key.to_bytes())
    }

    /// Identifier derived from the public key
    pub fn key_id(&self) -> String {
        key_id_for(&self.verifying_key)
    }

    /// Sign canonical bytes, returning the base64 signature
    pub fn sign_canonical_bytes(&self, canonical_bytes: &[u8]) -> String {
        B64.encode(self.signing_key.sign(canonical_bytes).to_bytes())
    }

    /// Verify a signature against canonical bytes
    pub fn verify_signature(&self, canonical_bytes: &[u8], signature_b64: &str) -> Result<(), KeyError> {
        verify_detached(&self.verifying_key, canonical_bytes, signature_b64)
    }
}

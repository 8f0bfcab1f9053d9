//! Error types for the fleek-crypto crate.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A required cryptographic primitive failed below the protocol layer
    /// (key setup, HKDF expansion). Fatal to the operation that hit it.
    #[error("crypto unavailable: {0}")]
    Unavailable(String),

    /// The provided key material is invalid (wrong curve, malformed JWK, etc.).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Decryption failed (wrong key, tampered ciphertext, bad IV).
    /// Recoverable at every call site — degrade, never crash.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Local database storage error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<rusqlite::Error> for CryptoError {
    fn from(err: rusqlite::Error) -> Self {
        CryptoError::StorageError(err.to_string())
    }
}

impl From<CryptoError> for fleek_shared::error::FleekError {
    fn from(err: CryptoError) -> Self {
        fleek_shared::error::FleekError::Crypto(err.to_string())
    }
}

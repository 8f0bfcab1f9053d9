//! Error types for the fleek-chat crate.

use thiserror::Error;

use fleek_crypto::error::CryptoError;
use fleek_shared::error::FleekError;
use fleek_shared::ids::UserId;

use crate::remote::RemoteStoreError;

/// Errors surfaced by the chat coordination layer.
///
/// Every variant is recoverable at the session level: failures degrade a
/// single conversation or message, never the host process.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Identity key initialization failed after cleanup. The user should
    /// retry or re-login.
    #[error("key initialization failed: {0}")]
    KeyInitializationFailed(String),

    /// The peer has not initialized their encryption keys yet. User-facing,
    /// distinct from generic store failures.
    #[error("user {0} has not set up their encryption keys yet")]
    PeerKeysNotReady(UserId),

    /// Key state could not be fully persisted; partial writes were rolled
    /// back to avoid an inconsistent pair surviving the session.
    #[error("key persistence failed: {0}")]
    PersistenceFailed(String),

    /// Remote store failure outside the key lifecycle.
    #[error(transparent)]
    Store(#[from] RemoteStoreError),

    /// Cryptographic failure, including per-message `DecryptionFailed`.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<ChatError> for FleekError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Store(e) => FleekError::ServiceUnavailable(e.to_string()),
            other => FleekError::Crypto(other.to_string()),
        }
    }
}

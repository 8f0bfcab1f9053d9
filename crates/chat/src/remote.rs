//! The remote store boundary.
//!
//! The chat subsystem treats the backend's `profiles`, `conversations`, and
//! `messages` records as an external collaborator reached through this trait.
//! Implementations are expected to be thin adapters over whatever transport
//! the host uses; [`crate::memory::MemoryStore`] is the in-process reference
//! implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use fleek_shared::ids::{ConversationId, UserId};
use fleek_shared::records::{
    ConversationRecord, EncryptedKeyBackup, MessageRecord, NewMessage, ProfileKeys,
};

/// Failures at the remote store boundary.
#[derive(Debug, Error)]
pub enum RemoteStoreError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("remote store error: {0}")]
    Backend(String),
}

/// Async interface to the backend records the subsystem reads and writes.
///
/// All operations are suspension points; none are cancellable mid-flight,
/// and a caller that abandons interest simply ignores the eventual result.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the key columns of a user's profile. `Ok(None)` means the
    /// profile record does not exist at all.
    async fn fetch_profile_keys(&self, user: UserId)
        -> Result<Option<ProfileKeys>, RemoteStoreError>;

    /// Upsert the user's public key JWK. `None` clears it. Creates the
    /// profile record if missing.
    async fn set_public_key(
        &self,
        user: UserId,
        public_key_jwk: Option<String>,
    ) -> Result<(), RemoteStoreError>;

    /// Upsert the user's encrypted private key backup blob.
    async fn set_key_backup(
        &self,
        user: UserId,
        backup: EncryptedKeyBackup,
    ) -> Result<(), RemoteStoreError>;

    /// Fetch the persisted key-derivation salt for a conversation.
    async fn conversation_salt(
        &self,
        conversation: ConversationId,
    ) -> Result<Option<String>, RemoteStoreError>;

    /// Set or clear the conversation's salt.
    async fn set_conversation_salt(
        &self,
        conversation: ConversationId,
        salt_base64: Option<String>,
    ) -> Result<(), RemoteStoreError>;

    /// Find the two-party conversation between `a` and `b` (either order),
    /// creating it if absent.
    async fn find_or_create_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<ConversationRecord, RemoteStoreError>;

    /// Insert a message; the store assigns the id and read flag.
    async fn insert_message(&self, message: NewMessage)
        -> Result<MessageRecord, RemoteStoreError>;

    /// All messages of a conversation, oldest first.
    async fn list_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<MessageRecord>, RemoteStoreError>;

    /// Bump the conversation's last-activity timestamp.
    async fn touch_conversation(
        &self,
        conversation: ConversationId,
        at: DateTime<Utc>,
    ) -> Result<(), RemoteStoreError>;

    /// Mark every message in the conversation not sent by `reader` as read.
    async fn mark_messages_read(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<(), RemoteStoreError>;
}

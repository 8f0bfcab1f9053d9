//! Persisted record shapes consumed and produced by the chat subsystem.
//!
//! These mirror the remote store's `profiles`, `conversations`, and `messages`
//! tables at the column level. Binary message fields are base64 strings; the
//! key backup blob is carried as raw byte vectors, which serialize to JSON
//! arrays of numbers (the shape the profile record stores).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, MessageId, UserId};

/// The key-related columns of a user's profile record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileKeys {
    /// JWK serialization of the user's P-256 identity public key.
    pub public_key_jwk: Option<String>,
    /// Encrypted backup of the private half, recoverable within the
    /// user's own authenticated session.
    pub encrypted_private_key: Option<EncryptedKeyBackup>,
}

/// AES-GCM ciphertext of a private key JWK plus the IV used to seal it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedKeyBackup {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// A two-party conversation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub participant_1: UserId,
    pub participant_2: UserId,
    /// Base64 of the 16-byte key-derivation salt. Immutable once set;
    /// cleared only by an explicit key reset.
    pub salt_base64: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// The participant other than `user`, if `user` is a participant at all.
    pub fn peer_of(&self, user: UserId) -> Option<UserId> {
        if self.participant_1 == user {
            Some(self.participant_2)
        } else if self.participant_2 == user {
            Some(self.participant_1)
        } else {
            None
        }
    }
}

/// The kind of content a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::File => "file",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted message row. Content is ciphertext only; decryption happens
/// lazily on read and never on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub iv_base64: String,
    pub ciphertext_base64: String,
    pub message_type: MessageKind,
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_by_recipient: bool,
}

/// Fields supplied by the sender when inserting a message; the store
/// assigns the id and the read flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub iv_base64: String,
    pub ciphertext_base64: String,
    pub message_type: MessageKind,
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The realtime insert event shape delivered by the pub/sub transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInsertEvent {
    pub new: MessageRecord,
}

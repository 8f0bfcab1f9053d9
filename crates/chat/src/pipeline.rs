//! The message pipeline: encrypt-on-send, decrypt-on-read.
//!
//! Plaintext exists only at the edges. Everything persisted or delivered
//! through the remote store is AES-GCM ciphertext under the conversation
//! key, and a message that fails to decrypt degrades to a placeholder
//! rather than failing the whole read.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};

use fleek_crypto::cipher::{self, ConversationKey};
use fleek_shared::ids::{ConversationId, MessageId, UserId};
use fleek_shared::records::{
    ConversationRecord, MessageInsertEvent, MessageKind, MessageRecord, NewMessage,
};

use crate::error::ChatError;
use crate::remote::RemoteStore;
use crate::resolver::ConversationKeyResolver;

/// Shown in place of content that could not be decrypted.
pub const DECRYPT_PLACEHOLDER: &str = "\u{1f512} [Could not decrypt this message]";

/// A non-text payload attached to a message. The upload itself happens
/// elsewhere; the pipeline only records the resulting URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub kind: AttachmentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Video,
    File,
}

impl AttachmentKind {
    fn message_kind(self) -> MessageKind {
        match self {
            AttachmentKind::Image => MessageKind::Image,
            AttachmentKind::Video => MessageKind::Video,
            AttachmentKind::File => MessageKind::File,
        }
    }
}

/// A message after decryption, in the shape the UI consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: MessageKind,
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_by_recipient: bool,
    /// False when `content` is the placeholder.
    pub decrypted: bool,
}

/// A conversation's decrypted history plus how many messages degraded to
/// the placeholder.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    pub messages: Vec<DecryptedMessage>,
    pub failed: usize,
}

pub struct MessagePipeline {
    resolver: Arc<ConversationKeyResolver>,
    remote: Arc<dyn RemoteStore>,
}

impl MessagePipeline {
    pub fn new(resolver: Arc<ConversationKeyResolver>, remote: Arc<dyn RemoteStore>) -> Self {
        Self { resolver, remote }
    }

    pub fn user_id(&self) -> UserId {
        self.resolver.user_id()
    }

    /// Find or create the conversation between the session user and `peer`,
    /// making sure our own identity keys exist first so the peer can derive
    /// the conversation key too.
    pub async fn conversation_with(&self, peer: UserId) -> Result<ConversationRecord, ChatError> {
        self.resolver.ensure_identity().await?;
        let record = self
            .remote
            .find_or_create_conversation(self.user_id(), peer)
            .await?;
        Ok(record)
    }

    /// Encrypt and persist a message. An attachment replaces the text with
    /// a `[kind]:url` marker so the recipient can render it without a
    /// second lookup.
    pub async fn send(
        &self,
        conversation: ConversationId,
        peer: UserId,
        text: &str,
        attachment: Option<Attachment>,
    ) -> Result<DecryptedMessage, ChatError> {
        let (content, message_type, file_url) = match attachment {
            Some(att) => {
                let kind = att.kind.message_kind();
                (format!("[{kind}]:{}", att.url), kind, Some(att.url))
            }
            None => (text.to_owned(), MessageKind::Text, None),
        };

        let key = self.resolver.get_key(conversation, peer).await?;
        let (iv, ciphertext) = cipher::encrypt(&key, content.as_bytes())?;

        let record = self
            .remote
            .insert_message(NewMessage {
                conversation_id: conversation,
                sender_id: self.user_id(),
                iv_base64: BASE64.encode(iv),
                ciphertext_base64: BASE64.encode(&ciphertext),
                message_type,
                file_url,
                created_at: Utc::now(),
            })
            .await?;
        self.remote
            .touch_conversation(conversation, record.created_at)
            .await?;

        // The sender already holds the plaintext; no need to round-trip it
        // through decryption.
        Ok(DecryptedMessage {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            content,
            message_type: record.message_type,
            file_url: record.file_url,
            created_at: record.created_at,
            read_by_recipient: record.read_by_recipient,
            decrypted: true,
        })
    }

    /// Load and decrypt a conversation's full history, oldest first. A
    /// message that fails to decrypt becomes the placeholder; the count of
    /// failures is reported so the caller can offer a key reset.
    pub async fn fetch_history(
        &self,
        conversation: ConversationId,
        peer: UserId,
    ) -> Result<ConversationHistory, ChatError> {
        let records = self.remote.list_messages(conversation).await?;
        if records.is_empty() {
            // Nothing to decrypt, so skip key resolution entirely. This also
            // keeps a brand-new conversation from persisting a salt before
            // its first message.
            return Ok(ConversationHistory::default());
        }

        let key = self.resolver.get_key(conversation, peer).await?;
        let mut history = ConversationHistory::default();
        for record in records {
            let message = decrypt_record(&key, record);
            if !message.decrypted {
                history.failed += 1;
            }
            history.messages.push(message);
        }
        if history.failed > 0 {
            tracing::warn!(
                %conversation,
                failed = history.failed,
                "some messages could not be decrypted; a key reset may be needed"
            );
        }
        Ok(history)
    }

    /// Handle a realtime insert event. Returns `None` for the session
    /// user's own messages, which the UI already rendered optimistically
    /// at send time.
    pub async fn on_remote_insert(
        &self,
        event: MessageInsertEvent,
    ) -> Result<Option<DecryptedMessage>, ChatError> {
        let record = event.new;
        if record.sender_id == self.user_id() {
            return Ok(None);
        }
        let key = self
            .resolver
            .get_key(record.conversation_id, record.sender_id)
            .await?;
        Ok(Some(decrypt_record(&key, record)))
    }

    /// Mark the peer's messages in `conversation` as read by the session
    /// user.
    pub async fn mark_read(&self, conversation: ConversationId) -> Result<(), ChatError> {
        self.remote
            .mark_messages_read(conversation, self.user_id())
            .await?;
        Ok(())
    }
}

fn decrypt_record(key: &ConversationKey, record: MessageRecord) -> DecryptedMessage {
    let plaintext = BASE64
        .decode(&record.iv_base64)
        .and_then(|iv| Ok((iv, BASE64.decode(&record.ciphertext_base64)?)))
        .ok()
        .and_then(|(iv, ciphertext)| cipher::decrypt(key, &iv, &ciphertext).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok());

    let (content, decrypted) = match plaintext {
        Some(text) => (text, true),
        None => (DECRYPT_PLACEHOLDER.to_owned(), false),
    };

    DecryptedMessage {
        id: record.id,
        conversation_id: record.conversation_id,
        sender_id: record.sender_id,
        content,
        message_type: record.message_type,
        file_url: record.file_url,
        created_at: record.created_at,
        read_by_recipient: record.read_by_recipient,
        decrypted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_kinds_map_to_message_kinds() {
        assert_eq!(AttachmentKind::Image.message_kind(), MessageKind::Image);
        assert_eq!(AttachmentKind::Video.message_kind(), MessageKind::Video);
        assert_eq!(AttachmentKind::File.message_kind(), MessageKind::File);
    }

    #[test]
    fn undecryptable_record_degrades_to_placeholder() {
        let pair = fleek_crypto::cipher::generate_identity_keypair();
        let (key, _salt) =
            cipher::derive_conversation_key(&pair.secret, &pair.public, None).unwrap();
        let record = MessageRecord {
            id: MessageId::new(),
            conversation_id: ConversationId::new(),
            sender_id: UserId::new(),
            iv_base64: BASE64.encode([0u8; 12]),
            ciphertext_base64: BASE64.encode(b"not real ciphertext"),
            message_type: MessageKind::Text,
            file_url: None,
            created_at: Utc::now(),
            read_by_recipient: false,
        };
        let message = decrypt_record(&key, record);
        assert!(!message.decrypted);
        assert_eq!(message.content, DECRYPT_PLACEHOLDER);
    }
}

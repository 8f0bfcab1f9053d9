//! In-memory reference implementation of [`RemoteStore`].
//!
//! Backs the integration tests and doubles as a single-process reference for
//! adapter authors. Inserted messages are fanned out on a broadcast channel,
//! standing in for the realtime insert subscription of a real backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use fleek_shared::ids::{ConversationId, MessageId, UserId};
use fleek_shared::records::{
    ConversationRecord, EncryptedKeyBackup, MessageRecord, NewMessage, ProfileKeys,
};

use crate::remote::{RemoteStore, RemoteStoreError};

#[derive(Default)]
struct Inner {
    profiles: HashMap<UserId, ProfileKeys>,
    conversations: HashMap<ConversationId, ConversationRecord>,
    messages: Vec<MessageRecord>,
}

/// In-memory remote store with a broadcast feed of inserted messages.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    inserts: broadcast::Sender<MessageRecord>,
    public_key_writes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (inserts, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner::default()),
            inserts,
            public_key_writes: AtomicUsize::new(0),
        }
    }

    /// Subscribe to the realtime insert feed. Events are
    /// [`MessageRecord`]s in insertion order; slow receivers may lag.
    pub fn subscribe(&self) -> broadcast::Receiver<MessageRecord> {
        self.inserts.subscribe()
    }

    /// Number of non-null public key writes accepted. Exposed so callers
    /// (and tests) can observe how many key-generation passes reached the
    /// store.
    pub fn public_key_writes(&self) -> usize {
        self.public_key_writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch_profile_keys(
        &self,
        user: UserId,
    ) -> Result<Option<ProfileKeys>, RemoteStoreError> {
        Ok(self.lock().profiles.get(&user).cloned())
    }

    async fn set_public_key(
        &self,
        user: UserId,
        public_key_jwk: Option<String>,
    ) -> Result<(), RemoteStoreError> {
        if public_key_jwk.is_some() {
            self.public_key_writes.fetch_add(1, Ordering::SeqCst);
        }
        self.lock().profiles.entry(user).or_default().public_key_jwk = public_key_jwk;
        Ok(())
    }

    async fn set_key_backup(
        &self,
        user: UserId,
        backup: EncryptedKeyBackup,
    ) -> Result<(), RemoteStoreError> {
        self.lock()
            .profiles
            .entry(user)
            .or_default()
            .encrypted_private_key = Some(backup);
        Ok(())
    }

    async fn conversation_salt(
        &self,
        conversation: ConversationId,
    ) -> Result<Option<String>, RemoteStoreError> {
        let inner = self.lock();
        let conv = inner
            .conversations
            .get(&conversation)
            .ok_or(RemoteStoreError::ConversationNotFound(conversation))?;
        Ok(conv.salt_base64.clone())
    }

    async fn set_conversation_salt(
        &self,
        conversation: ConversationId,
        salt_base64: Option<String>,
    ) -> Result<(), RemoteStoreError> {
        let mut inner = self.lock();
        let conv = inner
            .conversations
            .get_mut(&conversation)
            .ok_or(RemoteStoreError::ConversationNotFound(conversation))?;
        conv.salt_base64 = salt_base64;
        Ok(())
    }

    async fn find_or_create_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<ConversationRecord, RemoteStoreError> {
        let mut inner = self.lock();
        if let Some(conv) = inner.conversations.values().find(|c| {
            (c.participant_1 == a && c.participant_2 == b)
                || (c.participant_1 == b && c.participant_2 == a)
        }) {
            return Ok(conv.clone());
        }

        let conv = ConversationRecord {
            id: ConversationId::new(),
            participant_1: a,
            participant_2: b,
            salt_base64: None,
            last_message_at: None,
            created_at: Utc::now(),
        };
        inner.conversations.insert(conv.id, conv.clone());
        Ok(conv)
    }

    async fn insert_message(
        &self,
        message: NewMessage,
    ) -> Result<MessageRecord, RemoteStoreError> {
        let record = MessageRecord {
            id: MessageId::new(),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            iv_base64: message.iv_base64,
            ciphertext_base64: message.ciphertext_base64,
            message_type: message.message_type,
            file_url: message.file_url,
            created_at: message.created_at,
            read_by_recipient: false,
        };
        self.lock().messages.push(record.clone());
        // No receivers is fine; the feed is best-effort like a real
        // pub/sub channel.
        let _ = self.inserts.send(record.clone());
        Ok(record)
    }

    async fn list_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<MessageRecord>, RemoteStoreError> {
        let inner = self.lock();
        let mut messages: Vec<MessageRecord> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn touch_conversation(
        &self,
        conversation: ConversationId,
        at: DateTime<Utc>,
    ) -> Result<(), RemoteStoreError> {
        let mut inner = self.lock();
        let conv = inner
            .conversations
            .get_mut(&conversation)
            .ok_or(RemoteStoreError::ConversationNotFound(conversation))?;
        conv.last_message_at = Some(at);
        Ok(())
    }

    async fn mark_messages_read(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<(), RemoteStoreError> {
        let mut inner = self.lock();
        for message in inner
            .messages
            .iter_mut()
            .filter(|m| m.conversation_id == conversation && m.sender_id != reader)
        {
            message.read_by_recipient = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleek_shared::records::MessageKind;

    #[tokio::test]
    async fn find_or_create_is_order_insensitive() {
        let store = MemoryStore::new();
        let a = UserId::new();
        let b = UserId::new();

        let first = store.find_or_create_conversation(a, b).await.unwrap();
        let second = store.find_or_create_conversation(b, a).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn salt_of_unknown_conversation_is_an_error() {
        let store = MemoryStore::new();
        let result = store.conversation_salt(ConversationId::new()).await;
        assert!(matches!(
            result,
            Err(RemoteStoreError::ConversationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn set_public_key_upserts_profile() {
        let store = MemoryStore::new();
        let user = UserId::new();

        store
            .set_public_key(user, Some("jwk".into()))
            .await
            .unwrap();
        let profile = store.fetch_profile_keys(user).await.unwrap().unwrap();
        assert_eq!(profile.public_key_jwk.as_deref(), Some("jwk"));
        assert_eq!(store.public_key_writes(), 1);

        // Clearing does not count as a key write.
        store.set_public_key(user, None).await.unwrap();
        assert_eq!(store.public_key_writes(), 1);
    }

    #[tokio::test]
    async fn insert_broadcasts_to_subscribers() {
        let store = MemoryStore::new();
        let a = UserId::new();
        let b = UserId::new();
        let conv = store.find_or_create_conversation(a, b).await.unwrap();

        let mut rx = store.subscribe();
        let inserted = store
            .insert_message(NewMessage {
                conversation_id: conv.id,
                sender_id: a,
                iv_base64: "aXY=".into(),
                ciphertext_base64: "Y3Q=".into(),
                message_type: MessageKind::Text,
                file_url: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.id, inserted.id);
        assert!(!event.read_by_recipient);
    }

    #[tokio::test]
    async fn mark_read_only_touches_peer_messages() {
        let store = MemoryStore::new();
        let a = UserId::new();
        let b = UserId::new();
        let conv = store.find_or_create_conversation(a, b).await.unwrap();

        for sender in [a, b] {
            store
                .insert_message(NewMessage {
                    conversation_id: conv.id,
                    sender_id: sender,
                    iv_base64: "aXY=".into(),
                    ciphertext_base64: "Y3Q=".into(),
                    message_type: MessageKind::Text,
                    file_url: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        store.mark_messages_read(conv.id, a).await.unwrap();
        let messages = store.list_messages(conv.id).await.unwrap();
        for message in messages {
            assert_eq!(message.read_by_recipient, message.sender_id == b);
        }
    }
}

//! Conversation key resolution.
//!
//! Every conversation has exactly one AES-256 key, derived from the ECDH
//! shared secret of the two participants plus a per-conversation HKDF salt
//! persisted on the remote store. The resolver layers three bounded caches
//! over that derivation so steady-state message traffic never touches the
//! network or the local key store.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lru::LruCache;

use fleek_crypto::cipher::{self, ConversationKey};
use fleek_crypto::error::CryptoError;
use fleek_crypto::PublicKey;
use fleek_shared::ids::{ConversationId, UserId};

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::init::IdentityCoordinator;
use crate::remote::RemoteStore;

/// Resolves the symmetric key for a conversation, caching derived keys,
/// peer public keys, and salts.
pub struct ConversationKeyResolver {
    coordinator: IdentityCoordinator,
    remote: Arc<dyn RemoteStore>,
    peer_key_retries: u32,
    peer_key_retry_delay: std::time::Duration,
    keys: Mutex<LruCache<(ConversationId, UserId), ConversationKey>>,
    peer_keys: Mutex<LruCache<UserId, PublicKey>>,
    salts: Mutex<LruCache<ConversationId, Vec<u8>>>,
}

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

impl ConversationKeyResolver {
    pub fn new(
        coordinator: IdentityCoordinator,
        remote: Arc<dyn RemoteStore>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            coordinator,
            remote,
            peer_key_retries: config.peer_key_retries.max(1),
            peer_key_retry_delay: config.peer_key_retry_delay(),
            keys: Mutex::new(LruCache::new(capacity(config.key_cache_capacity))),
            peer_keys: Mutex::new(LruCache::new(capacity(config.peer_cache_capacity))),
            salts: Mutex::new(LruCache::new(capacity(config.salt_cache_capacity))),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.coordinator.user_id()
    }

    /// Run identity initialization for the session user if it has not
    /// happened yet.
    pub async fn ensure_identity(&self) -> Result<(), ChatError> {
        self.coordinator.ensure_identity().await.map(|_| ())
    }

    /// The symmetric key for `conversation` with `peer`, deriving and
    /// persisting the salt on first use.
    pub async fn get_key(
        &self,
        conversation: ConversationId,
        peer: UserId,
    ) -> Result<ConversationKey, ChatError> {
        if let Some(key) = self.lock_keys().get(&(conversation, peer)) {
            return Ok(key.clone());
        }

        let my_secret = self.coordinator.ensure_identity().await?;
        let peer_public = self.peer_public_key(peer).await?;
        let known_salt = self.conversation_salt(conversation).await?;

        let (key, salt) =
            cipher::derive_conversation_key(&my_secret, &peer_public, known_salt.as_deref())?;

        if known_salt.is_none() {
            // Two devices deriving concurrently can both generate a salt;
            // the store keeps whichever write lands last, and the loser's
            // key surfaces as undecryptable history repaired by reset_keys.
            self.remote
                .set_conversation_salt(conversation, Some(BASE64.encode(&salt)))
                .await?;
        }
        self.lock_salts().put(conversation, salt);
        self.lock_keys().put((conversation, peer), key.clone());
        Ok(key)
    }

    /// Drop every cached key and salt for `conversation` and clear the
    /// persisted salt, forcing the next `get_key` to derive fresh material.
    /// Messages encrypted under the old key become permanently unreadable.
    pub async fn reset_keys(
        &self,
        conversation: ConversationId,
        peer: UserId,
    ) -> Result<(), ChatError> {
        self.lock_keys().pop(&(conversation, peer));
        self.lock_salts().pop(&conversation);
        self.lock_peer_keys().pop(&peer);
        self.remote.set_conversation_salt(conversation, None).await?;
        tracing::warn!(%conversation, "conversation keys reset, prior messages are unreadable");
        Ok(())
    }

    async fn peer_public_key(&self, peer: UserId) -> Result<PublicKey, ChatError> {
        if let Some(key) = self.lock_peer_keys().get(&peer) {
            return Ok(*key);
        }

        // The peer may still be mid-initialization, so a missing key gets a
        // bounded number of delayed retries before we give up.
        let mut attempt = 0;
        let public = loop {
            attempt += 1;
            let profile = self.remote.fetch_profile_keys(peer).await?;
            if let Some(jwk) = profile.and_then(|p| p.public_key_jwk) {
                break cipher::public_key_from_jwk(&jwk)?;
            }
            if attempt >= self.peer_key_retries {
                return Err(ChatError::PeerKeysNotReady(peer));
            }
            tokio::time::sleep(self.peer_key_retry_delay).await;
        };

        self.lock_peer_keys().put(peer, public);
        Ok(public)
    }

    async fn conversation_salt(
        &self,
        conversation: ConversationId,
    ) -> Result<Option<Vec<u8>>, ChatError> {
        if let Some(salt) = self.lock_salts().get(&conversation) {
            return Ok(Some(salt.clone()));
        }
        match self.remote.conversation_salt(conversation).await? {
            Some(encoded) => {
                let salt = BASE64.decode(&encoded).map_err(|e| {
                    CryptoError::SerializationError(format!("invalid salt encoding: {e}"))
                })?;
                self.lock_salts().put(conversation, salt.clone());
                Ok(Some(salt))
            }
            None => Ok(None),
        }
    }

    fn lock_keys(
        &self,
    ) -> MutexGuard<'_, LruCache<(ConversationId, UserId), ConversationKey>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_peer_keys(&self) -> MutexGuard<'_, LruCache<UserId, PublicKey>> {
        self.peer_keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_salts(&self) -> MutexGuard<'_, LruCache<ConversationId, Vec<u8>>> {
        self.salts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

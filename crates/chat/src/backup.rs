//! Key backup service — seals the private key into the remote profile and
//! restores it on a new session.
//!
//! The sealing key is derived from session identity alone (see
//! `fleek_crypto::backup`), so anyone holding the user's authenticated
//! session can recover the private key. That is the intended recovery model:
//! convenience over strict end-to-end secrecy against the backend.

use std::sync::Arc;

use fleek_crypto::backup::{derive_backup_key, open_private_key, seal_private_key};
use fleek_crypto::SecretKey;
use fleek_shared::ids::UserId;
use fleek_shared::records::EncryptedKeyBackup;

use crate::error::ChatError;
use crate::remote::RemoteStore;
use crate::session::SessionIdentity;

/// Writes and reads the encrypted private key backup on the profile record.
pub struct KeyBackupService {
    remote: Arc<dyn RemoteStore>,
    session: SessionIdentity,
}

impl KeyBackupService {
    pub fn new(remote: Arc<dyn RemoteStore>, session: SessionIdentity) -> Self {
        Self { remote, session }
    }

    /// Seal the private key under the session-derived backup key and write
    /// the `{iv, ciphertext}` blob to the user's profile record.
    pub async fn backup(&self, user: UserId, secret: &SecretKey) -> Result<(), ChatError> {
        let backup_key = derive_backup_key(&self.session.backup_secret());
        let blob = seal_private_key(&backup_key, secret)?;
        self.remote.set_key_backup(user, blob).await?;
        Ok(())
    }

    /// Decrypt an already-fetched backup blob. Any failure (wrong session
    /// material, tampering) yields `None` — the caller falls back to fresh
    /// key generation.
    pub fn open(&self, blob: &EncryptedKeyBackup) -> Option<SecretKey> {
        let backup_key = derive_backup_key(&self.session.backup_secret());
        match open_private_key(&backup_key, blob) {
            Ok(secret) => Some(secret),
            Err(e) => {
                tracing::warn!(error = %e, "private key backup did not decrypt");
                None
            }
        }
    }

    /// Fetch the user's backup blob from the profile record and decrypt it.
    /// Returns `None` if no blob exists or decryption fails.
    pub async fn restore(&self, user: UserId) -> Option<SecretKey> {
        let profile = match self.remote.fetch_profile_keys(user).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(%user, error = %e, "failed to fetch profile for key restore");
                return None;
            }
        };
        let blob = profile?.encrypted_private_key?;
        self.open(&blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use fleek_crypto::cipher::generate_identity_keypair;

    fn service(session: SessionIdentity) -> (Arc<MemoryStore>, KeyBackupService) {
        let store = Arc::new(MemoryStore::new());
        let svc = KeyBackupService::new(store.clone(), session);
        (store, svc)
    }

    #[tokio::test]
    async fn backup_then_restore_roundtrips() {
        let user = UserId::new();
        let session = SessionIdentity::new(user).with_email("u@example.com");
        let (_store, svc) = service(session);
        let pair = generate_identity_keypair();

        svc.backup(user, &pair.secret).await.unwrap();
        let restored = svc.restore(user).await.unwrap();
        assert_eq!(restored.public_key(), pair.public);
    }

    #[tokio::test]
    async fn restore_without_backup_is_none() {
        let user = UserId::new();
        let (_store, svc) = service(SessionIdentity::new(user));
        assert!(svc.restore(user).await.is_none());
    }

    #[tokio::test]
    async fn restore_with_different_session_material_fails_closed() {
        let user = UserId::new();
        let store = Arc::new(MemoryStore::new());
        let pair = generate_identity_keypair();

        let writer = KeyBackupService::new(
            store.clone(),
            SessionIdentity::new(user).with_email("real@example.com"),
        );
        writer.backup(user, &pair.secret).await.unwrap();

        let reader = KeyBackupService::new(
            store.clone(),
            SessionIdentity::new(user).with_email("other@example.com"),
        );
        assert!(reader.restore(user).await.is_none());
    }
}

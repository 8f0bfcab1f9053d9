//! Identity initialization coordinator.
//!
//! A per-user state machine `Idle -> Initializing -> Initialized` holding a
//! single in-flight shared future, so concurrent callers await the same
//! initialization pass instead of racing into duplicate key generation.
//!
//! The pass itself reconciles four sources: the remote public key, the
//! remote encrypted backup, the local private key, and — when all else
//! fails — fresh generation. Orphaned or incompatible halves are deleted,
//! never silently repaired.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use fleek_crypto::cipher;
use fleek_crypto::error::CryptoError;
use fleek_crypto::store::LocalKeyStore;
use fleek_crypto::SecretKey;
use fleek_shared::ids::UserId;

use crate::backup::KeyBackupService;
use crate::error::ChatError;
use crate::remote::RemoteStore;
use crate::session::SessionIdentity;

/// Cloneable failure carried to every waiter of the shared future.
#[derive(Debug, Clone)]
struct InitFailure(String);

type InitFuture = Shared<BoxFuture<'static, Result<SecretKey, InitFailure>>>;

enum InitState {
    Initializing(InitFuture),
    Initialized,
}

/// Ensures local identity keys exist and are verified compatible with the
/// remote public key, running at most one initialization pass per user at a
/// time. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct IdentityCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    remote: Arc<dyn RemoteStore>,
    local: Arc<LocalKeyStore>,
    backup: KeyBackupService,
    session: SessionIdentity,
    states: Mutex<HashMap<UserId, InitState>>,
}

impl IdentityCoordinator {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        local: Arc<LocalKeyStore>,
        session: SessionIdentity,
    ) -> Self {
        let backup = KeyBackupService::new(remote.clone(), session.clone());
        Self {
            inner: Arc::new(CoordinatorInner {
                remote,
                local,
                backup,
                session,
                states: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.inner.session.user_id
    }

    /// Return the session user's private key, initializing identity state
    /// if needed.
    ///
    /// Once initialized, this is a plain local store read. While an
    /// initialization is in flight, every caller awaits the same shared
    /// future and observes the same outcome.
    pub async fn ensure_identity(&self) -> Result<SecretKey, ChatError> {
        let user = self.inner.session.user_id;
        loop {
            let pending = {
                let mut states = self.inner.lock_states();
                match states.get(&user) {
                    Some(InitState::Initialized) => None,
                    Some(InitState::Initializing(fut)) => Some(fut.clone()),
                    None => {
                        let fut = spawn_initialization(&self.inner, user);
                        states.insert(user, InitState::Initializing(fut.clone()));
                        Some(fut)
                    }
                }
            };

            match pending {
                Some(fut) => {
                    return fut
                        .await
                        .map_err(|e| ChatError::KeyInitializationFailed(e.0));
                }
                None => {
                    if let Some(secret) = self.inner.local.get(&user)? {
                        return Ok(secret);
                    }
                    // The Initialized marker is stale — the local store lost
                    // the key out from under us. Clear it and go again.
                    let mut states = self.inner.lock_states();
                    if matches!(states.get(&user), Some(InitState::Initialized)) {
                        states.remove(&user);
                    }
                }
            }
        }
    }
}

fn spawn_initialization(inner: &Arc<CoordinatorInner>, user: UserId) -> InitFuture {
    let inner = Arc::clone(inner);
    async move {
        let result = inner.run_initialization(user).await;
        {
            let mut states = inner.lock_states();
            match &result {
                Ok(_) => {
                    states.insert(user, InitState::Initialized);
                }
                Err(_) => {
                    states.remove(&user);
                }
            }
        }
        result.map_err(|e| InitFailure(e.to_string()))
    }
    .boxed()
    .shared()
}

impl CoordinatorInner {
    fn lock_states(&self) -> MutexGuard<'_, HashMap<UserId, InitState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One full initialization pass with failure cleanup. Any error deletes
    /// the local private key and clears the remote public key, so a broken
    /// state never survives past this session.
    async fn run_initialization(&self, user: UserId) -> Result<SecretKey, ChatError> {
        match self.initialize_keys(user).await {
            Ok(secret) => Ok(secret),
            Err(err) => {
                tracing::warn!(%user, error = %err, "identity initialization failed, cleaning up key state");
                if let Err(e) = self.local.delete(&user) {
                    tracing::warn!(%user, error = %e, "cleanup: could not delete local private key");
                }
                if let Err(e) = self.remote.set_public_key(user, None).await {
                    tracing::warn!(%user, error = %e, "cleanup: could not clear remote public key");
                }
                Err(err)
            }
        }
    }

    async fn initialize_keys(&self, user: UserId) -> Result<SecretKey, ChatError> {
        let profile = self.remote.fetch_profile_keys(user).await?;
        let mut local = self.local.get(&user)?;

        let (mut public_jwk, backup_blob) = match profile {
            Some(p) => (p.public_key_jwk, p.encrypted_private_key),
            None => (None, None),
        };
        let restored = backup_blob.as_ref().and_then(|blob| self.backup.open(blob));

        // Both halves present: prove they agree, or wipe both and start over.
        if let (Some(jwk), Some(secret)) = (public_jwk.as_deref(), local.as_ref()) {
            let compatible = cipher::public_key_from_jwk(jwk)
                .map(|public| cipher::verify_keypair(&public, secret))
                .unwrap_or(false);
            if compatible {
                return Ok(secret.clone());
            }
            tracing::warn!(%user, "stored key pair is incompatible, discarding both halves");
            self.local.delete(&user)?;
            self.remote.set_public_key(user, None).await?;
            public_jwk = None;
            local = None;
        }

        // Orphaned public key: no private half exists anywhere.
        if public_jwk.is_some() && local.is_none() && restored.is_none() {
            tracing::warn!(%user, "clearing orphaned public key");
            self.remote.set_public_key(user, None).await?;
            public_jwk = None;
        }

        // Orphaned local private key: no public half and no backup.
        if public_jwk.is_none() && local.is_some() && restored.is_none() {
            tracing::warn!(%user, "deleting orphaned local private key");
            self.local.delete(&user)?;
        }

        // Backup restore: put the recovered key in the local store. A public
        // key is a deterministic function of its private key, so a missing
        // public half is re-derived, not regenerated.
        if let Some(secret) = restored {
            self.local.put(&user, &secret)?;
            if public_jwk.is_none() {
                let jwk = cipher::public_key_to_jwk(&secret.public_key());
                self.remote.set_public_key(user, Some(jwk)).await?;
            }
            return Ok(secret);
        }

        // Fresh generation.
        let pair = cipher::generate_identity_keypair();
        if !cipher::verify_keypair(&pair.public, &pair.secret) {
            return Err(
                CryptoError::InvalidKey("generated key pair failed self-check".into()).into(),
            );
        }

        // The three writes form one logical transaction: on any failure the
        // local half is rolled back so no inconsistent pair survives.
        let jwk = cipher::public_key_to_jwk(&pair.public);
        let persisted: Result<(), ChatError> = async {
            self.remote.set_public_key(user, Some(jwk)).await?;
            self.local.put(&user, &pair.secret)?;
            self.backup.backup(user, &pair.secret).await?;
            Ok(())
        }
        .await;

        if let Err(err) = persisted {
            if let Err(e) = self.local.delete(&user) {
                tracing::warn!(%user, error = %e, "rollback: could not delete local private key");
            }
            return Err(ChatError::PersistenceFailed(err.to_string()));
        }

        Ok(pair.secret)
    }
}

//! Private key backup sealing and opening.
//!
//! The backup key is derived with PBKDF2-SHA256 from session-bound material
//! (user id + email, or an access token) and a fixed application salt. This
//! is deliberately NOT a secret-exchanged key: the backup is a convenience
//! recovery path scoped to the user's own authenticated session, and is
//! weaker than true end-to-end secrecy against a compromised backend. Do not
//! "fix" this by strengthening or removing it — the tradeoff is intentional.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use p256::SecretKey;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use fleek_shared::records::EncryptedKeyBackup;

use crate::cipher::{secret_key_from_jwk, secret_key_to_jwk, IV_SIZE};
use crate::error::CryptoError;

/// Fixed application salt for the backup KDF.
pub const BACKUP_KDF_SALT: &[u8] = b"fleek-reporter-key-backup";

/// PBKDF2 iteration count for the backup key.
pub const BACKUP_KDF_ITERATIONS: u32 = 100_000;

/// A derived AES-256 backup key, wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BackupKey {
    key: [u8; 32],
}

impl std::fmt::Debug for BackupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the backup encryption key from a session secret string.
pub fn derive_backup_key(secret: &str) -> BackupKey {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(
        secret.as_bytes(),
        BACKUP_KDF_SALT,
        BACKUP_KDF_ITERATIONS,
        &mut key,
    );
    BackupKey { key }
}

/// Encrypt a private key's JWK representation under the backup key with a
/// fresh random IV, producing the `{iv, ciphertext}` blob stored on the
/// profile record.
pub fn seal_private_key(
    backup_key: &BackupKey,
    secret: &SecretKey,
) -> Result<EncryptedKeyBackup, CryptoError> {
    let jwk = secret_key_to_jwk(secret);

    let cipher = Aes256Gcm::new_from_slice(&backup_key.key)
        .map_err(|e| CryptoError::Unavailable(format!("cipher setup failed: {e}")))?;

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), jwk.as_bytes())
        .map_err(|e| CryptoError::Unavailable(format!("backup encryption failed: {e}")))?;

    Ok(EncryptedKeyBackup {
        iv: iv.to_vec(),
        ciphertext,
    })
}

/// Decrypt a backup blob and parse the recovered private key.
pub fn open_private_key(
    backup_key: &BackupKey,
    backup: &EncryptedKeyBackup,
) -> Result<SecretKey, CryptoError> {
    if backup.iv.len() != IV_SIZE {
        return Err(CryptoError::DecryptionFailed(format!(
            "bad backup iv length: {}",
            backup.iv.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(&backup_key.key)
        .map_err(|e| CryptoError::Unavailable(format!("cipher setup failed: {e}")))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(&backup.iv), backup.ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed("backup blob did not decrypt".into()))?;

    let jwk = String::from_utf8(plaintext)
        .map_err(|e| CryptoError::SerializationError(format!("backup is not utf-8: {e}")))?;

    secret_key_from_jwk(&jwk)
}

//! Durable local store for identity private keys.
//!
//! Holds the local-only private half of each user's identity keypair, keyed
//! by user id. Survives application restarts but is explicitly never synced —
//! recovery on a new device goes through the encrypted profile backup. An
//! entry that fails to parse is deleted, not repaired.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use p256::SecretKey;
use rusqlite::Connection;

use fleek_shared::ids::UserId;

use crate::cipher::{secret_key_from_jwk, secret_key_to_jwk};
use crate::error::CryptoError;

const MIGRATIONS: &[(i32, &str)] = &[(1, MIGRATION_001)];

const MIGRATION_001: &str = "
CREATE TABLE IF NOT EXISTS identity_private_keys (
    user_id          TEXT PRIMARY KEY,
    private_key_jwk  TEXT NOT NULL,
    created_at       INTEGER NOT NULL
);
";

fn run_migrations(conn: &Connection) -> Result<(), CryptoError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _key_store_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _key_store_migrations",
        [],
        |row| row.get(0),
    )?;

    for &(version, sql) in MIGRATIONS {
        if version > current_version {
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO _key_store_migrations (version) VALUES (?1)",
                [version],
            )?;
            tx.commit()?;
        }
    }

    Ok(())
}

fn configure_connection(conn: &Connection) -> Result<(), CryptoError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    Ok(())
}

/// Durable local private key store backed by SQLite.
pub struct LocalKeyStore {
    conn: Mutex<Connection>,
}

impl LocalKeyStore {
    /// Open (or create) the store at the given path and apply migrations.
    pub fn open(path: &Path) -> Result<Self, CryptoError> {
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store. Used by tests and ephemeral sessions.
    pub fn open_in_memory() -> Result<Self, CryptoError> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fetch the stored private key for a user, if any.
    ///
    /// A row whose JWK no longer parses is treated as corrupt: the entry is
    /// deleted and `None` is returned so the caller falls back to recovery
    /// or regeneration.
    pub fn get(&self, user_id: &UserId) -> Result<Option<SecretKey>, CryptoError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let jwk: Option<String> = match conn.query_row(
            "SELECT private_key_jwk FROM identity_private_keys WHERE user_id = ?1",
            [user_id.to_string()],
            |row| row.get(0),
        ) {
            Ok(jwk) => Some(jwk),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        let Some(jwk) = jwk else {
            return Ok(None);
        };

        match secret_key_from_jwk(&jwk) {
            Ok(secret) => Ok(Some(secret)),
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "stored private key is corrupt, deleting");
                conn.execute(
                    "DELETE FROM identity_private_keys WHERE user_id = ?1",
                    [user_id.to_string()],
                )?;
                Ok(None)
            }
        }
    }

    /// Store (or replace) a user's private key.
    pub fn put(&self, user_id: &UserId, secret: &SecretKey) -> Result<(), CryptoError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| CryptoError::StorageError("system clock before epoch".into()))?
            .as_secs() as i64;

        let jwk = secret_key_to_jwk(secret);
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO identity_private_keys (user_id, private_key_jwk, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 private_key_jwk = excluded.private_key_jwk,
                 created_at = excluded.created_at",
            rusqlite::params![user_id.to_string(), jwk.as_str(), now],
        )?;
        Ok(())
    }

    /// Delete a user's private key. A no-op if none is stored.
    pub fn delete(&self, user_id: &UserId) -> Result<(), CryptoError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "DELETE FROM identity_private_keys WHERE user_id = ?1",
            [user_id.to_string()],
        )?;
        Ok(())
    }
}

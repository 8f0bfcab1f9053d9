//! fleek-crypto — cryptographic core of the fleek encrypted chat subsystem.
//!
//! Provides P-256 identity keypair generation, ECDH + HKDF-SHA256 conversation
//! key derivation, AES-256-GCM message encryption, PBKDF2-sealed private key
//! backup, and a durable local private key store backed by SQLite.

pub mod backup;
pub mod cipher;
pub mod error;
pub mod store;

pub use p256::{PublicKey, SecretKey};

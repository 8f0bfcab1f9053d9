//! End-to-end encrypted direct messaging.
//!
//! Ties the crypto primitives in `fleek-crypto` to a remote store: identity
//! initialization with single-flight coordination, per-conversation key
//! resolution with bounded caches, and the encrypt-on-send /
//! decrypt-on-read message pipeline. The remote store itself is a trait;
//! [`memory::MemoryStore`] backs the tests and any backend implementing
//! [`remote::RemoteStore`] backs production.

pub mod backup;
pub mod config;
pub mod error;
pub mod init;
pub mod memory;
pub mod pipeline;
pub mod remote;
pub mod resolver;
pub mod session;

pub use config::ChatConfig;
pub use error::ChatError;
pub use init::IdentityCoordinator;
pub use pipeline::{Attachment, AttachmentKind, ConversationHistory, DecryptedMessage, MessagePipeline};
pub use resolver::ConversationKeyResolver;
pub use session::SessionIdentity;

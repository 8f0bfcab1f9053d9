//! Fleek shared library — typed IDs, persisted record shapes, and the
//! application-level error type shared between the chat subsystem and its hosts.

pub mod error;
pub mod ids;
pub mod records;

//! Infrastructure layer for Volpina.
//!
//! Contains the SQLite implementation of the `ConversationStore` trait defined
//! in `volpina-core`, the database pool, and configuration loading.

pub mod config;
pub mod sqlite;

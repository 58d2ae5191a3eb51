//! Business logic and repository trait definitions for Volpina.
//!
//! This crate defines the retention policy, the `ConversationStore` port that
//! the infrastructure layer implements, and the `MessageService` that
//! sequences append-then-prune. It depends only on `volpina-types` -- never on
//! `volpina-infra` or any database/IO crate.

pub mod repository;
pub mod retention;
pub mod service;

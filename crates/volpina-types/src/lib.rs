//! Shared domain types for Volpina.
//!
//! This crate contains the message record, the append request accepted at the
//! service boundary, service configuration, and the error taxonomy shared by
//! the core, infra, and API layers.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod message;

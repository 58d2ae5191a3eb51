//! HTTP API layer for Volpina.
//!
//! Plain axum routes over the message service: text bodies for commands,
//! JSON for queries, permissive CORS.

pub mod error;
pub mod handlers;
pub mod router;

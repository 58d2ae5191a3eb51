//! Business-logic services built on the repository traits.

pub mod message;

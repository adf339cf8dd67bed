//! Shared-memory building blocks used between producer and consumer contexts.
pub mod ring;
pub mod snapshot;

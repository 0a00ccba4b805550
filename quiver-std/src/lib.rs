//! # quiver-std
//!
//! Standard pieces for the Quiver reactive engine.
//!
//! This crate provides:
//! - **Host schedulers**: adapters that let a [`Loop`](quiver_core::Loop)
//!   request flushes from a `futures` local pool or a `tokio` local set
//! - **Metadata bridge**: serializable class descriptions and a loader that
//!   rebuilds classes from them
//! - **Testing utilities**: [`EventRecorder`](testing::EventRecorder) and
//!   [`ManualHost`](testing::ManualHost)

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core types
pub use quiver_core;

// Modules
pub mod host;
pub mod metadata;
pub mod testing;

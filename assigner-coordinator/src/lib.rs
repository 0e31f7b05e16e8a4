//! Watch the worker registry and the record store, and republish the
//! worker -> records assignment whenever either of them changes.
pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod error;

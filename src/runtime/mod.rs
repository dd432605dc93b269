//! Runtime support for streams.
//!
//! This module provides the per-thread execution context streams are created
//! under: identity generation and propagation limits.

mod context;

pub use context::{Config, Runtime};

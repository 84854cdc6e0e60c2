//! Shared domain model, events, errors, and configuration for AERIS.
//!
//! This crate holds everything the service crates agree on: the canonical
//! air-quality types, the realtime event enum, the error taxonomy, and
//! settings loading. It performs no network I/O.

pub mod config;
pub mod error;
pub mod events;
pub mod model;

pub use error::{Error, Result};

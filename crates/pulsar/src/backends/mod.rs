//! Backend implementations for the heartbeat store
//!
//! This module provides different storage backends:
//! - `sqlite`: SQLite-based backend (default, requires `sqlite` feature)
//! - `memory`: In-process backend for tests and local development

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

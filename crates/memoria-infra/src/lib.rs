//! Infrastructure layer for Memoria.
//!
//! Implements the ports defined in `memoria-core`: the SQLite record store,
//! embedding providers, configuration loading, and data directory layout.

pub mod config;
pub mod embedding;
pub mod filesystem;
pub mod sqlite;

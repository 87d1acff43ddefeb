//! Shared domain types for Memoria.
//!
//! This crate contains the domain types used across the Memoria workspace:
//! memory records, search requests and responses, backfill reports,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod memory;
pub mod reconcile;
pub mod search;

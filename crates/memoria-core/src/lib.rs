//! Business logic and port trait definitions for Memoria.
//!
//! This crate defines the "ports" (store, embedder, scorer, enricher traits)
//! that the infrastructure layer implements, and the retrieval, write, and
//! backfill logic built on them. It depends only on `memoria-types` -- never
//! on `memoria-infra` or any database/IO crate.

pub mod memory;

//! core
//!
//! Core domain types, configuration, and path routing for prior.
//!
//! # Modules
//!
//! - [`types`] - Strong types: EntityName, RepoName, Oid, Reference
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Centralized path routing for the snapshot cache
//! - [`cancel`] - Caller-supplied cancellation and deadlines
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Every on-disk location is computed in one place

pub mod cancel;
pub mod config;
pub mod paths;
pub mod types;

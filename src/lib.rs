//! prior - versioned dataset snapshots with lazy, memoized record access
//!
//! prior turns a dataset reference (entity, repository, revision) into an
//! immutable local snapshot of the repository at the resolved commit, and
//! exposes the snapshot's manifest as lazily materialized record sequences.
//!
//! # Architecture
//!
//! The crate is layered, leaf-first:
//!
//! - [`core`] - Domain types, configuration, cache paths, cancellation
//! - [`transport`] - The only code that talks to remote repositories
//! - [`resolve`] - Revision (tag, branch, commit) to exact commit
//! - [`cache`] - Single-materialization on-disk snapshot cache
//! - [`manifest`] - Manifest schema, record sources, and the loader
//! - [`dataset`] - Memoizing record sequences and split dictionaries
//! - [`auth`] - Credentials and their precedence chain
//! - [`secrets`] - Session secret storage
//! - [`client`] - The [`Prior`] client composing all of the above
//!
//! # Correctness Invariants
//!
//! 1. At most one fetch per commit runs at a time, across threads and
//!    processes sharing a cache root
//! 2. A snapshot is visible only once complete (rename into place)
//! 3. A published snapshot is never modified
//! 4. Each record is decoded at most once, whether reached by index or by
//!    iteration
//!
//! # Example
//!
//! ```no_run
//! use prior::Prior;
//! use prior::core::config::Config;
//!
//! let client = Prior::from_config(&Config::load()?)?;
//! let dict = client.resolve_and_load("acme", "demo-data", "v1.0", None)?;
//! let train = dict.get("train")?;
//! println!("{}", train);
//! let first = train.get(0)?;
//! # Ok::<(), prior::PriorError>(())
//! ```

pub mod auth;
pub mod cache;
pub mod client;
pub mod core;
pub mod dataset;
pub mod error;
pub mod manifest;
pub mod resolve;
pub mod secrets;
pub mod transport;

pub use client::{default_client, resolve_and_load, Prior};
pub use error::{ErrorKind, PriorError, Result};

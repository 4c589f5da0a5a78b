//! transport
//!
//! Abstraction over the version-control client that reads remote dataset
//! repositories.
//!
//! # Architecture
//!
//! The [`Transport`] trait is the seam between this crate and the outside
//! world. The resolver uses it to list refs and check commit existence;
//! the snapshot cache uses it to write a commit's tree into a staging
//! directory. Nothing else talks to a remote.
//!
//! # Implementations
//!
//! - [`GitTransport`] - libgit2 via the `git2` crate (production)
//! - [`mock::MockTransport`] - in-memory, deterministic (tests)

mod git;
pub mod mock;
mod traits;

pub use git::GitTransport;
pub use traits::{RemoteLocation, RemoteRef, Transport, TransportError};

//! # capdb Storage
//!
//! Positional byte-store backends for capdb.
//!
//! This crate provides the lowest-level storage abstraction for the capped
//! store. Backends are **opaque byte stores** addressed by absolute offset -
//! they do not interpret the data they hold.
//!
//! ## Design Principles
//!
//! - Backends expose positional reads and writes (the capped store
//!   overwrites in place and backfills block headers, so append-only
//!   semantics are not enough)
//! - No knowledge of the circular layout, block framing, or compression
//! - Must be `Send + Sync` for concurrent access
//! - capdb_core owns all format interpretation
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral stores
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use capdb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.write_at(0, b"hello world").unwrap();
//! let mut buf = [0u8; 5];
//! backend.read_at(6, &mut buf).unwrap();
//! assert_eq!(&buf, b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;

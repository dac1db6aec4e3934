//! # capdb Core
//!
//! A fixed-capacity, circular, on-disk block store for variable-length
//! compressed payloads.
//!
//! The store persists payloads that are too large or too numerous to keep
//! in a primary index - captured trace detail, stack dumps, profiling
//! output - while bounding total disk usage to a configured size. Once the
//! capacity is exhausted, new writes wrap around the backing file and
//! recycle the oldest blocks; the owning index keeps the returned
//! [`BlockId`]s and asks the store whether they are still live.
//!
//! This crate provides:
//! - [`CappedStore`] - serialized compress-and-append writes, lazy
//!   re-openable reads, expiry queries, online resize
//! - Wraparound-aware circular allocation with crash-recoverable header
//!   bookkeeping
//! - [`ShutdownRegistry`] - deterministic shutdown-hook registration
//! - [`FlushScheduler`] - the collaborator interface for periodic
//!   durability flushes
//!
//! ## Example
//!
//! ```rust
//! use capdb_core::{CappedStore, Config};
//! use std::io::Read;
//!
//! let store = CappedStore::open_in_memory(Config::new().size_kb(64)).unwrap();
//!
//! let id = store.write(&b"a long stack dump"[..]).unwrap();
//! assert!(!store.is_expired(id));
//!
//! let mut out = Vec::new();
//! store.read(id, "EXPIRED").open().read_to_end(&mut out).unwrap();
//! assert_eq!(&out, b"a long stack dump");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod allocator;
mod config;
mod error;
mod flush;
mod reader;
mod shutdown;
mod store;
mod types;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use flush::{FlushScheduler, FlushTask};
pub use reader::BlockSource;
pub use shutdown::{ShutdownHandle, ShutdownRegistry};
pub use store::{CappedStore, StoreStats};
pub use types::BlockId;

// Re-exported so callers can wire custom backends and codecs without
// depending on the lower crates directly.
pub use capdb_codec::{BlockCodec, GzipCodec, IdentityCodec};
pub use capdb_storage::{FileBackend, InMemoryBackend, StorageBackend};

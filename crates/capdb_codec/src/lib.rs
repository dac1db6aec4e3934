//! # capdb Codec
//!
//! Streaming block compression for capdb.
//!
//! Every block in the capped store is written through a compressing writer
//! and read back through a decompressing reader. This crate defines that
//! abstraction ([`BlockCodec`]) so the store never depends on a concrete
//! algorithm, plus two implementations:
//!
//! - [`GzipCodec`] - gzip streams, the default for real stores
//! - [`IdentityCodec`] - pass-through, for tests that need byte-exact
//!   control over block sizes
//!
//! ## Usage
//!
//! ```
//! use capdb_codec::{BlockCodec, GzipCodec};
//! use std::io::{Cursor, Read};
//!
//! let codec = GzipCodec::new();
//!
//! let mut compressed = Vec::new();
//! codec.compress(&mut &b"hello hello hello"[..], &mut compressed).unwrap();
//!
//! let mut decoded = Vec::new();
//! codec
//!     .decompressor(Box::new(Cursor::new(compressed)))
//!     .read_to_end(&mut decoded)
//!     .unwrap();
//! assert_eq!(&decoded, b"hello hello hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod gzip;
mod identity;

pub use gzip::GzipCodec;
pub use identity::IdentityCodec;

use std::io::{self, Read, Write};

/// A streaming compression codec applied to block payloads.
///
/// Implementations must be safe to share across threads; the store holds a
/// single codec instance for its whole lifetime.
pub trait BlockCodec: Send + Sync {
    /// Streams `src` through the compressor into `dst`, finalizing the
    /// compressed frame.
    ///
    /// Returns the number of *uncompressed* bytes consumed from `src`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading `src` or writing `dst` fails.
    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> io::Result<u64>;

    /// Wraps `src` in a decompressing reader.
    fn decompressor<'a>(&self, src: Box<dyn Read + Send + 'a>) -> Box<dyn Read + Send + 'a>;
}

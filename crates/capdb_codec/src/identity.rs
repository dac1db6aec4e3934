//! Pass-through implementation of the block codec.

use crate::BlockCodec;
use std::io::{self, Read, Write};

/// A [`BlockCodec`] that stores payloads verbatim.
///
/// Useful in tests where block sizes must be predictable down to the byte,
/// e.g. when positioning a block exactly on the wraparound point.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl IdentityCodec {
    /// Creates a pass-through codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BlockCodec for IdentityCodec {
    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> io::Result<u64> {
        io::copy(src, dst)
    }

    fn decompressor<'a>(&self, src: Box<dyn Read + Send + 'a>) -> Box<dyn Read + Send + 'a> {
        src
    }
}

//! Gzip implementation of the block codec.

use crate::BlockCodec;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// A [`BlockCodec`] backed by gzip streams.
///
/// This is the default codec for persistent stores. Trace detail and stack
/// dumps are highly repetitive text, so even the default compression level
/// typically shrinks payloads severalfold.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    /// Creates a codec using the default compression level.
    #[must_use]
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    /// Creates a codec with an explicit compression level (0-9).
    #[must_use]
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockCodec for GzipCodec {
    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write) -> io::Result<u64> {
        let mut encoder = GzEncoder::new(dst, self.level);
        let copied = io::copy(src, &mut encoder)?;
        encoder.finish()?;
        Ok(copied)
    }

    fn decompressor<'a>(&self, src: Box<dyn Read + Send + 'a>) -> Box<dyn Read + Send + 'a> {
        Box::new(GzDecoder::new(src))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(codec: &GzipCodec, payload: &[u8]) -> Vec<u8> {
        let mut compressed = Vec::new();
        let copied = codec.compress(&mut &payload[..], &mut compressed).unwrap();
        assert_eq!(copied, payload.len() as u64);

        let mut decoded = Vec::new();
        codec
            .decompressor(Box::new(Cursor::new(compressed)))
            .read_to_end(&mut decoded)
            .unwrap();
        decoded
    }

    #[test]
    fn gzip_roundtrip() {
        let codec = GzipCodec::new();
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(100);
        assert_eq!(roundtrip(&codec, &payload), payload);
    }

    #[test]
    fn gzip_roundtrip_empty() {
        let codec = GzipCodec::new();
        assert_eq!(roundtrip(&codec, b""), b"");
    }

    #[test]
    fn gzip_shrinks_repetitive_input() {
        let codec = GzipCodec::new();
        let payload = vec![b'a'; 8192];

        let mut compressed = Vec::new();
        codec.compress(&mut &payload[..], &mut compressed).unwrap();
        assert!(compressed.len() < payload.len() / 4);
    }

    #[test]
    fn gzip_explicit_level() {
        let codec = GzipCodec::with_level(9);
        let payload = b"compression level nine".repeat(50);
        assert_eq!(roundtrip(&codec, &payload), payload);
    }
}

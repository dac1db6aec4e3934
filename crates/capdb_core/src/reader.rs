//! Lazy block readers.
//!
//! A [`BlockSource`] is a handle to one block; it performs no I/O until
//! opened, and can be opened any number of times. Underneath each opened
//! stream sits a [`RawBlockReader`], which takes the store lock for every
//! physical chunk and re-validates that the block has not been recycled -
//! wraparound can overtake a block between two chunks of the same logical
//! read, and a stale check would hand out garbage bytes.

use crate::allocator::BLOCK_HEADER_BYTES;
use crate::error::CoreError;
use crate::store::StoreInner;
use crate::types::BlockId;
use std::io::{self, BufReader, Cursor, Read};
use std::sync::Arc;
use tracing::warn;

/// A lazy, re-openable handle to one block's decompressed bytes.
///
/// Returned by [`CappedStore::read`](crate::CappedStore::read). If the
/// block has expired by the time the source is opened, the stream yields
/// the caller-supplied fallback text instead.
pub struct BlockSource {
    inner: Arc<StoreInner>,
    id: BlockId,
    fallback: String,
}

impl BlockSource {
    pub(crate) fn new(inner: Arc<StoreInner>, id: BlockId, fallback: String) -> Self {
        Self { inner, id, fallback }
    }

    /// Returns the id this source reads.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Opens a reader over the block.
    ///
    /// If the block is overwritten (or the store is closed), the reader
    /// yields the fallback text. Otherwise the stream is
    /// decompressor-over-buffer-over-raw-reader; the buffer is required
    /// because every raw read is a seek+read under the store lock.
    #[must_use]
    pub fn open(&self) -> Box<dyn Read + Send> {
        let gone = {
            let state = self.inner.state.lock();
            match state.allocator.as_ref() {
                Some(allocator) => allocator.is_overwritten(self.id),
                None => true,
            }
        };
        if gone {
            return Box::new(Cursor::new(self.fallback.clone().into_bytes()));
        }

        let raw = RawBlockReader {
            inner: Arc::clone(&self.inner),
            id: self.id,
            block_len: None,
            pos: 0,
        };
        let buffered = BufReader::with_capacity(self.inner.read_buffer_size, raw);
        self.inner.codec.decompressor(Box::new(buffered))
    }
}

impl std::fmt::Debug for BlockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSource").field("id", &self.id).finish()
    }
}

/// Reads one block's compressed bytes chunk by chunk.
///
/// Each `read` is a transactional seek+read under the store lock, bounded
/// by the three-way minimum of the caller's buffer, the bytes left in the
/// block, and the bytes left before the physical wrap point. The short
/// read at the wrap makes the caller come back for the remainder at
/// physical offset zero.
struct RawBlockReader {
    inner: Arc<StoreInner>,
    id: BlockId,
    /// Payload length from the block's prefix; learned on first read.
    block_len: Option<u64>,
    /// Payload bytes consumed so far.
    pos: u64,
}

impl Read for RawBlockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if buf.len() == 1 {
            warn!("single-byte raw block read; wrap RawBlockReader in a buffered reader");
        }
        if let Some(len) = self.block_len {
            if self.pos == len {
                return Ok(0);
            }
        }

        let state = self.inner.state.lock();
        let allocator = state
            .allocator
            .as_ref()
            .ok_or_else(|| io::Error::from(CoreError::Closed))?;

        // Re-validated on every chunk, not cached: a concurrent write may
        // have wrapped past this block since the previous chunk.
        if allocator.is_overwritten(self.id) {
            return Err(CoreError::RolledOver.into());
        }

        let block_len = match self.block_len {
            Some(len) => len,
            None => {
                let mut prefix = [0u8; BLOCK_HEADER_BYTES as usize];
                allocator.read_wrapped(self.id.as_u64(), &mut prefix)?;
                let len = u64::from_le_bytes(prefix);
                self.block_len = Some(len);
                len
            }
        };

        let block_remaining = block_len - self.pos;
        if block_remaining == 0 {
            return Ok(0);
        }

        let abs = self.id.as_u64() + BLOCK_HEADER_BYTES + self.pos;
        let file_pos = allocator.convert_to_file_position(abs);
        let file_remaining = allocator.capacity_bytes() - file_pos;
        let n = (buf.len() as u64).min(block_remaining).min(file_remaining) as usize;

        allocator.read_data(file_pos, &mut buf[..n])?;
        self.pos += n as u64;
        Ok(n)
    }
}

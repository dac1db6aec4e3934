//! Circular block allocation over a fixed-capacity data region.
//!
//! The allocator owns the backing byte store and the absolute write cursor.
//! The cursor counts every byte ever allocated since the store was created;
//! it is never reset by wraparound or resize, so a block id (the cursor
//! value at the block's length header) stays unique for the life of the
//! store. Physical placement is `cursor mod capacity`, after a fixed header
//! region that persists the allocator's bookkeeping across restarts.
//!
//! All methods assume the caller holds the store's lock.

use crate::error::{CoreError, CoreResult};
use crate::types::BlockId;
use capdb_storage::StorageBackend;
use std::io::{self, Write};

/// Size of the fixed header region at the start of the backing store.
///
/// Layout: magic (4) + version (2) + reserved (2) + cursor (8) +
/// capacity (8) + reserved (8).
pub(crate) const HEADER_SKIP_BYTES: u64 = 32;

/// Size of the per-block length prefix.
pub(crate) const BLOCK_HEADER_BYTES: u64 = 8;

const STORE_MAGIC: [u8; 4] = *b"CPDB";
const STORE_VERSION: u16 = 1;

/// Owns the circular data region: cursor arithmetic, block framing, and
/// header bookkeeping.
pub(crate) struct BlockAllocator {
    backend: Box<dyn StorageBackend>,
    /// Size of the data region in bytes.
    capacity: u64,
    /// Absolute bytes allocated since store creation.
    cursor: u64,
    /// Cursor value at the current block's length header.
    block_start: u64,
    in_block: bool,
    sync_needed: bool,
}

impl BlockAllocator {
    /// Opens an allocator over `backend` with the requested capacity.
    ///
    /// A backing store shorter than the header region is initialized
    /// fresh. Otherwise the header is validated and the cursor restored;
    /// if the stored capacity differs from the requested one, all existing
    /// blocks are invalidated exactly as in [`resize`](Self::resize).
    pub(crate) fn open(backend: Box<dyn StorageBackend>, size_kb: u64) -> CoreResult<Self> {
        let capacity = checked_capacity(size_kb)?;
        let mut allocator = Self {
            backend,
            capacity,
            cursor: 0,
            block_start: 0,
            in_block: false,
            sync_needed: false,
        };

        if allocator.backend.size()? < HEADER_SKIP_BYTES {
            allocator.write_header()?;
            allocator.backend.sync()?;
        } else {
            let (stored_cursor, stored_capacity) = allocator.read_header()?;
            allocator.cursor = stored_cursor;
            if stored_capacity != capacity {
                allocator.invalidate_all()?;
            }
        }

        Ok(allocator)
    }

    /// Begins a new block at the current cursor, reserving the length slot.
    pub(crate) fn start_block(&mut self) {
        debug_assert!(!self.in_block);
        self.block_start = self.cursor;
        self.cursor += BLOCK_HEADER_BYTES;
        self.in_block = true;
    }

    /// Finalizes the in-progress block: backfills the realized payload
    /// length into the reserved slot and returns the block's id.
    pub(crate) fn end_block(&mut self) -> CoreResult<BlockId> {
        debug_assert!(self.in_block);
        self.in_block = false;

        let payload_len = self.cursor - self.block_start - BLOCK_HEADER_BYTES;
        self.write_wrapped(self.block_start, &payload_len.to_le_bytes())?;
        self.write_header()?;
        self.sync_needed = true;

        Ok(BlockId::new(self.block_start))
    }

    /// Abandons the in-progress block after a mid-stream failure.
    ///
    /// The cursor is not rewound: bytes already streamed may have
    /// overwritten older data, and the overwrite boundary must keep
    /// covering them. The orphaned region is unreachable because its id is
    /// never handed out.
    pub(crate) fn abort_block(&mut self) {
        self.in_block = false;
    }

    /// Maps an absolute position into the data region.
    ///
    /// Callers add [`HEADER_SKIP_BYTES`] when touching the backing store.
    pub(crate) fn convert_to_file_position(&self, pos: u64) -> u64 {
        pos % self.capacity
    }

    /// Returns true if the block at `id` has been overwritten by newer
    /// writes wrapping around the region.
    pub(crate) fn is_overwritten(&self, id: BlockId) -> bool {
        id.as_u64() < self.cursor.saturating_sub(self.capacity)
    }

    /// Returns the overwrite boundary: the smallest id still guaranteed
    /// intact.
    pub(crate) fn smallest_non_overwritten_id(&self) -> BlockId {
        BlockId::new(self.cursor.saturating_sub(self.capacity))
    }

    /// Changes the capacity, invalidating every previously written block.
    ///
    /// Remapping old offsets under a new modulus cannot be done safely in
    /// place, so resize advances the cursor by the new capacity: the new
    /// overwrite boundary lands exactly on the old cursor and every id
    /// issued so far falls below it. The data region is truncated and
    /// writing resumes under the new modulus.
    pub(crate) fn resize(&mut self, new_size_kb: u64) -> CoreResult<()> {
        debug_assert!(!self.in_block);
        let new_capacity = checked_capacity(new_size_kb)?;
        if new_capacity == self.capacity {
            return Ok(());
        }
        self.capacity = new_capacity;
        self.invalidate_all()
    }

    /// Returns the configured capacity in kilobytes.
    pub(crate) fn size_kb(&self) -> u64 {
        self.capacity / 1024
    }

    /// Returns the configured capacity in bytes.
    pub(crate) fn capacity_bytes(&self) -> u64 {
        self.capacity
    }

    /// Returns the absolute write cursor.
    pub(crate) fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Forces bookkeeping to stable storage if any block was finalized
    /// since the last sync.
    pub(crate) fn sync(&mut self) -> CoreResult<()> {
        if self.sync_needed {
            self.backend.sync()?;
            self.sync_needed = false;
        }
        Ok(())
    }

    /// Final header write + sync before the backing store is dropped.
    pub(crate) fn close(&mut self) -> CoreResult<()> {
        self.write_header()?;
        self.backend.sync()?;
        self.sync_needed = false;
        Ok(())
    }

    /// Reads `buf.len()` bytes at absolute position `pos`, splitting at the
    /// wrap point as needed. Used for the length prefix, which may itself
    /// straddle the end of the region.
    pub(crate) fn read_wrapped(&self, mut pos: u64, buf: &mut [u8]) -> CoreResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let file_pos = self.convert_to_file_position(pos);
            let until_wrap = self.capacity - file_pos;
            let n = ((buf.len() - filled) as u64).min(until_wrap) as usize;
            self.backend
                .read_at(HEADER_SKIP_BYTES + file_pos, &mut buf[filled..filled + n])?;
            pos += n as u64;
            filled += n;
        }
        Ok(())
    }

    /// Reads from a single physical position in the data region.
    ///
    /// The caller is responsible for not crossing the wrap point; see the
    /// three-way minimum in the raw block reader.
    pub(crate) fn read_data(&self, file_pos: u64, buf: &mut [u8]) -> CoreResult<()> {
        self.backend.read_at(HEADER_SKIP_BYTES + file_pos, buf)?;
        Ok(())
    }

    fn write_wrapped(&mut self, mut pos: u64, mut data: &[u8]) -> CoreResult<()> {
        while !data.is_empty() {
            let file_pos = self.convert_to_file_position(pos);
            let until_wrap = self.capacity - file_pos;
            let n = (data.len() as u64).min(until_wrap) as usize;
            self.backend.write_at(HEADER_SKIP_BYTES + file_pos, &data[..n])?;
            pos += n as u64;
            data = &data[n..];
        }
        Ok(())
    }

    fn invalidate_all(&mut self) -> CoreResult<()> {
        self.cursor += self.capacity;
        self.backend.set_len(HEADER_SKIP_BYTES)?;
        self.write_header()?;
        self.backend.sync()?;
        self.sync_needed = false;
        Ok(())
    }

    fn write_header(&mut self) -> CoreResult<()> {
        let mut header = [0u8; HEADER_SKIP_BYTES as usize];
        header[0..4].copy_from_slice(&STORE_MAGIC);
        header[4..6].copy_from_slice(&STORE_VERSION.to_le_bytes());
        header[8..16].copy_from_slice(&self.cursor.to_le_bytes());
        header[16..24].copy_from_slice(&self.capacity.to_le_bytes());
        self.backend.write_at(0, &header)?;
        Ok(())
    }

    fn read_header(&self) -> CoreResult<(u64, u64)> {
        let mut header = [0u8; HEADER_SKIP_BYTES as usize];
        self.backend.read_at(0, &mut header)?;

        if header[0..4] != STORE_MAGIC {
            return Err(CoreError::invalid_format("bad magic in store header"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != STORE_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported store version {version}"
            )));
        }

        let mut word = [0u8; 8];
        word.copy_from_slice(&header[8..16]);
        let cursor = u64::from_le_bytes(word);
        word.copy_from_slice(&header[16..24]);
        let capacity = u64::from_le_bytes(word);

        Ok((cursor, capacity))
    }
}

/// Streaming append for the in-progress block. Writes split transparently
/// at the wrap point; the cursor advances with every byte and never
/// rewinds.
impl Write for BlockAllocator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        debug_assert!(self.in_block);
        self.write_wrapped(self.cursor, buf).map_err(io::Error::from)?;
        self.cursor += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.backend.flush().map_err(io::Error::from)
    }
}

fn checked_capacity(size_kb: u64) -> CoreResult<u64> {
    if size_kb == 0 {
        return Err(CoreError::invalid_capacity("capacity must be at least 1 KB"));
    }
    size_kb
        .checked_mul(1024)
        .ok_or_else(|| CoreError::invalid_capacity(format!("{size_kb} KB overflows")))
}

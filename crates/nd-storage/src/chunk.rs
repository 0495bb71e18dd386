//! Fixed-size chunks backing the store.
//!
//! The store is a sequence of equally sized chunks kept in memory. Each chunk
//! carries a dirty flag so a flush only rewrites the chunks touched since the
//! previous flush.

use nd_common::error::{NdError, NdResult};
use nd_common::types::Address;

/// A single chunk of the store.
pub(crate) struct Chunk {
    data: Box<[u8]>,
    dirty: bool,
}

impl Chunk {
    fn zeroed(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
            dirty: true,
        }
    }
}

/// In-memory image of the database file.
pub(crate) struct ChunkStore {
    chunk_size: usize,
    chunks: Vec<Chunk>,
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("chunk_size", &self.chunk_size)
            .field("chunks", &self.chunks.len())
            .field("dirty", &self.chunks.iter().filter(|c| c.dirty).count())
            .finish()
    }
}

impl ChunkStore {
    /// Creates an empty store.
    pub(crate) fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunks: Vec::new(),
        }
    }

    /// Builds a store from the raw contents of a file.
    ///
    /// A trailing partial chunk is zero-padded. Loaded chunks start clean.
    pub(crate) fn from_bytes(chunk_size: usize, bytes: &[u8]) -> Self {
        let chunks = bytes
            .chunks(chunk_size)
            .map(|piece| {
                let mut chunk = Chunk::zeroed(chunk_size);
                chunk.data[..piece.len()].copy_from_slice(piece);
                chunk.dirty = false;
                chunk
            })
            .collect();
        Self { chunk_size, chunks }
    }

    /// Returns the chunk size in bytes.
    #[inline]
    pub(crate) fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the total size of the store in bytes.
    #[inline]
    pub(crate) fn len(&self) -> u64 {
        (self.chunks.len() * self.chunk_size) as u64
    }

    /// Grows the store with zeroed chunks until `end` bytes are addressable.
    pub(crate) fn ensure_len(&mut self, end: u64) {
        while self.len() < end {
            self.chunks.push(Chunk::zeroed(self.chunk_size));
        }
    }

    fn check_bounds(&self, address: Address, size: u64) -> NdResult<()> {
        let end = address.as_u64().checked_add(size);
        match end {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(NdError::OutOfBounds {
                address,
                size,
                store_size: self.len(),
            }),
        }
    }

    /// Copies `buf.len()` bytes starting at `address` into `buf`.
    pub(crate) fn read(&self, address: Address, buf: &mut [u8]) -> NdResult<()> {
        self.check_bounds(address, buf.len() as u64)?;
        let mut pos = address.as_u64() as usize;
        let mut done = 0;
        while done < buf.len() {
            let chunk = &self.chunks[pos / self.chunk_size];
            let offset = pos % self.chunk_size;
            let n = (self.chunk_size - offset).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&chunk.data[offset..offset + n]);
            done += n;
            pos += n;
        }
        Ok(())
    }

    /// Copies `data` into the store at `address`, marking chunks dirty.
    pub(crate) fn write(&mut self, address: Address, data: &[u8]) -> NdResult<()> {
        self.check_bounds(address, data.len() as u64)?;
        let mut pos = address.as_u64() as usize;
        let mut done = 0;
        while done < data.len() {
            let chunk_size = self.chunk_size;
            let chunk = &mut self.chunks[pos / chunk_size];
            let offset = pos % chunk_size;
            let n = (chunk_size - offset).min(data.len() - done);
            chunk.data[offset..offset + n].copy_from_slice(&data[done..done + n]);
            chunk.dirty = true;
            done += n;
            pos += n;
        }
        Ok(())
    }

    /// Returns true if any chunk has unflushed changes.
    pub(crate) fn is_dirty(&self) -> bool {
        self.chunks.iter().any(|c| c.dirty)
    }

    /// Iterates over dirty chunks as `(file offset, bytes)`.
    pub(crate) fn dirty_chunks(&self) -> impl Iterator<Item = (u64, &[u8])> + '_ {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.dirty)
            .map(move |(i, c)| ((i * self.chunk_size) as u64, &c.data[..]))
    }

    /// Marks every chunk clean.
    pub(crate) fn mark_clean(&mut self) {
        for chunk in &mut self.chunks {
            chunk.dirty = false;
        }
    }
}

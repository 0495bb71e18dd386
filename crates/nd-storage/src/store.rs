//! Typed little-endian access to the chunk store.
//!
//! Every mutation goes through [`Store::write_bytes`], which also records the
//! write in the modification log.

use nd_common::constants::{
    END_OFFSET, HEADER_SIZE, MAGIC, MAGIC_OFFSET, VERSION_OFFSET, WRITE_NUMBER_OFFSET,
};
use nd_common::error::NdResult;
use nd_common::types::{Address, WriteNumber};

use crate::chunk::ChunkStore;
use crate::modlog::ModificationLog;

/// The chunks and their write history, guarded together.
#[derive(Debug)]
pub(crate) struct Store {
    pub(crate) chunks: ChunkStore,
    pub(crate) log: ModificationLog,
}

macro_rules! typed_access {
    ($get:ident, $put:ident, $ty:ty) => {
        pub(crate) fn $get(&self, address: Address) -> NdResult<$ty> {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            self.chunks.read(address, &mut buf)?;
            Ok(<$ty>::from_le_bytes(buf))
        }

        pub(crate) fn $put(&mut self, address: Address, value: $ty) -> NdResult<()> {
            self.write_bytes(address, &value.to_le_bytes())
        }
    };
}

impl Store {
    pub(crate) fn new(chunks: ChunkStore, log: ModificationLog) -> Self {
        Self { chunks, log }
    }

    typed_access!(get_u8, put_u8, u8);
    typed_access!(get_u16, put_u16, u16);
    typed_access!(get_u32, put_u32, u32);
    typed_access!(get_u64, put_u64, u64);

    pub(crate) fn read_bytes(&self, address: Address, buf: &mut [u8]) -> NdResult<()> {
        self.chunks.read(address, buf)
    }

    pub(crate) fn write_bytes(&mut self, address: Address, data: &[u8]) -> NdResult<()> {
        self.chunks.write(address, data)?;
        if self.log.is_enabled() {
            let write_number = self.write_number()?;
            self.log.record(address, data.len() as u64, write_number);
        }
        Ok(())
    }

    /// Writes a fresh header for an empty store.
    pub(crate) fn initialize(&mut self, version: u32) -> NdResult<()> {
        self.chunks.ensure_len(HEADER_SIZE);
        self.put_u32(Address::new(VERSION_OFFSET), version)?;
        self.put_u32(Address::new(MAGIC_OFFSET), MAGIC)?;
        self.put_u64(Address::new(WRITE_NUMBER_OFFSET), 0)?;
        self.put_u64(Address::new(END_OFFSET), HEADER_SIZE)?;
        Ok(())
    }

    /// Returns the stored schema version, or 0 if the header is not ours.
    pub(crate) fn version(&self) -> NdResult<u32> {
        if self.chunks.len() < HEADER_SIZE || self.get_u32(Address::new(MAGIC_OFFSET))? != MAGIC
        {
            return Ok(0);
        }
        self.get_u32(Address::new(VERSION_OFFSET))
    }

    pub(crate) fn write_number(&self) -> NdResult<WriteNumber> {
        self.get_u64(Address::new(WRITE_NUMBER_OFFSET))
            .map(WriteNumber::new)
    }
}

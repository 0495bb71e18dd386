//! Block allocator.
//!
//! Blocks are carved from the end of the store and recycled through free
//! lists whose heads live in the database header.
//!
//! ```text
//! block start                      payload address (returned by malloc)
//! │                                │
//! ▼                                ▼
//! ┌───────────────┬───────────────┬──────────────────────────────┐
//! │ payload size  │ state         │ payload (size bytes)          │
//! │ u32           │ u32           │ first 8 bytes = next free     │
//! └───────────────┴───────────────┴──────────────────────────────┘
//! ```
//!
//! Payloads up to `MAX_SMALL_BLOCK` bytes are recycled through one exact-size
//! list per 8-byte class. Larger payloads share one first-fit list. A block
//! never straddles a chunk boundary.

use nd_common::constants::{
    BLOCK_ALIGNMENT, BLOCK_HEADER_SIZE, END_OFFSET, FREE_LIST_OFFSET, HEADER_SIZE,
    LARGE_SIZE_CLASS, MAX_SMALL_BLOCK, POINTER_SIZE,
};
use nd_common::error::{NdError, NdResult};
use nd_common::types::Address;

use crate::store::Store;

/// Block state marker for a live allocation.
const BLOCK_ALLOCATED: u32 = 0xA110_C8ED;

/// Block state marker for a block on a free list.
const BLOCK_FREE: u32 = 0x0000_F7EE;

#[inline]
fn round_up(size: u64) -> u64 {
    (size.max(1) + BLOCK_ALIGNMENT - 1) & !(BLOCK_ALIGNMENT - 1)
}

#[inline]
fn size_class(payload: u64) -> u64 {
    if payload <= MAX_SMALL_BLOCK {
        payload / BLOCK_ALIGNMENT - 1
    } else {
        LARGE_SIZE_CLASS
    }
}

#[inline]
fn free_list_head(class: u64) -> Address {
    Address::new(FREE_LIST_OFFSET + class * POINTER_SIZE)
}

impl Store {
    /// Largest payload a single block can hold.
    pub(crate) fn max_block_size(&self) -> u64 {
        self.chunks.chunk_size() as u64 - BLOCK_HEADER_SIZE
    }

    /// Allocates a zeroed block of at least `size` bytes.
    pub(crate) fn malloc(&mut self, size: u64) -> NdResult<Address> {
        let max_size = self.max_block_size();
        if size > max_size {
            return Err(NdError::AllocationTooLarge { size, max_size });
        }
        // max_size is aligned, so rounding cannot push past it.
        let payload = round_up(size);

        let class = size_class(payload);
        let reused = if class == LARGE_SIZE_CLASS {
            self.take_large(payload)?
        } else {
            self.take_small(class)?
        };

        let address = match reused {
            Some(address) => address,
            None => self.bump(payload)?,
        };

        self.put_u32(address.with_back(4), BLOCK_ALLOCATED)?;
        let block_size = u64::from(self.get_u32(address.with_back(8))?);
        self.write_bytes(address, &vec![0u8; block_size as usize])?;
        Ok(address)
    }

    /// Returns a block to its free list.
    pub(crate) fn free(&mut self, address: Address) -> NdResult<()> {
        let block_size = self.block_size(address)?;
        let class = size_class(block_size);
        let head = self.get_u64(free_list_head(class))?;
        self.put_u32(address.with_back(4), BLOCK_FREE)?;
        self.put_u64(address, head)?;
        self.put_u64(free_list_head(class), address.as_u64())?;
        Ok(())
    }

    /// Returns the payload size of the live block at `address`.
    pub(crate) fn block_size(&self, address: Address) -> NdResult<u64> {
        let raw = address.as_u64();
        if raw < HEADER_SIZE + BLOCK_HEADER_SIZE
            || raw % BLOCK_ALIGNMENT != 0
            || raw >= self.get_u64(Address::new(END_OFFSET))?
        {
            return Err(NdError::InvalidAddress { address });
        }
        match self.get_u32(address.with_back(4))? {
            BLOCK_ALLOCATED => Ok(u64::from(self.get_u32(address.with_back(8))?)),
            BLOCK_FREE => Err(NdError::DoubleFree { address }),
            _ => Err(NdError::InvalidAddress { address }),
        }
    }

    fn take_small(&mut self, class: u64) -> NdResult<Option<Address>> {
        let head = self.get_u64(free_list_head(class))?;
        if head == 0 {
            return Ok(None);
        }
        let address = Address::new(head);
        let next = self.get_u64(address)?;
        self.put_u64(free_list_head(class), next)?;
        Ok(Some(address))
    }

    fn take_large(&mut self, payload: u64) -> NdResult<Option<Address>> {
        let mut link = free_list_head(LARGE_SIZE_CLASS);
        let mut current = self.get_u64(link)?;
        while current != 0 {
            let address = Address::new(current);
            let next = self.get_u64(address)?;
            if u64::from(self.get_u32(address.with_back(8))?) >= payload {
                self.put_u64(link, next)?;
                return Ok(Some(address));
            }
            link = address;
            current = next;
        }
        Ok(None)
    }

    fn bump(&mut self, payload: u64) -> NdResult<Address> {
        let chunk_size = self.chunks.chunk_size() as u64;
        let mut start = self.get_u64(Address::new(END_OFFSET))?;
        let needed = BLOCK_HEADER_SIZE + payload;
        if start % chunk_size + needed > chunk_size {
            start = (start / chunk_size + 1) * chunk_size;
        }
        let end = start + needed;
        self.chunks.ensure_len(end);

        let block = Address::new(start);
        // Payload size fits in u32 because it never exceeds the chunk size.
        self.put_u32(block, payload as u32)?;
        self.put_u64(Address::new(END_OFFSET), end)?;
        Ok(block.offset(BLOCK_HEADER_SIZE))
    }
}

trait AddressExt {
    fn with_back(self, delta: u64) -> Address;
}

impl AddressExt for Address {
    #[inline]
    fn with_back(self, delta: u64) -> Address {
        Address::new(self.as_u64() - delta)
    }
}

//! Fixtures shared by the unit tests: a guest image with hand-built page
//! tables, and a memory wrapper that records every read.

use crate::memory::{AccessSize, GuestImage, MemoryError, PhysicalMemory};
use crate::paging::{Level, PTE_PAGE_SIZE, PTE_PRESENT, PTE_WRITABLE};
use crate::verified::paging::{
    encode_entry, table_address, table_index, MAX_PHYSICAL_BITS, SIZE_4K,
};
use std::cell::RefCell;
use vm_memory::{Bytes, GuestAddress};

/// Default image size: 8 MiB of guest physical memory at address 0.
pub const IMAGE_SIZE: usize = 8 << 20;

/// Paging structures are carved from this region upwards.
pub const TABLE_POOL_START: u64 = 0x10_0000;

/// Physical address of the PML4 of every [`PagedImage`].
pub const PML4_START: u64 = TABLE_POOL_START;

/// A [`GuestImage`] plus a bump allocator for paging structures.
///
/// Every intermediate entry the builder creates is present and writable;
/// leaf flags are whatever the test passes.
pub struct PagedImage {
    image: GuestImage,
    next_table: u64,
}

impl PagedImage {
    pub fn new() -> Self {
        Self::with_size(IMAGE_SIZE)
    }

    pub fn with_size(size: usize) -> Self {
        Self {
            image: GuestImage::new(0, size).unwrap(),
            next_table: PML4_START + SIZE_4K,
        }
    }

    /// CR3 value for this image.
    pub fn root(&self) -> u64 {
        PML4_START
    }

    pub fn image(&self) -> &GuestImage {
        &self.image
    }

    pub fn write_u64(&self, address: u64, value: u64) {
        self.image
            .inner()
            .write_obj(value, GuestAddress(address))
            .unwrap();
    }

    pub fn read_u64(&self, address: u64) -> u64 {
        self.image.inner().read_obj(GuestAddress(address)).unwrap()
    }

    pub fn write_bytes(&self, address: u64, data: &[u8]) {
        self.image
            .inner()
            .write_slice(data, GuestAddress(address))
            .unwrap();
    }

    /// Slot address of `level`'s entry for `va`, creating the tables
    /// above it on the way.
    pub fn slot(&mut self, va: u64, level: Level) -> u64 {
        let mut table = PML4_START;
        for current in Level::ALL {
            let slot = table + u64::from(table_index(va, current.shift())) * 8;
            if current == level {
                return slot;
            }
            let raw = self.read_u64(slot);
            table = if raw & PTE_PRESENT != 0 {
                table_address(raw, MAX_PHYSICAL_BITS)
            } else {
                let fresh = self.next_table;
                self.next_table += SIZE_4K;
                self.write_u64(slot, encode_entry(PTE_PRESENT | PTE_WRITABLE, fresh));
                fresh
            };
        }
        unreachable!("level {level} not in walk order")
    }

    pub fn map_4k(&mut self, va: u64, pa: u64, flags: u64) {
        let slot = self.slot(va, Level::Pt);
        self.write_u64(slot, encode_entry(flags | PTE_PRESENT, pa));
    }

    pub fn map_2m(&mut self, va: u64, pa: u64, flags: u64) {
        let slot = self.slot(va, Level::Pd);
        self.write_u64(slot, encode_entry(flags | PTE_PRESENT | PTE_PAGE_SIZE, pa));
    }

    pub fn map_1g(&mut self, va: u64, pa: u64, flags: u64) {
        let slot = self.slot(va, Level::Pdpt);
        self.write_u64(slot, encode_entry(flags | PTE_PRESENT | PTE_PAGE_SIZE, pa));
    }
}

/// Wraps a memory source and logs each `(address, size)` it is asked for.
pub struct RecordingMemory<M> {
    inner: M,
    reads: RefCell<Vec<(u64, AccessSize)>>,
}

impl<M> RecordingMemory<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            reads: RefCell::new(Vec::new()),
        }
    }

    pub fn reads(&self) -> Vec<(u64, AccessSize)> {
        self.reads.borrow().clone()
    }
}

impl<M: PhysicalMemory> PhysicalMemory for RecordingMemory<M> {
    fn read_physical(&self, address: u64, size: AccessSize) -> Result<u64, MemoryError> {
        self.reads.borrow_mut().push((address, size));
        self.inner.read_physical(address, size)
    }
}

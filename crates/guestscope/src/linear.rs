//! Byte-range reads through guest linear addresses.

use crate::memory::{AccessSize, MemoryError, PhysicalMemory};
use crate::mmu::{Mmu, TranslationError};
use log::trace;

/// Reads linear ranges of any length under one address-space root.
///
/// The range may straddle any number of pages, of any size.  Each page
/// is translated on its own, so physically discontiguous pages read back
/// as one contiguous buffer.  Reads within a page are done with 8-byte
/// accesses wherever the address is aligned and at least 8 bytes remain,
/// and single bytes elsewhere.
pub struct LinearReader<'a, M> {
    mmu: &'a Mmu<M>,
    root: u64,
}

impl<'a, M: PhysicalMemory> LinearReader<'a, M> {
    pub fn new(mmu: &'a Mmu<M>, root: u64) -> Self {
        Self { mmu, root }
    }

    /// Read exactly `length` bytes starting at linear `address`.
    ///
    /// # Errors
    ///
    /// - [`TranslationError::Wrapped`] before any read if the range runs
    ///   past `0xffff_ffff_ffff_ffff`.
    /// - [`TranslationError::Unmapped`] with the page address if any page
    ///   of the range is not mapped.  No partial buffer is returned.
    /// - Any error of [`Mmu::resolve`] or of the underlying reads.
    pub fn read(&self, address: u64, length: usize) -> Result<Vec<u8>, TranslationError> {
        check_range(address, length as u64)?;
        let mut out = Vec::with_capacity(length);
        let mut va = address;

        while out.len() < length {
            let translation = self.mmu.resolve(self.root, va)?;
            let mapping = translation
                .mapping
                .ok_or(TranslationError::Unmapped { address: va })?;

            let wanted = (length - out.len()) as u64;
            let chunk = wanted.min(mapping.remaining());
            trace!(
                "linear {va:#x}: {chunk} bytes from {:#x}",
                mapping.physical_address()
            );
            self.read_chunk(mapping.physical_address(), chunk, &mut out)?;

            // Only the last page of a range may end at the top of memory.
            va = match (va - mapping.offset).checked_add(mapping.size.bytes()) {
                Some(next) => next,
                None => break,
            };
        }

        Ok(out)
    }

    /// Read a little-endian `u64` at linear `address`.
    pub fn read_u64(&self, address: u64) -> Result<u64, TranslationError> {
        let bytes = self.read(address, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_chunk(&self, start: u64, length: u64, out: &mut Vec<u8>) -> Result<(), MemoryError> {
        let memory = self.mmu.memory();
        let end = start + length;
        let mut pa = start;

        while pa < end && pa % 8 != 0 {
            out.push(memory.read_physical(pa, AccessSize::Byte)? as u8);
            pa += 1;
        }
        while end - pa >= 8 {
            let value = memory.read_physical(pa, AccessSize::Qword)?;
            out.extend_from_slice(&value.to_le_bytes());
            pa += 8;
        }
        while pa < end {
            out.push(memory.read_physical(pa, AccessSize::Byte)? as u8);
            pa += 1;
        }
        Ok(())
    }
}

/// Fail with [`TranslationError::Wrapped`] if `length` bytes from
/// `address` do not fit below the top of the linear address space.
pub(crate) fn check_range(address: u64, length: u64) -> Result<(), TranslationError> {
    if length > 0 && address.checked_add(length - 1).is_none() {
        return Err(TranslationError::Wrapped { address, length });
    }
    Ok(())
}

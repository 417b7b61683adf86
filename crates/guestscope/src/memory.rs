//! Guest physical memory sources for the inspector.
//!
//! Everything the translator and the descriptor decoders know about a
//! guest comes through the [`PhysicalMemory`] trait: a blocking read of a
//! 1-, 2-, 4- or 8-byte little-endian value at a guest physical address.
//! The trait is the seam to whatever actually holds the memory (a
//! debugger stub, a hypervisor control channel, a snapshot on disk).
//!
//! This module ships two implementations:
//!
//! - [`GuestImage`]: a raw physical memory dump held in a `vm-memory`
//!   [`GuestMemoryMmap`], placed at a configurable guest physical base.
//! - [`Interruptible`]: a wrapper that lets another party abort a walk
//!   or a linear read between two individual reads.
//!
//! # Example
//!
//! ```no_run
//! use guestscope::memory::{AccessSize, GuestImage, PhysicalMemory};
//!
//! let image = GuestImage::load("guest.raw", 0).unwrap();
//! let cr3_slot = image.read_physical(0x9000, AccessSize::Qword).unwrap();
//! println!("PML4[0] = {cr3_slot:#x}");
//! ```

use log::{info, trace};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use vm_memory::{Bytes, GuestAddress, GuestMemoryMmap};

// ═══════════════════════════════════════════════════════════════════════
//  Read interface
// ═══════════════════════════════════════════════════════════════════════

/// Width of a single physical read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSize {
    Byte,
    Word,
    Dword,
    Qword,
}

impl AccessSize {
    /// Width in bytes.
    pub fn bytes(self) -> usize {
        match self {
            AccessSize::Byte => 1,
            AccessSize::Word => 2,
            AccessSize::Dword => 4,
            AccessSize::Qword => 8,
        }
    }
}

/// Errors that can occur while reading guest memory.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The `vm-memory` crate failed to create the guest memory region.
    #[error("Failed to create guest memory region of {size} bytes at {base:#x}")]
    Create {
        /// Guest physical base of the region.
        base: u64,
        /// Requested size.
        size: usize,
    },

    /// A read from guest physical memory failed.
    #[error("Failed to read {size} bytes from guest physical address {address:#x}")]
    Read {
        /// Guest physical address of the failed read.
        address: u64,
        /// Requested width in bytes.
        size: usize,
    },

    /// The read was refused because the operation was cancelled.
    #[error("Read at {address:#x} cancelled")]
    Cancelled {
        /// Guest physical address of the refused read.
        address: u64,
    },

    /// The memory dump could not be read from disk.
    #[error("Failed to load memory image")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Guest physical address the error refers to, if any.
    pub fn address(&self) -> Option<u64> {
        match self {
            MemoryError::Read { address, .. } | MemoryError::Cancelled { address } => {
                Some(*address)
            }
            MemoryError::Create { .. } | MemoryError::Io(_) => None,
        }
    }
}

/// Blocking access to guest physical memory.
///
/// Implementations return the little-endian value of `size` bytes at
/// `address`, zero-extended to 64 bits.  No retries are expected from the
/// caller; an implementation that talks to a flaky transport owns its
/// retry policy.
pub trait PhysicalMemory {
    /// Read `size` bytes at guest physical `address`.
    fn read_physical(&self, address: u64, size: AccessSize) -> Result<u64, MemoryError>;
}

impl<M: PhysicalMemory + ?Sized> PhysicalMemory for &M {
    fn read_physical(&self, address: u64, size: AccessSize) -> Result<u64, MemoryError> {
        (**self).read_physical(address, size)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  GuestImage
// ═══════════════════════════════════════════════════════════════════════

/// A raw guest physical memory image.
///
/// `GuestImage` owns a [`GuestMemoryMmap`] covering
/// `base .. base + size` of guest physical address space.  Reads outside
/// that range fail with [`MemoryError::Read`] instead of returning zeros,
/// so a walk through a stray pointer surfaces as an error with the
/// offending address.
///
/// # Interior Mutability
///
/// The mmap-backed memory uses interior mutability, so [`inner`]
/// (Self::inner) hands out a shared reference through which test
/// fixtures and loaders can write.  The inspector itself never writes.
#[derive(Debug)]
pub struct GuestImage {
    /// The underlying mmap-backed guest memory.
    memory: GuestMemoryMmap,
    /// Guest physical address of the first byte.
    base: u64,
    /// Size of the image in bytes.
    size: usize,
}

impl GuestImage {
    /// Create a zero-filled image of `size` bytes at guest physical `base`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Create`] if the `mmap` allocation fails or
    /// `size` is zero.
    pub fn new(base: u64, size: usize) -> Result<Self, MemoryError> {
        let regions = vec![(GuestAddress(base), size)];
        let memory = GuestMemoryMmap::from_ranges(&regions)
            .map_err(|_| MemoryError::Create { base, size })?;

        Ok(Self { memory, base, size })
    }

    /// Create an image holding a copy of `data` at guest physical `base`.
    pub fn from_bytes(base: u64, data: &[u8]) -> Result<Self, MemoryError> {
        let image = Self::new(base, data.len())?;
        image
            .memory
            .write_slice(data, GuestAddress(base))
            .map_err(|_| MemoryError::Create {
                base,
                size: data.len(),
            })?;
        Ok(image)
    }

    /// Load a raw physical memory dump from `path` and place it at `base`.
    ///
    /// # Errors
    ///
    /// - [`MemoryError::Io`] if the file cannot be read.
    /// - [`MemoryError::Create`] if the file is empty or the allocation
    ///   fails.
    pub fn load(path: impl AsRef<Path>, base: u64) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let image = Self::from_bytes(base, &data)?;

        info!(
            "Memory image loaded from {}: {} MB at {:#x}",
            path.display(),
            data.len() / (1024 * 1024),
            base,
        );

        Ok(image)
    }

    /// Get a reference to the underlying [`GuestMemoryMmap`].
    #[inline]
    pub fn inner(&self) -> &GuestMemoryMmap {
        &self.memory
    }

    /// Guest physical address of the first byte of the image.
    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Size of the image in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl PhysicalMemory for GuestImage {
    fn read_physical(&self, address: u64, size: AccessSize) -> Result<u64, MemoryError> {
        let width = size.bytes();
        let mut buf = [0u8; 8];
        self.memory
            .read_slice(&mut buf[..width], GuestAddress(address))
            .map_err(|_| MemoryError::Read {
                address,
                size: width,
            })?;
        let value = u64::from_le_bytes(buf);
        trace!("phys[{address:#x}; {width}] = {value:#x}");
        Ok(value)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Cancellation
// ═══════════════════════════════════════════════════════════════════════

/// Shared flag that aborts reads through an [`Interruptible`] source.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Refuse every subsequent read.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Allow reads again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) has been called since the last reset.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Memory source that fails every read once its [`CancelHandle`] fires.
///
/// Cancellation is coarse: a read already in progress completes, the
/// next one fails with [`MemoryError::Cancelled`] and the walk or linear
/// read in progress aborts with it.  Nothing is written, so there is
/// nothing to roll back.
pub struct Interruptible<M> {
    inner: M,
    handle: CancelHandle,
}

impl<M> Interruptible<M> {
    /// Wrap `inner` with a fresh, un-cancelled handle.
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            handle: CancelHandle::default(),
        }
    }

    /// A clone of the handle that cancels this source.
    pub fn handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

impl<M: PhysicalMemory> PhysicalMemory for Interruptible<M> {
    fn read_physical(&self, address: u64, size: AccessSize) -> Result<u64, MemoryError> {
        if self.handle.is_cancelled() {
            return Err(MemoryError::Cancelled { address });
        }
        self.inner.read_physical(address, size)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

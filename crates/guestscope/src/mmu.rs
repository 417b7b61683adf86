//! Four-level x86_64 address translation over guest physical memory.
//!
//! [`Mmu`] is stateless apart from its [`MmuConfig`]: each call to
//! [`resolve`](Mmu::resolve) starts from the root it is given, reads the
//! paging structures through the [`PhysicalMemory`] source in walk order
//! and returns every entry it visited.  Nothing is cached between calls,
//! so two walks over an unchanged image produce identical results.
//!
//! # Walk
//!
//! ```text
//!   CR3 ──► PML4[va 47:39] ──► PDPT[va 38:30] ──► PD[va 29:21] ──► PT[va 20:12]
//!                                   │                  │                │
//!                                   PS=1: 1 GiB        PS=1: 2 MiB      4 KiB page
//! ```
//!
//! A walk stops at the first not-present entry (the address is unmapped,
//! which is a normal result) or at the first entry that maps a page.

use crate::config::{ConfigError, MmuConfig};
use crate::memory::{AccessSize, MemoryError, PhysicalMemory};
use crate::paging::{Level, PageSize, PageTableEntry};
use crate::verified::paging::{
    is_canonical, page_offset, table_address, table_index, ENTRIES_PER_TABLE, ENTRY_SIZE,
    PDPT_SHIFT, PD_SHIFT, PML4_SHIFT, PT_SHIFT,
};
use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors raised while translating a linear address.
#[derive(Error, Debug)]
pub enum TranslationError {
    /// The address is not canonical; no memory was read.
    #[error("Address {address:#x} is not canonical for {bits}-bit linear addresses")]
    NonCanonical {
        /// Rejected linear address.
        address: u64,
        /// Configured linear-address width.
        bits: u32,
    },

    /// Reading a paging structure failed.
    #[error("Host read failed during walk")]
    HostRead(#[from] MemoryError),

    /// A linear range runs past the top of the address space.
    #[error("Linear range {address:#x}+{length:#x} wraps past the top of the address space")]
    Wrapped {
        /// Start of the range.
        address: u64,
        /// Length of the range in bytes.
        length: u64,
    },

    /// A linear range touched a page with no mapping.
    #[error("Linear address {address:#x} is not mapped")]
    Unmapped {
        /// First unmapped address of the range.
        address: u64,
    },
}

// ═══════════════════════════════════════════════════════════════════════
//  Address split
// ═══════════════════════════════════════════════════════════════════════

/// Table indices and page offset of a linear address for one page size.
///
/// Levels below the one that maps the page are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitView {
    pub size: PageSize,
    pub pml4: u16,
    pub pdpt: u16,
    pub pd: Option<u16>,
    pub pt: Option<u16>,
    pub offset: u64,
}

impl SplitView {
    fn new(address: u64, size: PageSize) -> Self {
        let pd = (size != PageSize::Size1G).then(|| table_index(address, PD_SHIFT));
        let pt = (size == PageSize::Size4K).then(|| table_index(address, PT_SHIFT));
        Self {
            size,
            pml4: table_index(address, PML4_SHIFT),
            pdpt: table_index(address, PDPT_SHIFT),
            pd,
            pt,
            offset: page_offset(address, size.shift()),
        }
    }
}

impl fmt::Display for SplitView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#x}|{:#x}", self.pml4, self.pdpt)?;
        for index in [self.pd, self.pt].into_iter().flatten() {
            write!(f, "|{index:#x}")?;
        }
        write!(f, "|{:#x})", self.offset)
    }
}

/// A linear address split three ways, one per page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddressSplit {
    pub page_4k: SplitView,
    pub page_2m: SplitView,
    pub page_1g: SplitView,
}

impl AddressSplit {
    pub fn new(address: u64) -> Self {
        Self {
            page_4k: SplitView::new(address, PageSize::Size4K),
            page_2m: SplitView::new(address, PageSize::Size2M),
            page_1g: SplitView::new(address, PageSize::Size1G),
        }
    }

    /// The view for pages of `size`.
    pub fn view(&self, size: PageSize) -> &SplitView {
        match size {
            PageSize::Size4K => &self.page_4k,
            PageSize::Size2M => &self.page_2m,
            PageSize::Size1G => &self.page_1g,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Translation result
// ═══════════════════════════════════════════════════════════════════════

/// The page a linear address landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mapping {
    /// Physical base of the page.
    pub base: u64,
    pub size: PageSize,
    /// Offset of the address inside the page.
    pub offset: u64,
}

impl Mapping {
    pub fn physical_address(&self) -> u64 {
        self.base + self.offset
    }

    /// Bytes left in the page from the translated address onwards.
    pub fn remaining(&self) -> u64 {
        self.size.bytes() - self.offset
    }
}

/// Outcome of one walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    /// CR3 value the walk started from.
    pub root: u64,
    /// The linear address that was translated.
    pub address: u64,
    /// `None` when the walk hit a not-present entry.
    pub mapping: Option<Mapping>,
    /// Every entry visited, root first.
    pub entries: Vec<PageTableEntry>,
}

impl Translation {
    pub fn physical_address(&self) -> Option<u64> {
        self.mapping.as_ref().map(Mapping::physical_address)
    }

    /// Whether any visited entry was flagged faulty.
    pub fn has_faults(&self) -> bool {
        self.entries.iter().any(|entry| entry.faulty)
    }
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let split = AddressSplit::new(self.address);
        let view = match &self.mapping {
            Some(mapping) => split.view(mapping.size),
            None => &split.page_4k,
        };
        writeln!(
            f,
            "cr3: {:#x}; vaddr: {:#x} = {}",
            self.root, self.address, view
        )?;
        for entry in &self.entries {
            writeln!(f, "  {entry}")?;
        }
        match &self.mapping {
            Some(mapping) => write!(
                f,
                "{:#x} -> {:#x}:{:#x} ({})",
                self.address, mapping.base, mapping.offset, mapping.size
            ),
            None => write!(f, "{:#x} -> <unmapped>", self.address),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Mmu
// ═══════════════════════════════════════════════════════════════════════

/// Page-table walker bound to one memory source and one configuration.
pub struct Mmu<M> {
    memory: M,
    config: MmuConfig,
}

impl<M: PhysicalMemory> Mmu<M> {
    /// Build a translator.
    ///
    /// # Errors
    ///
    /// Fails fast with [`ConfigError`] for an unsupported architecture or
    /// an out-of-range MAXPHYADDR; no reads are ever attempted with such a
    /// configuration.
    pub fn new(memory: M, config: MmuConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { memory, config })
    }

    pub fn config(&self) -> &MmuConfig {
        &self.config
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Split `address` into table indices and offsets for every page size.
    pub fn split_address(address: u64) -> AddressSplit {
        AddressSplit::new(address)
    }

    /// Physical base of the root table for a CR3 value: PWT/PCD/PCID and
    /// any bit at or above MAXPHYADDR are dropped.
    pub fn root_table(&self, root: u64) -> u64 {
        table_address(root, self.config.physical_bits)
    }

    /// Read and decode slot `index` of the `level` table at `table`.
    pub fn table_entry(
        &self,
        level: Level,
        table: u64,
        index: u16,
    ) -> Result<PageTableEntry, MemoryError> {
        let slot = table + u64::from(index) * ENTRY_SIZE;
        let raw = self.memory.read_physical(slot, AccessSize::Qword)?;
        let entry = PageTableEntry::decode(level, table, index, raw, &self.config);
        Ok(entry)
    }

    /// Read all 512 entries of the `level` table at `table`.
    pub fn table(&self, level: Level, table: u64) -> Result<Vec<PageTableEntry>, MemoryError> {
        let entries = (0..ENTRIES_PER_TABLE as u16)
            .map(|index| self.table_entry(level, table, index))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "{level} table at {table:#x}: {} present",
            entries.iter().filter(|entry| entry.present).count()
        );
        Ok(entries)
    }

    /// Translate `address` through the hierarchy rooted at CR3 value `root`.
    ///
    /// # Errors
    ///
    /// - [`TranslationError::NonCanonical`] before any read.
    /// - [`TranslationError::HostRead`] if a paging-structure read fails.
    ///
    /// An unmapped address is *not* an error; see [`Translation::mapping`].
    pub fn resolve(&self, root: u64, address: u64) -> Result<Translation, TranslationError> {
        let bits = self.config.linear_bits;
        if !is_canonical(address, bits) {
            return Err(TranslationError::NonCanonical { address, bits });
        }

        let mut entries = Vec::with_capacity(Level::ALL.len());
        let mut table = self.root_table(root);
        let mut level = Level::Pml4;

        loop {
            let index = table_index(address, level.shift());
            let entry = self.table_entry(level, table, index)?;
            debug!(
                "walk {address:#x}: {level}[{index:#x}] @ {:#x} = {:#x}",
                entry.slot_address(),
                entry.raw
            );
            if entry.faulty {
                warn!("{}: reserved bits set ({:#x})", entry.name(), entry.raw);
            }

            let present = entry.present;
            let huge = entry.huge_size();
            let next = entry.address();
            entries.push(entry);

            if !present {
                debug!("walk {address:#x}: not present at {level}");
                return Ok(Translation {
                    root,
                    address,
                    mapping: None,
                    entries,
                });
            }

            let size = match (huge, level.next()) {
                (Some(size), _) => size,
                (None, None) => PageSize::Size4K,
                (None, Some(below)) => {
                    level = below;
                    table = next;
                    continue;
                }
            };

            let mapping = Mapping {
                base: next,
                size,
                offset: page_offset(address, size.shift()),
            };
            debug!("walk {address:#x}: {size} page at {:#x}", mapping.base);
            return Ok(Translation {
                root,
                address,
                mapping: Some(mapping),
                entries,
            });
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

//! Typed views over x86_64 paging-structure entries.
//!
//! A [`PageTableEntry`] is one decoded 8-byte slot of a PML4, PDPT, PD or
//! PT, tagged with its [`Level`].  Entries are built fresh from the raw
//! value on every read and never mutated; nothing here caches or writes.
//!
//! The layout of an entry (Intel SDM Vol. 3A, §4.5):
//!
//! ```text
//!   Bit  63        — Execute disable (XD)
//!   Bits 62:52     — Ignored / protection key
//!   Bits 51:M      — Reserved (must be 0)
//!   Bits M-1:12    — Frame (4 KiB table or page)
//!   Bit  12        — PAT (huge pages only; the frame then starts at 21 / 30)
//!   Bit  11        — Restart (HLAT), otherwise ignored
//!   Bit  8         — Global (leaf only)
//!   Bit  7         — Page size at PDPT/PD, PAT at PT, reserved at PML4
//!   Bit  6         — Dirty (leaf only)
//!   Bit  5         — Accessed
//!   Bit  4         — Cache disable (PCD)
//!   Bit  3         — Write through (PWT)
//!   Bit  2         — User/supervisor
//!   Bit  1         — Read/write
//!   Bit  0         — Present
//! ```

use crate::config::MmuConfig;
use crate::verified::bits::bit;
use crate::verified::paging::{
    frame_number, huge_reserved, reserved_high, HUGE_RESERVED_START, PAGE_SHIFT, PDPT_SHIFT,
    PD_SHIFT, PML4_SHIFT, PT_SHIFT,
};
use serde::Serialize;
use std::fmt;

// ─── Entry flag bits ─────────────────────────────────────────────────

pub const PTE_PRESENT: u64 = 1 << 0;
pub const PTE_WRITABLE: u64 = 1 << 1;
pub const PTE_USER: u64 = 1 << 2;
pub const PTE_WRITE_THROUGH: u64 = 1 << 3;
pub const PTE_CACHE_DISABLE: u64 = 1 << 4;
pub const PTE_ACCESSED: u64 = 1 << 5;
pub const PTE_DIRTY: u64 = 1 << 6;
/// Page size at PDPT/PD level; PAT at PT level.
pub const PTE_PAGE_SIZE: u64 = 1 << 7;
pub const PTE_GLOBAL: u64 = 1 << 8;
pub const PTE_RESTART: u64 = 1 << 11;
/// PAT bit of a 2 MiB or 1 GiB page.
pub const PTE_HUGE_PAT: u64 = 1 << 12;
pub const PTE_EXECUTE_DISABLE: u64 = 1 << 63;

// ═══════════════════════════════════════════════════════════════════════
//  Levels and page sizes
// ═══════════════════════════════════════════════════════════════════════

/// Level of a paging structure, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Pml4,
    Pdpt,
    Pd,
    Pt,
}

impl Level {
    /// All levels in walk order.
    pub const ALL: [Level; 4] = [Level::Pml4, Level::Pdpt, Level::Pd, Level::Pt];

    /// Lowest linear-address bit indexed at this level.
    pub fn shift(self) -> u32 {
        match self {
            Level::Pml4 => PML4_SHIFT,
            Level::Pdpt => PDPT_SHIFT,
            Level::Pd => PD_SHIFT,
            Level::Pt => PT_SHIFT,
        }
    }

    /// The level whose table an entry at this level points to.
    pub fn next(self) -> Option<Level> {
        match self {
            Level::Pml4 => Some(Level::Pdpt),
            Level::Pdpt => Some(Level::Pd),
            Level::Pd => Some(Level::Pt),
            Level::Pt => None,
        }
    }

    /// Page mapped by an entry at this level with the page-size bit set.
    pub fn huge_page(self) -> Option<PageSize> {
        match self {
            Level::Pdpt => Some(PageSize::Size1G),
            Level::Pd => Some(PageSize::Size2M),
            Level::Pml4 | Level::Pt => None,
        }
    }

    /// Whether an entry at this level can map a page.
    pub fn leaf_capable(self) -> bool {
        !matches!(self, Level::Pml4)
    }

    fn label(self) -> &'static str {
        match self {
            Level::Pml4 => "PML4",
            Level::Pdpt => "PDP",
            Level::Pd => "PD",
            Level::Pt => "PT",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Size of a mapped page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PageSize {
    #[serde(rename = "4KiB")]
    Size4K,
    #[serde(rename = "2MiB")]
    Size2M,
    #[serde(rename = "1GiB")]
    Size1G,
}

impl PageSize {
    /// Width of the in-page offset.
    pub fn shift(self) -> u32 {
        match self {
            PageSize::Size4K => PT_SHIFT,
            PageSize::Size2M => PD_SHIFT,
            PageSize::Size1G => PDPT_SHIFT,
        }
    }

    /// Size in bytes.
    pub fn bytes(self) -> u64 {
        1 << self.shift()
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSize::Size4K => write!(f, "4KiB"),
            PageSize::Size2M => write!(f, "2MiB"),
            PageSize::Size1G => write!(f, "1GiB"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  PageTableEntry
// ═══════════════════════════════════════════════════════════════════════

/// One decoded paging-structure entry.
///
/// Identity is `(table, index)`: the physical base of the structure the
/// entry was read from and its slot number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageTableEntry {
    pub level: Level,
    /// Physical base of the containing table.
    pub table: u64,
    /// Slot number inside the table (0..512).
    pub index: u16,
    /// Raw 64-bit value.
    pub raw: u64,

    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    /// Page-size bit; only meaningful at PDPT and PD level.
    pub page_size: bool,
    /// `None` at PML4 level.
    pub dirty: Option<bool>,
    /// `None` at PML4 level.
    pub global: Option<bool>,
    /// PAT bit of a PT entry or of a huge page; `None` elsewhere.
    pub pat: Option<bool>,
    pub restart: bool,
    pub execute_disable: bool,

    /// Frame number.  Its unit is the page size the entry maps: 4 KiB for
    /// table pointers and PT entries, 2 MiB / 1 GiB for huge pages.
    pub frame: u64,
    /// Reserved bits found set, at their original bit positions.
    pub reserved: u64,
    /// An architecturally disallowed combination was observed.
    pub faulty: bool,
}

impl PageTableEntry {
    /// Decode `raw`, the entry at slot `index` of the `level` table at
    /// physical address `table`.
    ///
    /// Never fails: reserved-bit violations are recorded in
    /// [`faulty`](Self::faulty) and [`reserved`](Self::reserved).  A set
    /// page-size bit at PML4 level is one of them; such an entry is
    /// otherwise treated as an ordinary table pointer.
    pub fn decode(level: Level, table: u64, index: u16, raw: u64, config: &MmuConfig) -> Self {
        let physical_bits = config.physical_bits;
        let bit7 = bit(raw, 7);

        let page_size = match level {
            Level::Pdpt | Level::Pd => bit7,
            Level::Pml4 | Level::Pt => false,
        };
        let huge = level.huge_page().filter(|_| page_size);
        let frame_shift = huge.map_or(PAGE_SHIFT, PageSize::shift);

        let pat = match (level, huge) {
            (Level::Pt, _) => Some(bit7),
            (_, Some(_)) => Some(bit(raw, 12)),
            _ => None,
        };
        let (dirty, global) = if level.leaf_capable() {
            (Some(bit(raw, 6)), Some(bit(raw, 8)))
        } else {
            (None, None)
        };

        let mut reserved = reserved_high(raw, physical_bits) << physical_bits;
        if huge.is_some() {
            reserved |= huge_reserved(raw, frame_shift) << HUGE_RESERVED_START;
        }
        if level == Level::Pml4 {
            reserved |= raw & PTE_PAGE_SIZE;
        }

        let present = bit(raw, 0);
        let faulty = (level == Level::Pml4 && bit7) || (present && reserved != 0);

        Self {
            level,
            table,
            index,
            raw,
            present,
            writable: bit(raw, 1),
            user: bit(raw, 2),
            write_through: bit(raw, 3),
            cache_disable: bit(raw, 4),
            accessed: bit(raw, 5),
            page_size,
            dirty,
            global,
            pat,
            restart: bit(raw, 11),
            execute_disable: bit(raw, 63),
            frame: frame_number(raw, frame_shift, physical_bits),
            reserved,
            faulty,
        }
    }

    /// Page size mapped by this entry if it terminates a walk early.
    pub fn huge_size(&self) -> Option<PageSize> {
        if self.present && self.page_size {
            self.level.huge_page()
        } else {
            None
        }
    }

    /// Physical address the entry points to: the next table, or the page
    /// base for a PT entry or a huge page.
    pub fn address(&self) -> u64 {
        let shift = self.huge_size().map_or(PAGE_SHIFT, PageSize::shift);
        self.frame << shift
    }

    /// Physical address of the slot this entry was read from.
    pub fn slot_address(&self) -> u64 {
        self.table + u64::from(self.index) * 8
    }

    /// Short identity, e.g. `PML4 (0x9000[0x1ff])`.
    pub fn name(&self) -> String {
        format!("{:<4} ({:#x}[{:#x}])", self.level, self.table, self.index)
    }
}

impl fmt::Display for PageTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |b: bool| u8::from(b);
        let opt = |b: Option<bool>| b.map_or(0, u8::from);

        write!(f, "<{}> ", self.name())?;
        if !self.present {
            return write!(f, "[p:0|raw:{:#x}]", self.raw);
        }

        write!(
            f,
            "[p:1|rw:{}|us:{}|pwt:{}|pcd:{}|a:{}",
            flag(self.writable),
            flag(self.user),
            flag(self.write_through),
            flag(self.cache_disable),
            flag(self.accessed),
        )?;
        match self.level {
            Level::Pml4 => write!(f, "|rsvd:{}", flag(self.raw & PTE_PAGE_SIZE != 0))?,
            Level::Pdpt | Level::Pd => write!(
                f,
                "|d:{}|ps:{}|g:{}",
                opt(self.dirty),
                flag(self.page_size),
                opt(self.global)
            )?,
            Level::Pt => write!(
                f,
                "|d:{}|pat:{}|g:{}",
                opt(self.dirty),
                opt(self.pat),
                opt(self.global)
            )?,
        }
        if self.huge_size().is_some() {
            write!(f, "|pat:{}", opt(self.pat))?;
        }
        write!(
            f,
            "|r:{}|addr:{:#x}|rsvd:{:#x}|xd:{}] = {:#x}",
            flag(self.restart),
            self.frame,
            self.reserved,
            flag(self.execute_disable),
            self.raw,
        )?;
        if self.faulty {
            write!(f, " (faulty)")?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

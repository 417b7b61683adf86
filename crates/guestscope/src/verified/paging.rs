//! Pure, verifiable functions for 4-level x86_64 paging arithmetic.
//!
//! Every function in this module is:
//! - **Pure**: no I/O, no reads of guest memory.
//! - **Deterministic**: same inputs always produce the same outputs.
//! - **Assertion-guarded**: `debug_assert!` preconditions and
//!   postconditions on every non-trivial function.
//!
//! The corresponding spec file is `verus/paging_spec.rs`.
//!
//! # Mapping to the effectful shell
//!
//! | Verified function     | Used by                                   |
//! |-----------------------|-------------------------------------------|
//! | [`table_index`]       | `mmu::AddressSplit::new()`                |
//! | [`page_offset`]       | `mmu::AddressSplit::new()`                |
//! | [`is_canonical`]      | `mmu::Mmu::resolve()`                     |
//! | [`table_address`]     | `mmu::Mmu::root_table()`                  |
//! | [`frame_number`]      | `paging::PageTableEntry::decode()`        |
//! | [`reserved_high`]     | `paging::PageTableEntry::decode()`        |
//! | [`huge_reserved`]     | `paging::PageTableEntry::decode()`        |
//! | [`encode_entry`]      | test fixtures, round-trip tests           |

use crate::verified::bits::{bits64, field_mask};

// ═══════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════

/// Width of the offset inside a 4 KiB page.
pub const PAGE_SHIFT: u32 = 12;

/// Width of each per-level table index.
pub const INDEX_BITS: u32 = 9;

/// Number of 8-byte slots in every paging structure.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Size of one paging-structure entry in bytes.
pub const ENTRY_SIZE: u64 = 8;

/// Lowest linear-address bit indexed by each level.
pub const PML4_SHIFT: u32 = 39;
pub const PDPT_SHIFT: u32 = 30;
pub const PD_SHIFT: u32 = 21;
pub const PT_SHIFT: u32 = 12;

/// Implemented linear-address bits with 4-level paging.
pub const FOUR_LEVEL_LINEAR_BITS: u32 = 48;

/// Architectural bounds on MAXPHYADDR.
pub const MIN_PHYSICAL_BITS: u32 = 32;
pub const MAX_PHYSICAL_BITS: u32 = 52;

/// Bit 12 of a huge-page entry is PAT; the reserved run starts above it.
pub const HUGE_RESERVED_START: u32 = 13;

/// Page sizes in bytes.
pub const SIZE_4K: u64 = 1 << PT_SHIFT;
pub const SIZE_2M: u64 = 1 << PD_SHIFT;
pub const SIZE_1G: u64 = 1 << PDPT_SHIFT;

// The levels partition bits 47:12 into four 9-bit fields.
const _: () = assert!(PML4_SHIFT == PDPT_SHIFT + INDEX_BITS);
const _: () = assert!(PDPT_SHIFT == PD_SHIFT + INDEX_BITS);
const _: () = assert!(PD_SHIFT == PT_SHIFT + INDEX_BITS);
const _: () = assert!(PML4_SHIFT + INDEX_BITS == FOUR_LEVEL_LINEAR_BITS);
const _: () = assert!(ENTRIES_PER_TABLE == 1 << INDEX_BITS);
const _: () = assert!(ENTRIES_PER_TABLE as u64 * ENTRY_SIZE == SIZE_4K);

// ═══════════════════════════════════════════════════════════════════════
//  Linear-address decomposition
// ═══════════════════════════════════════════════════════════════════════

/// Extract the 9-bit table index whose lowest bit is `shift`.
///
/// # Properties verified by `verus/paging_spec.rs`
///
/// - `result < 512`
pub fn table_index(address: u64, shift: u32) -> u16 {
    let result = bits64(address, shift, INDEX_BITS) as u16;
    debug_assert!(
        (result as usize) < ENTRIES_PER_TABLE,
        "table_index: {result} out of range"
    );
    result
}

/// Extract the page offset for a page of `1 << shift` bytes.
///
/// # Properties verified by `verus/paging_spec.rs`
///
/// - `result < 2^shift`
pub fn page_offset(address: u64, shift: u32) -> u64 {
    let result = bits64(address, 0, shift);
    debug_assert!(
        shift >= u64::BITS || result < (1u64 << shift),
        "page_offset: {result:#x} exceeds a {shift}-bit page"
    );
    result
}

/// Whether `address` is canonical for `linear_bits` implemented bits.
///
/// A canonical address has bits `63 .. linear_bits - 1` all equal, i.e.
/// the upper bits sign-extend the highest implemented bit.
///
/// # Properties verified by `verus/paging_spec.rs`
///
/// - `address < 2^(linear_bits - 1) ==> is_canonical(address, linear_bits)`
/// - `is_canonical(a, 64)` for every `a`
pub fn is_canonical(address: u64, linear_bits: u32) -> bool {
    debug_assert!(linear_bits > 0, "is_canonical: zero linear width");
    if linear_bits >= u64::BITS {
        return true;
    }
    let upper = (address as i64) >> (linear_bits - 1);
    upper == 0 || upper == -1
}

// ═══════════════════════════════════════════════════════════════════════
//  Entry field extraction
// ═══════════════════════════════════════════════════════════════════════

/// Physical address of the 4 KiB-aligned structure referenced by `value`.
///
/// Applies to CR3 as well as to non-leaf entries: keeps bits
/// `12 .. physical_bits - 1` and drops flags and reserved bits.
pub fn table_address(value: u64, physical_bits: u32) -> u64 {
    let result = value & field_mask(PAGE_SHIFT, physical_bits - PAGE_SHIFT);
    // Postcondition: page aligned.
    debug_assert_eq!(result & (SIZE_4K - 1), 0, "table_address: not page aligned");
    result
}

/// Frame number field of an entry whose frame starts at bit `shift`.
///
/// For a 4 KiB frame `shift` is 12, for a 2 MiB page 21, for a 1 GiB page
/// 30.  The field always ends at bit `physical_bits - 1`, so its width
/// shrinks as the page grows.
///
/// # Properties verified by `verus/paging_spec.rs`
///
/// - `result < 2^(physical_bits - shift)`
/// - `(result << shift) < 2^physical_bits`
pub fn frame_number(raw: u64, shift: u32, physical_bits: u32) -> u64 {
    debug_assert!(
        shift < physical_bits,
        "frame_number: shift {shift} must be below physical width {physical_bits}"
    );
    let width = physical_bits - shift;
    let result = bits64(raw, shift, width);
    debug_assert!(
        result < (1u64 << width),
        "frame_number: {result:#x} exceeds {width} bits"
    );
    result
}

/// Must-be-zero bits between MAXPHYADDR and bit 51.
pub fn reserved_high(raw: u64, physical_bits: u32) -> u64 {
    debug_assert!(
        physical_bits <= MAX_PHYSICAL_BITS,
        "reserved_high: physical width {physical_bits} above 52"
    );
    bits64(raw, physical_bits, MAX_PHYSICAL_BITS - physical_bits)
}

/// Must-be-zero bits of a huge-page entry between PAT (bit 12) and the
/// frame field starting at bit `shift`.
pub fn huge_reserved(raw: u64, shift: u32) -> u64 {
    debug_assert!(
        shift > HUGE_RESERVED_START,
        "huge_reserved: shift {shift} leaves no reserved run"
    );
    bits64(raw, HUGE_RESERVED_START, shift - HUGE_RESERVED_START)
}

// ═══════════════════════════════════════════════════════════════════════
//  Entry construction
// ═══════════════════════════════════════════════════════════════════════

/// Construct a raw paging-structure entry from flag bits and an address.
///
/// `address` must be aligned to the page or table it references; only
/// bits `12 ..= 51` are taken from it.  `flags` supplies every other bit
/// (bits 0–11 and 52–63) and its address bits are ignored.
///
/// # Properties verified by `verus/paging_spec.rs`
///
/// - `table_address(encode_entry(f, a), 52) == a & ADDRESS_MASK`
/// - `encode_entry(0, 0) == 0`
pub fn encode_entry(flags: u64, address: u64) -> u64 {
    let address_mask = field_mask(PAGE_SHIFT, MAX_PHYSICAL_BITS - PAGE_SHIFT);
    let result = (address & address_mask) | (flags & !address_mask);

    // Postcondition: the address field round-trips.
    debug_assert_eq!(
        table_address(result, MAX_PHYSICAL_BITS),
        address & address_mask,
        "encode_entry: address {address:#x} did not round-trip"
    );

    result
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

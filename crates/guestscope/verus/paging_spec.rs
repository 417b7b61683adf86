// Verus specification for guestscope pure functions.
//
// These specs document the formal verification properties of the pure
// functions in `src/verified/{bits,paging,descriptor}.rs`.  They are NOT
// compiled by `cargo`; they are consumed by the Verus verifier:
//
//     verus verus/paging_spec.rs
//
// Each function is annotated with `requires` (preconditions) and `ensures`
// (postconditions) that Verus will prove hold for ALL valid inputs.
//
// Reference: https://verus-lang.github.io/verus/guide/

verus! {

// ═══════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════

pub const PAGE_SHIFT:          u32 = 12u32;
pub const INDEX_BITS:          u32 = 9u32;
pub const PML4_SHIFT:          u32 = 39u32;
pub const PDPT_SHIFT:          u32 = 30u32;
pub const PD_SHIFT:            u32 = 21u32;
pub const PT_SHIFT:            u32 = 12u32;
pub const MAX_PHYSICAL_BITS:   u32 = 52u32;
pub const ADDRESS_MASK:        u64 = 0x000f_ffff_ffff_f000u64;

/// The four index fields tile bits 47:12 without gaps or overlap.
proof fn lemma_levels_tile_linear_address()
    ensures
        PML4_SHIFT == PDPT_SHIFT + INDEX_BITS,
        PDPT_SHIFT == PD_SHIFT + INDEX_BITS,
        PD_SHIFT == PT_SHIFT + INDEX_BITS,
        PT_SHIFT == PAGE_SHIFT,
        PML4_SHIFT + INDEX_BITS == 48u32,
{ /* constant evaluation */ }

// ═══════════════════════════════════════════════════════════════════════
// bits
// ═══════════════════════════════════════════════════════════════════════

/// Bit-slice extraction over a 128-bit value.
pub fn bits(value: u128, start: u32, nbits: u32) -> (result: u128)
    ensures
        // 1. Out-of-range start yields zero.
        start >= 128u32 ==> result == 0u128,
        // 2. Zero width yields zero.
        nbits == 0u32 ==> result == 0u128,
        // 3. The result fits in nbits.
        (start < 128u32 && 0u32 < nbits && nbits < 128u32) ==> result < (1u128 << nbits),
        // 4. Full width is a plain shift.
        (start < 128u32 && nbits >= 128u32) ==> result == value >> start,
{
    if start >= 128u32 || nbits == 0u32 {
        0u128
    } else if nbits >= 128u32 {
        value >> start
    } else {
        (value >> start) & ((1u128 << nbits) - 1u128)
    }
}

/// `bits(90, 2, 3) == 6`: 90 = 0b1011010, bits 4:2 are 0b110.
proof fn lemma_bits_example()
    ensures
        bits(90u128, 2u32, 3u32) == 6u128,
{ /* bit-vector evaluation */ }

// ═══════════════════════════════════════════════════════════════════════
// Linear-address decomposition
// ═══════════════════════════════════════════════════════════════════════

/// 9-bit table index at `shift`.
pub fn table_index(address: u64, shift: u32) -> (result: u16)
    requires
        shift < 64u32,
    ensures
        result < 512u16,
{
    ((address >> shift) & 0x1ffu64) as u16
}

/// In-page offset for a page of `1 << shift` bytes.
pub fn page_offset(address: u64, shift: u32) -> (result: u64)
    requires
        shift < 64u32,
    ensures
        result < (1u64 << shift),
        result <= address,
{
    address & ((1u64 << shift) - 1u64)
}

/// An address is canonical when bits 63 .. linear_bits-1 sign-extend.
pub open spec fn canonical(address: u64, linear_bits: u32) -> bool {
    address < (1u64 << (linear_bits - 1u32))
        || address >= (0xffff_ffff_ffff_ffffu64 << (linear_bits - 1u32))
}

pub fn is_canonical(address: u64, linear_bits: u32) -> (result: bool)
    requires
        0u32 < linear_bits,
        linear_bits < 64u32,
    ensures
        result == canonical(address, linear_bits),
{
    let upper = (address as i64) >> (linear_bits - 1u32);
    upper == 0i64 || upper == -1i64
}

/// Lower-half addresses are always canonical.
proof fn lemma_low_half_canonical(address: u64)
    requires
        address < 0x0000_8000_0000_0000u64,
    ensures
        canonical(address, 48u32),
{ /* from the definition */ }

/// The first non-canonical address above the lower half is rejected.
proof fn lemma_hole_rejected()
    ensures
        !canonical(0x0000_8000_0000_0000u64, 48u32),
{ /* constant evaluation */ }

// ═══════════════════════════════════════════════════════════════════════
// Frame extraction
// ═══════════════════════════════════════════════════════════════════════

/// Frame number of an entry whose frame field starts at `shift`.
///
/// The field is bounded by MAXPHYADDR: its width shrinks as the page
/// grows (40 bits for 4 KiB, 31 for 2 MiB, 22 for 1 GiB when M = 52).
pub fn frame_number(raw: u64, shift: u32, physical_bits: u32) -> (result: u64)
    requires
        12u32 <= shift,
        shift < physical_bits,
        physical_bits <= MAX_PHYSICAL_BITS,
    ensures
        result < (1u64 << (physical_bits - shift)),
        (result << shift) < (1u64 << physical_bits),
{
    (raw >> shift) & ((1u64 << (physical_bits - shift)) - 1u64)
}

/// A 4 KiB frame is page aligned once shifted back.
proof fn lemma_frame_aligned(raw: u64, physical_bits: u32)
    requires
        12u32 < physical_bits,
        physical_bits <= MAX_PHYSICAL_BITS,
    ensures
        (frame_number(raw, 12u32, physical_bits) << 12u32) & 0xfffu64 == 0u64,
{ /* bit-vector reasoning */ }

// ═══════════════════════════════════════════════════════════════════════
// Entry encoding
// ═══════════════════════════════════════════════════════════════════════

/// Combine flag bits and an address into a raw entry.
pub fn encode_entry(flags: u64, address: u64) -> (result: u64)
    ensures
        // 1. The address field round-trips.
        result & ADDRESS_MASK == address & ADDRESS_MASK,
        // 2. Flag bits outside the address field round-trip.
        result & !ADDRESS_MASK == flags & !ADDRESS_MASK,
        // 3. Null entry.
        (flags == 0u64 && address == 0u64) ==> result == 0u64,
{
    (address & ADDRESS_MASK) | (flags & !ADDRESS_MASK)
}

// ═══════════════════════════════════════════════════════════════════════
// Segment descriptors
// ═══════════════════════════════════════════════════════════════════════

pub open spec fn get_base(raw: u64) -> u64 {
    ((raw >> 16u64) & 0x00ff_ffffu64) | (((raw >> 56u64) & 0xffu64) << 24u64)
}

pub open spec fn get_type(raw: u64) -> u8 {
    ((raw >> 40u64) & 0xfu64) as u8
}

/// Construct a raw 8-byte segment descriptor.
pub fn segment_entry(flags: u16, base: u32, limit: u32) -> (result: u64)
    ensures
        // 1. Null entry: all-zero inputs produce all-zero output.
        (flags == 0u16 && base == 0u32 && limit == 0u32) ==> result == 0u64,
        // 2. Base address round-trips through extraction.
        get_base(result) == base as u64,
        // 3. Type field round-trips.
        get_type(result) == (flags & 0xFu16) as u8,
{
    ((base as u64 & 0xff00_0000u64) << (56u64 - 24u64))
        | ((flags as u64 & 0x0000_f0ffu64) << 40u64)
        | ((limit as u64 & 0x000f_0000u64) << (48u64 - 16u64))
        | ((base as u64 & 0x00ff_ffffu64) << 16u64)
        | (limit as u64 & 0x0000_ffffu64)
}

/// A system type nibble of 0xF satisfies the TSS mask as well; the
/// classifier must therefore test for a call gate first.
proof fn lemma_call_gate_overlaps_tss_mask()
    ensures
        0xfu8 & 0x9u8 == 0x9u8,
{ /* constant evaluation */ }

} // verus!

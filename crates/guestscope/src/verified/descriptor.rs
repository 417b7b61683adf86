//! Pure field layouts for segment and gate descriptors.
//!
//! Segment descriptor bit layout (low 8 bytes):
//!
//! ```text
//!   Bits 63:56 — Base address [31:24]
//!   Bit  55    — Granularity (G)
//!   Bit  54    — Default operation size (D/B)
//!   Bit  53    — 64-bit code segment (L)
//!   Bit  52    — Available for system use (AVL)
//!   Bits 51:48 — Segment limit [19:16]
//!   Bit  47    — Present (P)
//!   Bits 46:45 — Descriptor Privilege Level (DPL)
//!   Bit  44    — Descriptor type: S (0=system, 1=code/data)
//!   Bits 43:40 — Type
//!   Bits 39:16 — Base address [23:0]
//!   Bits 15:0  — Segment limit [15:0]
//! ```
//!
//! System descriptors (TSS, call gate) and IDT gates extend to 16 bytes;
//! their upper 8 bytes carry bits 63:32 of the base or target offset.
//!
//! Gate descriptor layout (16 bytes):
//!
//! ```text
//!   Bits 127:96 — reserved
//!   Bits  95:64 — Offset [63:32]
//!   Bits  63:48 — Offset [31:16]
//!   Bit   47    — Present (P)
//!   Bits  46:45 — DPL
//!   Bits  43:40 — Type
//!   Bits  34:32 — Interrupt Stack Table index (IST)
//!   Bits  31:16 — Segment selector
//!   Bits  15:0  — Offset [15:0]
//! ```

use crate::verified::bits::bits;

// ═══════════════════════════════════════════════════════════════════════
//  Segment descriptor fields
// ═══════════════════════════════════════════════════════════════════════

/// Base address [31:0], reassembled from bits 39:16 and 63:56.
///
/// # Properties verified by `verus/paging_spec.rs`
///
/// - `segment_base(segment_entry(f, b, l)) == b`
pub fn segment_base(raw: u128) -> u32 {
    let result = bits(raw, 16, 24) | bits(raw, 32 + 24, 8) << 24;
    debug_assert!(
        result <= 0xFFFF_FFFF,
        "segment_base: result {result:#x} exceeds 32 bits"
    );
    result as u32
}

/// Raw 20-bit segment limit, reassembled from bits 15:0 and 51:48.
///
/// The granularity bit is not applied; see [`effective_limit`].
pub fn segment_limit(raw: u128) -> u32 {
    let result = bits(raw, 0, 16) | bits(raw, 32 + 16, 4) << 16;
    debug_assert!(
        result <= 0xFFFFF,
        "segment_limit: raw limit {result:#x} exceeds 20 bits"
    );
    result as u32
}

/// Byte-granular limit: the raw limit scaled by 4 KiB when G is set.
pub fn effective_limit(raw: u128) -> u32 {
    let limit = segment_limit(raw);
    match granularity(raw) {
        0 => limit,
        _ => (limit << 12) | 0xFFF,
    }
}

/// Type field — bits 43:40.  Returns 0–15.
pub fn segment_type(raw: u128) -> u8 {
    bits(raw, 32 + 8, 4) as u8
}

/// Code/data tag — bits 44:43 (S and the executable bit).
///
/// `0b10` is a data segment, `0b11` a code segment; `0b00` and `0b01`
/// are system descriptors, distinguished further by [`segment_type`].
pub fn segment_class(raw: u128) -> u8 {
    bits(raw, 32 + 11, 2) as u8
}

/// Granularity bit (G) — bit 55.
pub fn granularity(raw: u128) -> u8 {
    bits(raw, 32 + 23, 1) as u8
}

/// Default operation size / big bit (D/B) — bit 54.
pub fn default_size(raw: u128) -> u8 {
    bits(raw, 32 + 22, 1) as u8
}

/// Long mode bit (L) — bit 53.
pub fn long_mode(raw: u128) -> u8 {
    bits(raw, 32 + 21, 1) as u8
}

/// Available for system use (AVL) — bit 52.
pub fn available(raw: u128) -> u8 {
    bits(raw, 32 + 20, 1) as u8
}

/// Present bit (P) — bit 47.
pub fn present(raw: u128) -> u8 {
    bits(raw, 32 + 15, 1) as u8
}

/// Descriptor privilege level — bits 46:45.  Returns 0–3.
pub fn dpl(raw: u128) -> u8 {
    bits(raw, 32 + 13, 2) as u8
}

/// Base address [63:32] of a 16-byte system descriptor — bits 95:64.
pub fn system_base_high(raw: u128) -> u32 {
    bits(raw, 64, 32) as u32
}

// ═══════════════════════════════════════════════════════════════════════
//  Gate descriptor fields
// ═══════════════════════════════════════════════════════════════════════

/// Target offset [63:0], reassembled from bits 15:0, 63:48 and 95:64.
pub fn gate_offset(raw: u128) -> u64 {
    (bits(raw, 0, 16) | bits(raw, 32 + 16, 16) << 16 | bits(raw, 64, 32) << 32) as u64
}

/// Target code-segment selector — bits 31:16.
pub fn gate_selector(raw: u128) -> u16 {
    bits(raw, 16, 16) as u16
}

/// Interrupt stack table index — bits 35:32.
///
/// Only bits 34:32 are architecturally defined; bit 35 is reserved and
/// kept so that a non-zero value shows up in the display.
pub fn gate_ist(raw: u128) -> u8 {
    bits(raw, 32, 4) as u8
}

// ═══════════════════════════════════════════════════════════════════════
//  Descriptor construction
// ═══════════════════════════════════════════════════════════════════════

/// Construct a raw 8-byte segment descriptor from flags, base, and limit.
///
/// The `flags` parameter packs the access byte and flags nibble:
///
/// ```text
/// flags[7:0]   → descriptor byte 5  (access: P, DPL, S, Type)
/// flags[15:12] → descriptor byte 6  high nibble (G, D/B, L, AVL)
/// flags[11:8]  → masked out (unused)
/// ```
///
/// # Properties verified by `verus/paging_spec.rs`
///
/// - `segment_base(segment_entry(f, b, l)) == b`
/// - `segment_type(segment_entry(f, b, l)) == f & 0xF`
/// - `segment_entry(0, 0, 0) == 0`
pub fn segment_entry(flags: u16, base: u32, limit: u32) -> u64 {
    let result = ((u64::from(base) & 0xff00_0000u64) << (56 - 24))
        | ((u64::from(flags) & 0x0000_f0ffu64) << 40)
        | ((u64::from(limit) & 0x000f_0000u64) << (48 - 16))
        | ((u64::from(base) & 0x00ff_ffffu64) << 16)
        | (u64::from(limit) & 0x0000_ffffu64);

    debug_assert_eq!(
        segment_base(u128::from(result)),
        base,
        "segment_entry: base must round-trip (base={base:#x})"
    );
    debug_assert_eq!(
        segment_type(u128::from(result)),
        (flags & 0xF) as u8,
        "segment_entry: type field must round-trip (flags={flags:#x})"
    );

    result
}

/// Construct a raw 16-byte system descriptor with a 64-bit base.
pub fn system_entry(flags: u16, base: u64, limit: u32) -> u128 {
    let low = segment_entry(flags, base as u32, limit);
    let result = u128::from(low) | u128::from(base >> 32) << 64;
    debug_assert_eq!(
        u64::from(system_base_high(result)) << 32 | u64::from(segment_base(result)),
        base,
        "system_entry: base must round-trip"
    );
    result
}

/// Construct a raw 16-byte gate descriptor.
///
/// `attributes` is the access byte (P, DPL, 0, Type) placed at bits 47:40.
pub fn gate_entry(offset: u64, selector: u16, ist: u8, attributes: u8) -> u128 {
    let offset = u128::from(offset);
    let result = (offset & 0xffff)
        | u128::from(selector) << 16
        | u128::from(ist & 0x7) << 32
        | u128::from(attributes) << 40
        | ((offset >> 16) & 0xffff) << 48
        | ((offset >> 32) & 0xffff_ffff) << 64;
    debug_assert_eq!(
        u128::from(gate_offset(result)),
        offset,
        "gate_entry: offset must round-trip"
    );
    result
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    /// 64-bit code, ring 0: P, DPL=0, S, type=1011; G=1, L=1.
    const FLAGS_CODE64: u16 = 0xa09b;
    /// Data, ring 0: P, DPL=0, S, type=0011; G=1, D/B=1.
    const FLAGS_DATA: u16 = 0xc093;
    /// 64-bit TSS, busy: P, DPL=0, type=1011.
    const FLAGS_TSS: u16 = 0x808b;

    #[test]
    fn null_entry_is_zero() {
        assert_eq!(segment_entry(0, 0, 0), 0);
    }

    #[test]
    fn base_roundtrip() {
        for &base in &[0x1u32, 0xFFFF, 0x1234_5678, 0xFF00_0000, 0xFFFF_FFFF] {
            let entry = segment_entry(FLAGS_DATA, base, 0xfffff);
            assert_eq!(segment_base(u128::from(entry)), base, "base {base:#x}");
        }
    }

    #[test]
    fn limit_and_granularity() {
        let g0 = u128::from(segment_entry(0x0093, 0, 0xabcde));
        assert_eq!(segment_limit(g0), 0xabcde);
        assert_eq!(effective_limit(g0), 0xabcde);

        let g1 = u128::from(segment_entry(FLAGS_DATA, 0, 0xfffff));
        assert_eq!(segment_limit(g1), 0xfffff);
        assert_eq!(effective_limit(g1), 0xFFFF_FFFF);
    }

    #[test]
    fn code64_fields() {
        let raw = u128::from(segment_entry(FLAGS_CODE64, 0, 0xfffff));
        assert_eq!(segment_class(raw), 0b11);
        assert_eq!(segment_type(raw), 0xb);
        assert_eq!(long_mode(raw), 1);
        assert_eq!(default_size(raw), 0);
        assert_eq!(granularity(raw), 1);
        assert_eq!(present(raw), 1);
        assert_eq!(dpl(raw), 0);
    }

    #[test]
    fn data_fields() {
        let raw = u128::from(segment_entry(FLAGS_DATA, 0, 0xfffff));
        assert_eq!(segment_class(raw), 0b10);
        assert_eq!(long_mode(raw), 0);
        assert_eq!(default_size(raw), 1);
    }

    #[test]
    fn tss_is_system_class() {
        let raw = system_entry(FLAGS_TSS, 0xffff_8880_0001_2000, 0x67);
        assert!(segment_class(raw) < 0b10);
        assert_eq!(segment_type(raw), 0xb);
        assert_eq!(system_base_high(raw), 0xffff_8880);
        assert_eq!(segment_base(raw), 0x0001_2000);
    }

    #[test]
    fn dpl_values() {
        for level in 0..4u16 {
            let raw = u128::from(segment_entry(0x0093 | level << 5, 0, 0));
            assert_eq!(dpl(raw), level as u8);
        }
    }

    #[test]
    fn gate_fields_roundtrip() {
        let raw = gate_entry(0xffff_ffff_8100_1234, 0x10, 3, 0xee);
        assert_eq!(gate_offset(raw), 0xffff_ffff_8100_1234);
        assert_eq!(gate_selector(raw), 0x10);
        assert_eq!(gate_ist(raw), 3);
        assert_eq!(segment_type(raw), 0xe);
        assert_eq!(dpl(raw), 3);
        assert_eq!(present(raw), 1);
        assert_eq!(bits(raw, 96, 32), 0);
    }
}

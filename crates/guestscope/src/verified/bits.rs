//! Arbitrary-width bit-slice extraction.
//!
//! Segment descriptors for system segments and every IDT gate are 128 bits
//! wide, so extraction is defined over `u128` rather than the native
//! machine word.  Narrower raw values widen losslessly with `u128::from`.

/// Extract `nbits` bits of `value` starting at bit position `start`.
///
/// The result is shifted down so that bit `start` of `value` becomes bit 0.
/// Bits of `value` above `start + nbits` never leak into the result.
///
/// - `start >= 128` selects nothing and yields 0.
/// - `nbits >= 128` selects every bit from `start` upward.
///
/// # Properties verified by `verus/paging_spec.rs`
///
/// - `nbits < 128 ==> result < 2^nbits`
/// - `bits(v, 0, 128) == v`
///
/// # Example
///
/// ```
/// use guestscope::verified::bits::bits;
///
/// // 90 = 0b101_1010; bits 2..=4 are 0b110.
/// assert_eq!(bits(90, 2, 3), 6);
/// ```
pub fn bits(value: u128, start: u32, nbits: u32) -> u128 {
    if start >= u128::BITS || nbits == 0 {
        return 0;
    }

    let shifted = value >> start;
    let result = if nbits >= u128::BITS {
        shifted
    } else {
        shifted & ((1u128 << nbits) - 1)
    };

    // Postcondition: nothing set above bit nbits - 1.
    debug_assert!(
        nbits >= u128::BITS || result >> nbits == 0,
        "bits: result {result:#x} wider than {nbits} bits"
    );

    result
}

/// [`bits`] over a 64-bit raw value.
///
/// The result always fits in 64 bits because the input does.
pub fn bits64(value: u64, start: u32, nbits: u32) -> u64 {
    bits(u128::from(value), start, nbits) as u64
}

/// Single-bit test over a 64-bit raw value.
pub fn bit(value: u64, position: u32) -> bool {
    bits64(value, position, 1) == 1
}

/// Mask with bits `start .. start + nbits` set.
pub fn field_mask(start: u32, nbits: u32) -> u64 {
    if start >= u64::BITS || nbits == 0 {
        return 0;
    }
    let width = nbits.min(u64::BITS - start);
    let low = if width >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };
    low << start
}

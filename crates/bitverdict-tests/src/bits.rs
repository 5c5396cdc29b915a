//! Bit-window extraction.
//!
//! Bits are numbered from 0, most significant bit first within each byte,
//! bytes in stream order. Every engine reads its input through [`get_bits`].

/// Read the `width`-bit field starting at `bit_offset`, MSB first.
///
/// `width` must be at most 32. Bytes past the end of `buf` read as zero, so
/// callers are expected to keep `bit_offset + width` within the valid bit
/// count they were given.
pub fn get_bits(buf: &[u8], bit_offset: usize, width: u32) -> u32 {
    debug_assert!(width <= 32, "get_bits: width {width} > 32");
    if width == 0 {
        return 0;
    }
    let first = bit_offset / 8;
    let skip = (bit_offset % 8) as u32;
    // skip + width <= 7 + 32, so five bytes always cover the window.
    let mut window = 0u64;
    for i in 0..5 {
        let byte = buf.get(first + i).copied().unwrap_or(0);
        window = (window << 8) | u64::from(byte);
    }
    let shift = 40 - skip - width;
    ((window >> shift) & mask64(width)) as u32
}

/// Low-`width`-bits mask, valid for `width` in `0..=32`.
#[inline]
pub const fn mask32(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

#[inline]
const fn mask64(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

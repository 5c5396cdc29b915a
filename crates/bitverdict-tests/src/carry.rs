//! Stream carry register.
//!
//! Lets an engine treat successive `update` calls as one continuous bit
//! stream. The register holds the in-flight unit (a stroke, matrix row or
//! universal block) together with how many of its bits have arrived. Every
//! call to [`UnitCarry::feed`]:
//!
//! 1. tops up the in-flight unit from the new data,
//! 2. hands each completed unit to the engine's handler,
//! 3. reads further whole units straight out of the buffer,
//! 4. parks any leftover tail as the new carry.
//!
//! The handler sees exactly the same sequence of units however the caller
//! chunks its input.

use std::ops::ControlFlow;

use crate::bits::{get_bits, mask32};

/// Partial-unit register for units of up to 32 bits.
#[derive(Debug, Clone)]
pub struct UnitCarry {
    width: u32,
    partial: u32,
    filled: u32,
}

/// Outcome of a [`UnitCarry::feed`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fed {
    /// Bits taken from the input, including any parked in the carry.
    pub consumed: u64,
    /// Whether the handler asked to stop.
    pub stopped: bool,
}

impl UnitCarry {
    /// Create an empty register for `width`-bit units (`1..=32`).
    pub fn new(width: u32) -> Self {
        debug_assert!((1..=32).contains(&width), "unit width {width}");
        Self {
            width,
            partial: 0,
            filled: 0,
        }
    }

    /// Unit width in bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Bits of the in-flight unit received so far.
    pub fn pending_bits(&self) -> u32 {
        self.filled
    }

    /// Drop the in-flight unit.
    pub fn clear(&mut self) {
        self.partial = 0;
        self.filled = 0;
    }

    /// Feed the first `nbits` bits of `data` through the register.
    ///
    /// `on_unit` receives each completed unit (right-aligned). Returning
    /// `ControlFlow::Break` stops consumption immediately; the bits after the
    /// last completed unit are then left unconsumed and the carry stays empty.
    pub fn feed<F>(&mut self, data: &[u8], nbits: usize, mut on_unit: F) -> Fed
    where
        F: FnMut(u32) -> ControlFlow<()>,
    {
        debug_assert!(nbits <= data.len() * 8);
        let width = self.width as usize;
        let mut pos = 0usize;

        if self.filled > 0 {
            let need = (self.width - self.filled) as usize;
            let take = need.min(nbits);
            let bits = get_bits(data, 0, take as u32);
            self.partial = shl(self.partial, take as u32) | bits;
            self.filled += take as u32;
            pos = take;
            if self.filled < self.width {
                return Fed {
                    consumed: pos as u64,
                    stopped: false,
                };
            }
            let unit = self.partial & mask32(self.width);
            self.clear();
            if on_unit(unit).is_break() {
                return Fed {
                    consumed: pos as u64,
                    stopped: true,
                };
            }
        }

        while nbits - pos >= width {
            let unit = get_bits(data, pos, self.width);
            pos += width;
            if on_unit(unit).is_break() {
                return Fed {
                    consumed: pos as u64,
                    stopped: true,
                };
            }
        }

        let tail = nbits - pos;
        if tail > 0 {
            self.partial = get_bits(data, pos, tail as u32);
            self.filled = tail as u32;
        }
        Fed {
            consumed: nbits as u64,
            stopped: false,
        }
    }
}

/// Left shift that tolerates a full 32-bit shift.
#[inline]
fn shl(value: u32, by: u32) -> u32 {
    value.checked_shl(by).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(carry: &mut UnitCarry, chunks: &[(&[u8], usize)]) -> Vec<u32> {
        let mut out = Vec::new();
        for &(data, nbits) in chunks {
            carry.feed(data, nbits, |u| {
                out.push(u);
                ControlFlow::Continue(())
            });
        }
        out
    }

    #[test]
    fn whole_units_in_one_call() {
        let mut carry = UnitCarry::new(4);
        let units = collect(&mut carry, &[(&[0xA5, 0x3C], 16)]);
        assert_eq!(units, vec![0xA, 0x5, 0x3, 0xC]);
        assert_eq!(carry.pending_bits(), 0);
    }

    #[test]
    fn units_span_calls() {
        // Stream 1010 0101 0011 1100 split as 3 + 6 + 7 bits.
        let mut carry = UnitCarry::new(4);
        let units = collect(
            &mut carry,
            &[
                (&[0b1010_0000], 3),
                (&[0b0010_1000], 6),
                (&[0b0111_1000], 7),
            ],
        );
        assert_eq!(units, vec![0xA, 0x5, 0x3, 0xC]);
        assert_eq!(carry.pending_bits(), 0);
    }

    #[test]
    fn leftover_tail_is_parked() {
        let mut carry = UnitCarry::new(6);
        let units = collect(&mut carry, &[(&[0xFF, 0x00], 16)]);
        assert_eq!(units, vec![0b111111, 0b110000]);
        assert_eq!(carry.pending_bits(), 4);
        let units = collect(&mut carry, &[(&[0b1100_0000], 2)]);
        assert_eq!(units, vec![0b0000_11]);
        assert_eq!(carry.pending_bits(), 0);
    }

    #[test]
    fn full_width_units_across_calls() {
        let mut carry = UnitCarry::new(32);
        let units = collect(
            &mut carry,
            &[(&[0xDE, 0xAD], 16), (&[0xBE], 8), (&[0xEF, 0x01], 8)],
        );
        assert_eq!(units, vec![0xDEAD_BEEF]);
    }

    #[test]
    fn zero_bits_is_noop() {
        let mut carry = UnitCarry::new(5);
        let fed = carry.feed(&[], 0, |_| panic!("no unit expected"));
        assert_eq!(fed.consumed, 0);
        assert_eq!(carry.pending_bits(), 0);
    }

    #[test]
    fn break_stops_consumption() {
        let mut carry = UnitCarry::new(8);
        let mut seen = 0;
        let fed = carry.feed(&[1, 2, 3, 4], 32, |_| {
            seen += 1;
            if seen == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(seen, 2);
        assert!(fed.stopped);
        assert_eq!(fed.consumed, 16);
        assert_eq!(carry.pending_bits(), 0);
    }
}

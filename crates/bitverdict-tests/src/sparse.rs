//! Sparse occupancy ("monkey") engine.
//!
//! Counts how many of the `m^k` possible `k`-letter words over an alphabet of
//! `m = 2^b` letters never appear in a stream of overlapping words. Each
//! `r`-bit stroke of the generator contributes one `b`-bit letter; letters
//! are shifted into a `k`-letter register, and once the register is full
//! every further stroke completes one word.
//!
//! OPSO, OQSO, DNA and OTSO are parameter presets of this one engine.
//!
//! Strokes are decoded big-endian: the first stream bit is the stroke's most
//! significant bit.

use std::f64::consts::SQRT_2;
use std::ops::ControlFlow;

use log::trace;
use statrs::function::erf::erfc;

use crate::bits::mask32;
use crate::carry::UnitCarry;
use crate::context::{TestDescriptor, TestEngine};
use crate::error::{Result, TestError, try_zeroed};
use crate::result::{TestResult, finite, validate_alpha};
use crate::DEFAULT_ALPHA;

pub static OPSO: TestDescriptor = TestDescriptor {
    name: "opso",
    description: "Overlapping pairs sparse occupancy: 2-letter words over 10-bit letters",
    version: "1.0.0",
    alignment: 8,
};

pub static OTSO: TestDescriptor = TestDescriptor {
    name: "otso",
    description: "Overlapping triples sparse occupancy: 3-letter words over one byte of each stroke",
    version: "1.0.0",
    alignment: 8,
};

pub static OQSO: TestDescriptor = TestDescriptor {
    name: "oqso",
    description: "Overlapping quadruples sparse occupancy: 4-letter words over 5-bit letters",
    version: "1.0.0",
    alignment: 8,
};

pub static DNA: TestDescriptor = TestDescriptor {
    name: "dna",
    description: "DNA sparse occupancy: 10-letter words over 2-bit letters",
    version: "1.0.0",
    alignment: 8,
};

pub static SPARSE_CUSTOM: TestDescriptor = TestDescriptor {
    name: "sparse-occupancy",
    description: "Missing k-letter words over a 2^b-letter alphabet",
    version: "1.0.0",
    alignment: 8,
};

// Marsaglia's monkey-test constants for 2^21 overlapping words in a
// 2^20-word space. Ported as published; the standard deviations are
// empirical and unverified.
const MONKEY_WORDS: u64 = 1 << 21;
const MONKEY_MEAN: f64 = 141_909.0;
const OPSO_SIGMA: f64 = 290.0;
const OQSO_SIGMA: f64 = 295.0;
const DNA_SIGMA: f64 = 339.0;

// OTSO: 2^25 words in a 2^24-word space. Mean and deviation come from the
// Poisson occupancy approximation N e^-2 and sqrt(N e^-2 (1 - 3 e^-2)),
// which reproduces OPSO's 290 at N = 2^20. Unverified for overlapping
// triples.
const OTSO_WORDS: u64 = 1 << 25;
const OTSO_MEAN: f64 = 2_270_549.28;
const OTSO_SIGMA: f64 = 1_161.33;

/// Parameters of the sparse occupancy engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseParams {
    pub descriptor: &'static TestDescriptor,
    /// Alphabet size `m`; must equal `2^letter_bits`.
    pub alphabet_size: u64,
    /// Letter width `b`.
    pub letter_bits: u32,
    /// Word length `k`, in letters. `k * b <= 32`.
    pub word_letters: u32,
    /// Stroke width `r`.
    pub stroke_bits: u32,
    /// Position of the letter inside the stroke, in bits from the MSB.
    pub letter_offset: u32,
    /// Words to examine (`wmax`); the engine reads `wmax + k - 1` strokes.
    pub max_words: u64,
    /// Expected number of missing words.
    pub mean: f64,
    /// Standard deviation of the missing-word count.
    pub std_dev: f64,
    /// Significance level.
    pub alpha: f64,
}

impl SparseParams {
    /// Fully custom configuration over 32-bit strokes, letters from the top bits.
    pub fn custom(
        letter_bits: u32,
        word_letters: u32,
        max_words: u64,
        mean: f64,
        std_dev: f64,
    ) -> Self {
        Self {
            descriptor: &SPARSE_CUSTOM,
            alphabet_size: 1u64.checked_shl(letter_bits).unwrap_or(0),
            letter_bits,
            word_letters,
            stroke_bits: 32,
            letter_offset: 0,
            max_words,
            mean,
            std_dev,
            alpha: DEFAULT_ALPHA,
        }
    }

    /// OPSO: 2-letter words, 10-bit letters.
    pub fn opso() -> Self {
        Self {
            descriptor: &OPSO,
            ..Self::custom(10, 2, MONKEY_WORDS, MONKEY_MEAN, OPSO_SIGMA)
        }
    }

    /// OQSO: 4-letter words, 5-bit letters.
    pub fn oqso() -> Self {
        Self {
            descriptor: &OQSO,
            ..Self::custom(5, 4, MONKEY_WORDS, MONKEY_MEAN, OQSO_SIGMA)
        }
    }

    /// DNA: 10-letter words, 2-bit letters.
    pub fn dna() -> Self {
        Self {
            descriptor: &DNA,
            ..Self::custom(2, 10, MONKEY_WORDS, MONKEY_MEAN, DNA_SIGMA)
        }
    }

    /// OTSO: 3-letter words, one byte of each stroke (`byte_offset` 0..=3).
    pub fn otso(byte_offset: u32) -> Self {
        Self {
            descriptor: &OTSO,
            letter_offset: byte_offset.saturating_mul(8),
            ..Self::custom(8, 3, OTSO_WORDS, OTSO_MEAN, OTSO_SIGMA)
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_letter_offset(mut self, letter_offset: u32) -> Self {
        self.letter_offset = letter_offset;
        self
    }

    /// Strokes the engine reads before it stops consuming.
    pub fn strokes_needed(&self) -> u64 {
        self.max_words
            .saturating_add(u64::from(self.word_letters).saturating_sub(1))
    }

    /// Check every parameter. Pure; allocates nothing.
    pub fn validate(&self) -> Result<()> {
        validate_alpha(self.alpha)?;
        if !(1..=32).contains(&self.letter_bits) {
            return Err(TestError::invalid(format!(
                "letter width {} outside 1..=32",
                self.letter_bits
            )));
        }
        if self.alphabet_size != 1u64 << self.letter_bits {
            return Err(TestError::invalid(format!(
                "alphabet size {} is not 2^{}",
                self.alphabet_size, self.letter_bits
            )));
        }
        if self.word_letters == 0 {
            return Err(TestError::invalid("word length must be at least 1"));
        }
        if self.word_letters.saturating_mul(self.letter_bits) > 32 {
            return Err(TestError::invalid(format!(
                "word width {}x{} exceeds 32 bits",
                self.word_letters, self.letter_bits
            )));
        }
        if !(1..=32).contains(&self.stroke_bits) {
            return Err(TestError::invalid(format!(
                "stroke width {} outside 1..=32",
                self.stroke_bits
            )));
        }
        if self.letter_offset.saturating_add(self.letter_bits) > self.stroke_bits {
            return Err(TestError::invalid(format!(
                "letter at offset {} does not fit a {}-bit stroke",
                self.letter_offset, self.stroke_bits
            )));
        }
        if self.max_words == 0 {
            return Err(TestError::invalid("max_words must be positive"));
        }
        if self
            .max_words
            .checked_add(u64::from(self.word_letters) - 1)
            .is_none()
        {
            return Err(TestError::invalid(format!(
                "max_words {} leaves no room for {} trailing letters",
                self.max_words,
                self.word_letters - 1
            )));
        }
        if !self.mean.is_finite() || !self.std_dev.is_finite() || self.std_dev < 0.0 {
            return Err(TestError::invalid(format!(
                "calibration mean={} sd={} must be finite with sd >= 0",
                self.mean, self.std_dev
            )));
        }
        Ok(())
    }

    fn word_bits(&self) -> u32 {
        self.word_letters * self.letter_bits
    }
}

/// Occupancy bitmap plus the sliding word register.
#[derive(Debug, Clone)]
struct Tally {
    occupancy: Vec<u64>,
    word: u64,
    word_mask: u64,
    letter_bits: u32,
    word_letters: u64,
    strokes: u64,
    missing: u64,
}

impl Tally {
    fn push_letter(&mut self, letter: u32) {
        self.word = ((self.word << self.letter_bits) | u64::from(letter)) & self.word_mask;
        self.strokes += 1;
        if self.strokes < self.word_letters {
            return;
        }
        let index = self.word as usize;
        let (slot, bit) = (index / 64, 1u64 << (index % 64));
        if self.occupancy[slot] & bit == 0 {
            self.occupancy[slot] |= bit;
            self.missing -= 1;
        }
    }
}

/// Sparse occupancy engine state.
#[derive(Debug, Clone)]
pub struct SparseOccupancy {
    params: SparseParams,
    carry: UnitCarry,
    tally: Tally,
    letter_shift: u32,
    letter_mask: u32,
    bits_seen: u64,
    discarded: u64,
}

impl SparseOccupancy {
    /// Words that have not been observed yet.
    pub fn missing_words(&self) -> u64 {
        self.tally.missing
    }

    /// Strokes consumed so far.
    pub fn strokes(&self) -> u64 {
        self.tally.strokes
    }

    /// Size of the word space, `m^k`.
    pub fn words_possible(&self) -> u64 {
        1u64 << self.params.word_bits()
    }

    pub fn params(&self) -> &SparseParams {
        &self.params
    }
}

impl TestEngine for SparseOccupancy {
    type Params = SparseParams;

    fn init(params: &SparseParams) -> Result<Self> {
        params.validate()?;
        let words = 1u64 << params.word_bits();
        let slots = usize::try_from(words.div_ceil(64)).map_err(|_| TestError::OutOfMemory {
            bytes: usize::MAX,
        })?;
        let occupancy = try_zeroed::<u64>(slots)?;
        Ok(Self {
            params: params.clone(),
            carry: UnitCarry::new(params.stroke_bits),
            tally: Tally {
                occupancy,
                word: 0,
                word_mask: words - 1,
                letter_bits: params.letter_bits,
                word_letters: u64::from(params.word_letters),
                strokes: 0,
                missing: words,
            },
            letter_shift: params.stroke_bits - params.letter_offset - params.letter_bits,
            letter_mask: mask32(params.letter_bits),
            bits_seen: 0,
            discarded: 0,
        })
    }

    fn descriptor(&self) -> &'static TestDescriptor {
        self.params.descriptor
    }

    fn update(&mut self, data: &[u8], nbits: usize) {
        self.bits_seen += nbits as u64;
        let needed = self.params.strokes_needed();
        if self.tally.strokes >= needed {
            self.discarded += nbits as u64;
            return;
        }
        let (shift, mask) = (self.letter_shift, self.letter_mask);
        let tally = &mut self.tally;
        let fed = self.carry.feed(data, nbits, |stroke| {
            tally.push_letter((stroke >> shift) & mask);
            if tally.strokes >= needed {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        self.discarded += nbits as u64 - fed.consumed;
        if fed.stopped {
            trace!(
                "{}: all {needed} strokes consumed, {} missing",
                self.params.descriptor.name,
                self.tally.missing
            );
        }
    }

    fn finalize(&mut self) -> Result<TestResult> {
        let needed = self.params.strokes_needed();
        if self.tally.strokes < needed {
            return Err(TestError::InsufficientData {
                needed,
                got: self.tally.strokes,
                unit: "strokes",
            });
        }
        if self.params.std_dev == 0.0 {
            return Err(TestError::DomainError(
                "missing-word standard deviation is zero".into(),
            ));
        }
        let missing = self.tally.missing as f64;
        let z = finite(
            "missing-word z-score",
            (missing - self.params.mean) / (self.params.std_dev * SQRT_2),
        )?;
        let p = erfc(z.abs());
        let discarded = self.discarded + u64::from(self.carry.pending_bits());
        Ok(TestResult::from_p(
            self.params.descriptor.name,
            p,
            self.params.alpha,
            z * SQRT_2,
            discarded,
        )
        .with_statistic2(missing)
        .with_details(format!(
            "missing={}, expected={:.1}, m={}, k={}",
            self.tally.missing, self.params.mean, self.params.alphabet_size, self.params.word_letters
        )))
    }

    fn bits_seen(&self) -> u64 {
        self.bits_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextState, TestContext};
    use crate::result::Status;

    /// One 32-bit big-endian stroke per letter, letter in the top `b` bits.
    fn strokes_from_letters(letters: &[u32], b: u32) -> Vec<u8> {
        letters
            .iter()
            .flat_map(|&l| (l << (32 - b)).to_be_bytes())
            .collect()
    }

    /// de Bruijn B(4, 2) plus the wrap-around letter: every 2-letter word
    /// over {0,1,2,3} appears exactly once.
    const DE_BRUIJN_4_2: [u32; 17] = [0, 0, 1, 0, 2, 0, 3, 1, 1, 2, 1, 3, 2, 2, 3, 3, 0];

    fn small_params() -> SparseParams {
        SparseParams::custom(2, 2, 16, 6.0, 1.5)
    }

    /// Generate pseudo-random data for testing (simple LCG).
    fn pseudo_random(n: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(n);
        let mut state: u64 = 0xDEAD_BEEF_CAFE_BABE;
        for _ in 0..n {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            data.push((state >> 33) as u8);
        }
        data
    }

    #[test]
    fn de_bruijn_visits_every_word() {
        let data = strokes_from_letters(&DE_BRUIJN_4_2, 2);
        let mut ctx = TestContext::<SparseOccupancy>::with_params(&small_params()).unwrap();
        let result = ctx.test(&data, data.len() * 8).unwrap().clone();
        assert_eq!(ctx.engine().unwrap().missing_words(), 0);
        assert_eq!(result.statistic2, Some(0.0));
        // z = (0 - 6) / (1.5 * sqrt 2), p = erfc(|z|)
        let expected = erfc(6.0 / (1.5 * SQRT_2));
        assert!((result.p_value - expected).abs() < 1e-15);
        assert!((result.statistic - (-4.0)).abs() < 1e-12);
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.discarded_bits, 0);
    }

    #[test]
    fn repeated_letter_leaves_fifteen_missing() {
        let data = strokes_from_letters(&[1; 17], 2);
        let mut ctx = TestContext::<SparseOccupancy>::with_params(&small_params()).unwrap();
        ctx.test(&data, data.len() * 8).unwrap();
        assert_eq!(ctx.engine().unwrap().missing_words(), 15);
    }

    #[test]
    fn missing_count_never_increases() {
        let data = pseudo_random(4 * 200);
        let params = SparseParams::custom(3, 2, 150, 10.0, 2.0);
        let mut ctx = TestContext::<SparseOccupancy>::with_params(&params).unwrap();
        let mut last = ctx.engine().unwrap().missing_words();
        assert_eq!(last, 64);
        for stroke in data.chunks(4) {
            ctx.update(stroke, 32).unwrap();
            let now = ctx.engine().unwrap().missing_words();
            assert!(now <= last);
            last = now;
        }
        assert!(ctx.finalize().is_ok());
    }

    #[test]
    fn finalize_before_all_strokes_is_insufficient() {
        let data = strokes_from_letters(&DE_BRUIJN_4_2, 2);
        let mut ctx = TestContext::<SparseOccupancy>::with_params(&small_params()).unwrap();
        ctx.update(&data[..16 * 4], 16 * 32).unwrap();
        let err = ctx.finalize().unwrap_err();
        assert_eq!(
            err,
            TestError::InsufficientData {
                needed: 17,
                got: 16,
                unit: "strokes"
            }
        );
        assert_eq!(ctx.state(), ContextState::Initialized);
        ctx.update(&data[16 * 4..], 32).unwrap();
        assert!(ctx.finalize().is_ok());
    }

    #[test]
    fn excess_bits_are_discarded() {
        let mut data = strokes_from_letters(&DE_BRUIJN_4_2, 2);
        data.extend_from_slice(&[0xAA; 5]);
        let mut ctx = TestContext::<SparseOccupancy>::with_params(&small_params()).unwrap();
        ctx.update(&data[..70], 70 * 8).unwrap();
        ctx.update(&data[70..], (data.len() - 70) * 8).unwrap();
        let result = ctx.finalize().unwrap();
        assert_eq!(result.discarded_bits, 40);
        assert_eq!(result.statistic2, Some(0.0));
    }

    #[test]
    fn letter_offset_selects_inner_bits() {
        // Letters live in bits 8..10 of each stroke; the top bits are noise.
        let data: Vec<u8> = DE_BRUIJN_4_2
            .iter()
            .flat_map(|&l| (0xC000_0000u32 | (l << 22)).to_be_bytes())
            .collect();
        let params = small_params().with_letter_offset(8);
        let mut ctx = TestContext::<SparseOccupancy>::with_params(&params).unwrap();
        ctx.test(&data, data.len() * 8).unwrap();
        assert_eq!(ctx.engine().unwrap().missing_words(), 0);
    }

    #[test]
    fn otso_reads_the_selected_byte() {
        let params = SparseParams::otso(2);
        assert_eq!(params.letter_offset, 16);
        assert!(params.validate().is_ok());
        assert!(SparseParams::otso(4).validate().is_err());
    }

    #[test]
    fn zero_deviation_is_a_domain_error() {
        let data = strokes_from_letters(&DE_BRUIJN_4_2, 2);
        let params = SparseParams::custom(2, 2, 16, 6.0, 0.0);
        let mut ctx = TestContext::<SparseOccupancy>::with_params(&params).unwrap();
        let err = ctx.test(&data, data.len() * 8).unwrap_err();
        assert!(matches!(err, TestError::DomainError(_)));
        assert_eq!(ctx.state(), ContextState::Error);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let base = small_params();
        let cases = [
            SparseParams {
                alphabet_size: 5,
                ..base.clone()
            },
            SparseParams {
                word_letters: 17,
                ..base.clone()
            },
            SparseParams {
                word_letters: 0,
                ..base.clone()
            },
            SparseParams {
                letter_offset: 31,
                ..base.clone()
            },
            SparseParams {
                max_words: 0,
                ..base.clone()
            },
            SparseParams {
                max_words: u64::MAX,
                ..base.clone()
            },
            SparseParams {
                std_dev: -1.0,
                ..base.clone()
            },
            base.clone().with_alpha(0.0),
            base.clone().with_alpha(1.5),
            base.clone().with_alpha(f64::NAN),
        ];
        for params in cases {
            assert!(
                matches!(params.validate(), Err(TestError::InvalidParameter(_))),
                "{params:?}"
            );
        }
    }

    #[test]
    fn stroke_cap_at_the_top_of_the_range() {
        let mut ctx = TestContext::<SparseOccupancy>::new();
        let err = ctx
            .init(&SparseParams::custom(2, 2, u64::MAX, 1.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, TestError::InvalidParameter(_)));
        assert_eq!(ctx.state(), ContextState::Uninitialized);

        let params = SparseParams::custom(2, 2, u64::MAX - 1, 1.0, 1.0);
        assert_eq!(params.strokes_needed(), u64::MAX);
        ctx.init(&params).unwrap();
        ctx.update(&[0u8; 8], 64).unwrap();
        assert_eq!(ctx.engine().unwrap().strokes(), 2);
        assert!(ctx.finalize().unwrap_err().is_retryable());
    }

    #[test]
    fn presets_are_valid() {
        for params in [
            SparseParams::opso(),
            SparseParams::oqso(),
            SparseParams::dna(),
            SparseParams::otso(0),
        ] {
            params.validate().unwrap();
        }
        assert_eq!(SparseParams::opso().strokes_needed(), (1 << 21) + 1);
        assert_eq!(SparseParams::dna().strokes_needed(), (1 << 21) + 9);
    }

    #[test]
    #[ignore] // Run with: cargo test -- --ignored
    fn opso_on_pseudo_random_data_passes() {
        let params = SparseParams::opso();
        let data = pseudo_random(params.strokes_needed() as usize * 4);
        let mut ctx = TestContext::<SparseOccupancy>::with_params(&params).unwrap();
        let result = ctx.test(&data, data.len() * 8).unwrap();
        assert!(result.p_value > 1e-4, "{result:?}");
    }
}

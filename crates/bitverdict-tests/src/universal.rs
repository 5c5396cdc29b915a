//! Universal statistical engine (Maurer, with Coron's correction).
//!
//! Splits the stream into `L`-bit blocks and measures, for every block after
//! a warm-up of `Q = 10 * 2^L` blocks, the log2 distance back to the previous
//! occurrence of the same pattern. A compressible source shows a short mean
//! distance.
//!
//! Both published variants run on this engine; they differ only in the
//! coefficient that scales the standard deviation.

use std::f64::consts::SQRT_2;
use std::ops::ControlFlow;

use statrs::function::erf::erfc;

use crate::carry::UnitCarry;
use crate::context::{TestDescriptor, TestEngine};
use crate::error::{Result, TestError, try_zeroed};
use crate::result::{TestResult, finite, validate_alpha};
use crate::DEFAULT_ALPHA;

pub static MAURER: TestDescriptor = TestDescriptor {
    name: "maurer-universal",
    description: "Maurer's universal statistical test",
    version: "1.0.0",
    alignment: 1,
};

pub static CORON: TestDescriptor = TestDescriptor {
    name: "coron-universal",
    description: "Maurer's universal statistical test with Coron's variance correction",
    version: "1.0.0",
    alignment: 1,
};

pub static UNIVERSAL_CUSTOM: TestDescriptor = TestDescriptor {
    name: "universal",
    description: "Universal statistical test with a caller-supplied coefficient",
    version: "1.0.0",
    alignment: 1,
};

pub const MIN_BLOCK_BITS: u32 = 6;
pub const MAX_BLOCK_BITS: u32 = 16;

/// Expected value of the per-block log2 distance, indexed by `L`
/// (NIST SP 800-22 table, unverified).
pub const EXPECTED_VALUE: [f64; 17] = [
    0.0, 0.7326495, 1.5374383, 2.4016068, 3.3112247, 4.2534266, 5.2177052, 6.1962507,
    7.1836656, 8.1764248, 9.1723243, 10.170032, 11.168765, 12.168070, 13.167693, 14.167488,
    15.167379,
];

/// Variance of a single log2 distance, indexed by `L` (same source).
pub const VARIANCE: [f64; 17] = [
    0.0, 0.690, 1.338, 1.901, 2.358, 2.705, 2.954, 3.125, 3.238, 3.311, 3.356, 3.384, 3.401,
    3.410, 3.416, 3.419, 3.421,
];

/// Minimum bits before `finalize`, indexed by `L`: warm-up plus
/// `1000 * 2^L` test blocks.
pub const MIN_BITS: [u64; 17] = {
    let mut table = [0u64; 17];
    let mut l = 1;
    while l <= 16 {
        table[l] = 1010 * (1u64 << l) * l as u64;
        l += 1;
    }
    table
};

/// Scales `sqrt(variance / K)`; receives `L` and the number of test
/// blocks `K`.
pub type CoefficientFn = fn(block_bits: u32, test_blocks: u64) -> f64;

/// Maurer's original test: no correction.
pub fn maurer_coefficient(_block_bits: u32, _test_blocks: u64) -> f64 {
    1.0
}

/// Coron and Naccache: `c(L, K) = 0.7 - 0.8/L + (4 + 32/L) K^(-3/L) / 15`.
pub fn coron_coefficient(block_bits: u32, test_blocks: u64) -> f64 {
    let l = f64::from(block_bits);
    let k = test_blocks as f64;
    0.7 - 0.8 / l + (4.0 + 32.0 / l) * k.powf(-3.0 / l) / 15.0
}

/// Parameters of the universal engine.
#[derive(Debug, Clone)]
pub struct UniversalParams {
    pub descriptor: &'static TestDescriptor,
    /// Block length `L`, 6..=16.
    pub block_bits: u32,
    pub coefficient: CoefficientFn,
    pub alpha: f64,
}

impl UniversalParams {
    pub fn custom(block_bits: u32, coefficient: CoefficientFn) -> Self {
        Self {
            descriptor: &UNIVERSAL_CUSTOM,
            block_bits,
            coefficient,
            alpha: DEFAULT_ALPHA,
        }
    }

    pub fn maurer(block_bits: u32) -> Self {
        Self {
            descriptor: &MAURER,
            ..Self::custom(block_bits, maurer_coefficient)
        }
    }

    pub fn coron(block_bits: u32) -> Self {
        Self {
            descriptor: &CORON,
            ..Self::custom(block_bits, coron_coefficient)
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Warm-up blocks `Q`.
    pub fn warmup_blocks(&self) -> u64 {
        10 << self.block_bits
    }

    pub fn min_bits(&self) -> u64 {
        MIN_BITS
            .get(self.block_bits as usize)
            .copied()
            .unwrap_or(u64::MAX)
    }

    /// Check every parameter. Pure; allocates nothing.
    pub fn validate(&self) -> Result<()> {
        validate_alpha(self.alpha)?;
        if !(MIN_BLOCK_BITS..=MAX_BLOCK_BITS).contains(&self.block_bits) {
            return Err(TestError::invalid(format!(
                "block length {} outside {MIN_BLOCK_BITS}..={MAX_BLOCK_BITS}",
                self.block_bits
            )));
        }
        Ok(())
    }
}

/// Last-occurrence table and log-distance accumulator.
#[derive(Debug, Clone)]
struct Occurrences {
    last_seen: Vec<u64>,
    blocks: u64,
    warmup: u64,
    log_sum: f64,
}

impl Occurrences {
    fn push_block(&mut self, block: u32) {
        let slot = &mut self.last_seen[block as usize];
        if self.blocks >= self.warmup {
            // A never-seen pattern has `last = 0`, i.e. distance K + 1.
            self.log_sum += ((self.blocks + 1 - *slot) as f64).log2();
        }
        self.blocks += 1;
        *slot = self.blocks;
    }
}

/// Universal engine state.
#[derive(Debug, Clone)]
pub struct UniversalEngine {
    params: UniversalParams,
    carry: UnitCarry,
    occurrences: Occurrences,
    bits_seen: u64,
}

impl UniversalEngine {
    /// Blocks processed so far, warm-up included.
    pub fn blocks(&self) -> u64 {
        self.occurrences.blocks
    }

    /// Blocks that contributed to the statistic.
    pub fn test_blocks(&self) -> u64 {
        self.occurrences
            .blocks
            .saturating_sub(self.occurrences.warmup)
    }

    /// Accumulated log2 distance over the test blocks.
    pub fn log_sum(&self) -> f64 {
        self.occurrences.log_sum
    }

    /// Block index of the last occurrence of `pattern` (0 = never seen).
    pub fn last_seen(&self, pattern: u32) -> Option<u64> {
        self.occurrences.last_seen.get(pattern as usize).copied()
    }

    pub fn params(&self) -> &UniversalParams {
        &self.params
    }
}

impl TestEngine for UniversalEngine {
    type Params = UniversalParams;

    fn init(params: &UniversalParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params: params.clone(),
            carry: UnitCarry::new(params.block_bits),
            occurrences: Occurrences {
                last_seen: try_zeroed(1usize << params.block_bits)?,
                blocks: 0,
                warmup: params.warmup_blocks(),
                log_sum: 0.0,
            },
            bits_seen: 0,
        })
    }

    fn descriptor(&self) -> &'static TestDescriptor {
        self.params.descriptor
    }

    fn update(&mut self, data: &[u8], nbits: usize) {
        self.bits_seen += nbits as u64;
        let occurrences = &mut self.occurrences;
        self.carry.feed(data, nbits, |block| {
            occurrences.push_block(block);
            ControlFlow::Continue(())
        });
    }

    fn finalize(&mut self) -> Result<TestResult> {
        let l = self.params.block_bits;
        let block_bits_seen = self.occurrences.blocks * u64::from(l);
        if block_bits_seen < self.params.min_bits() {
            return Err(TestError::InsufficientData {
                needed: self.params.min_bits(),
                got: block_bits_seen,
                unit: "bits",
            });
        }
        let k = self.test_blocks();
        let fn_val = self.occurrences.log_sum / k as f64;
        let c = (self.params.coefficient)(l, k);
        let variance = VARIANCE[l as usize];
        if !(c.is_finite() && c > 0.0) || variance <= 0.0 {
            return Err(TestError::DomainError(format!(
                "degenerate deviation: c={c}, variance={variance}"
            )));
        }
        let expected = EXPECTED_VALUE[l as usize];
        let sigma = c * (variance / k as f64).sqrt();
        let z = finite("universal statistic", (fn_val - expected) / (sigma * SQRT_2))?;
        let p = erfc(z.abs());
        Ok(TestResult::from_p(
            self.params.descriptor.name,
            p,
            self.params.alpha,
            z * SQRT_2,
            u64::from(self.carry.pending_bits()),
        )
        .with_statistic2(fn_val)
        .with_details(format!(
            "fn={fn_val:.6}, expected={expected:.6}, L={l}, K={k}, c={c:.6}"
        )))
    }

    fn bits_seen(&self) -> u64 {
        self.bits_seen
    }
}

//! Binary-matrix rank engine.
//!
//! Builds successive `M x Q` matrices over GF(2) from the stream, computes
//! each matrix's rank by Gaussian elimination, and classifies it as full
//! rank, full rank minus one, or lower. `finalize` runs a chi-square test
//! with two degrees of freedom against the exact rank distribution for the
//! shape.
//!
//! Rows are `Q`-bit values; column 0 is the row's first stream bit (its most
//! significant bit).

use std::ops::ControlFlow;

use log::trace;

use crate::bits::mask32;
use crate::carry::UnitCarry;
use crate::context::{TestDescriptor, TestEngine};
use crate::error::{Result, TestError, try_zeroed};
use crate::result::{TestResult, finite, validate_alpha};
use crate::DEFAULT_ALPHA;

pub static NIST_RANK: TestDescriptor = TestDescriptor {
    name: "nist-rank",
    description: "Rank of 32x32 matrices filled bit by bit from the stream",
    version: "1.0.0",
    alignment: 1,
};

pub static RANK_32X32: TestDescriptor = TestDescriptor {
    name: "rank-32x32",
    description: "Rank of 32x32 matrices, one 32-bit stroke per row",
    version: "1.0.0",
    alignment: 8,
};

pub static RANK_31X31: TestDescriptor = TestDescriptor {
    name: "rank-31x31",
    description: "Rank of 31x31 matrices, leftmost 31 bits of each stroke",
    version: "1.0.0",
    alignment: 8,
};

pub static RANK_6X8: TestDescriptor = TestDescriptor {
    name: "rank-6x8",
    description: "Rank of 6x8 matrices, one byte of each stroke per row",
    version: "1.0.0",
    alignment: 8,
};

pub static MATRIX_CUSTOM_BITS: TestDescriptor = TestDescriptor {
    name: "binary-matrix-rank",
    description: "Rank of MxQ matrices filled bit by bit from the stream",
    version: "1.0.0",
    alignment: 1,
};

pub static MATRIX_CUSTOM_WORDS: TestDescriptor = TestDescriptor {
    name: "binary-matrix-rank-words",
    description: "Rank of MxQ matrices, Q bits of each 32-bit stroke per row",
    version: "1.0.0",
    alignment: 8,
};

/// Largest supported row count.
pub const MAX_ROWS: u32 = 64;

/// NIST SP 800-22 minimum: with 38 matrices the smallest 32x32 class
/// expects just over five.
pub const NIST_MIN_MATRICES: u64 = 38;

/// 6x8 matrices land below rank 5 with probability ~0.0094, so 600 keeps
/// every class above five expected.
const RANK_6X8_MIN_MATRICES: u64 = 600;

/// How rows are cut from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFeed {
    /// Each row is the next `Q` stream bits.
    Bits,
    /// Each row is `Q` bits at `bit_offset` of the next 32-bit big-endian
    /// stroke; the stroke's other bits are skipped.
    Words { bit_offset: u32 },
}

/// Parameters of the binary-matrix rank engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixParams {
    pub descriptor: &'static TestDescriptor,
    /// Rows `M`.
    pub rows: u32,
    /// Columns `Q`, at most 32.
    pub cols: u32,
    pub feed: RowFeed,
    /// Matrices required before `finalize` succeeds.
    pub min_matrices: u64,
    pub alpha: f64,
}

impl MatrixParams {
    pub fn custom(rows: u32, cols: u32, feed: RowFeed, min_matrices: u64) -> Self {
        let descriptor = match feed {
            RowFeed::Bits => &MATRIX_CUSTOM_BITS,
            RowFeed::Words { .. } => &MATRIX_CUSTOM_WORDS,
        };
        Self {
            descriptor,
            rows,
            cols,
            feed,
            min_matrices,
            alpha: DEFAULT_ALPHA,
        }
    }

    /// NIST SP 800-22 rank test: 32x32, bit by bit.
    pub fn nist() -> Self {
        Self {
            descriptor: &NIST_RANK,
            ..Self::custom(32, 32, RowFeed::Bits, NIST_MIN_MATRICES)
        }
    }

    pub fn rank_32x32() -> Self {
        Self {
            descriptor: &RANK_32X32,
            ..Self::custom(32, 32, RowFeed::Words { bit_offset: 0 }, NIST_MIN_MATRICES)
        }
    }

    pub fn rank_31x31() -> Self {
        Self {
            descriptor: &RANK_31X31,
            ..Self::custom(31, 31, RowFeed::Words { bit_offset: 0 }, NIST_MIN_MATRICES)
        }
    }

    /// 6x8 matrices from byte `byte_offset` (0..=3) of each stroke.
    pub fn rank_6x8(byte_offset: u32) -> Self {
        let feed = RowFeed::Words {
            bit_offset: byte_offset.saturating_mul(8),
        };
        Self {
            descriptor: &RANK_6X8,
            ..Self::custom(6, 8, feed, RANK_6X8_MIN_MATRICES)
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Check every parameter. Pure; allocates nothing.
    pub fn validate(&self) -> Result<()> {
        validate_alpha(self.alpha)?;
        if !(1..=MAX_ROWS).contains(&self.rows) {
            return Err(TestError::invalid(format!(
                "row count {} outside 1..={MAX_ROWS}",
                self.rows
            )));
        }
        if !(1..=32).contains(&self.cols) {
            return Err(TestError::invalid(format!(
                "column count {} outside 1..=32",
                self.cols
            )));
        }
        if let RowFeed::Words { bit_offset } = self.feed {
            if bit_offset.saturating_add(self.cols) > 32 {
                return Err(TestError::invalid(format!(
                    "{} columns at bit offset {bit_offset} do not fit a 32-bit stroke",
                    self.cols
                )));
            }
        }
        if self.min_matrices == 0 {
            return Err(TestError::invalid("min_matrices must be positive"));
        }
        Ok(())
    }
}

/// Rank of a binary matrix over GF(2).
///
/// `rows` holds one `cols`-bit row per element and is reduced in place.
pub fn gf2_rank(rows: &mut [u32], cols: u32) -> u32 {
    let m = rows.len();
    let mut h = 0usize;
    for c in 0..cols {
        if h >= m {
            break;
        }
        let bit = 1u32 << (cols - 1 - c);
        let Some(pivot) = (h..m).find(|&r| rows[r] & bit != 0) else {
            continue;
        };
        rows.swap(h, pivot);
        let pivot_row = rows[h];
        for (r, row) in rows.iter_mut().enumerate() {
            if r != h && *row & bit != 0 {
                *row ^= pivot_row;
            }
        }
        h += 1;
    }
    h as u32
}

/// `P(rank = j)` for `j = 0..=min(M, Q)` of a uniformly random `M x Q`
/// matrix over GF(2).
pub fn rank_distribution(rows: u32, cols: u32) -> Vec<f64> {
    let (m, q) = (i32::try_from(rows).unwrap_or(i32::MAX), i32::try_from(cols).unwrap_or(i32::MAX));
    (0..=m.min(q))
        .map(|r| {
            let mut p = 2f64.powi(r * (q + m - r) - m * q);
            for i in 0..r {
                p *= (1.0 - 2f64.powi(i - q)) * (1.0 - 2f64.powi(i - m))
                    / (1.0 - 2f64.powi(i - r));
            }
            p
        })
        .collect()
}

/// Probabilities of the three rank classes: full, full minus one, lower.
pub fn rank_class_probabilities(rows: u32, cols: u32) -> [f64; 3] {
    let dist = rank_distribution(rows, cols);
    let full = dist.last().copied().unwrap_or(0.0);
    let deficient = if dist.len() >= 2 {
        dist[dist.len() - 2]
    } else {
        0.0
    };
    let lower = dist[..dist.len().saturating_sub(2)].iter().sum();
    [full, deficient, lower]
}

/// Observed rank-class counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankCounts {
    pub full: u64,
    pub deficient_one: u64,
    pub lower: u64,
}

impl RankCounts {
    fn as_array(&self) -> [u64; 3] {
        [self.full, self.deficient_one, self.lower]
    }
}

/// The matrix being filled and the elimination scratch space, one
/// allocation split once at construction.
#[derive(Debug, Clone)]
struct MatrixArena {
    buf: Vec<u32>,
    rows: usize,
}

impl MatrixArena {
    fn new(rows: usize) -> Result<Self> {
        Ok(Self {
            buf: try_zeroed(rows * 2)?,
            rows,
        })
    }

    /// `(pending rows, scratch)`.
    fn split(&mut self) -> (&mut [u32], &mut [u32]) {
        self.buf.split_at_mut(self.rows)
    }
}

/// Matrix assembly and rank classification.
#[derive(Debug, Clone)]
struct Assembler {
    arena: MatrixArena,
    cols: u32,
    full_rank: u32,
    filled: usize,
    counts: RankCounts,
    matrices: u64,
}

impl Assembler {
    fn push_row(&mut self, row: u32) {
        let (pending, scratch) = self.arena.split();
        pending[self.filled] = row;
        self.filled += 1;
        if self.filled < pending.len() {
            return;
        }
        scratch.copy_from_slice(pending);
        let rank = gf2_rank(scratch, self.cols);
        match self.full_rank - rank {
            0 => self.counts.full += 1,
            1 => self.counts.deficient_one += 1,
            _ => self.counts.lower += 1,
        }
        self.matrices += 1;
        self.filled = 0;
        trace!("matrix {} rank {rank}", self.matrices);
    }
}

/// Binary-matrix rank engine state.
#[derive(Debug, Clone)]
pub struct BinaryMatrixRank {
    params: MatrixParams,
    carry: UnitCarry,
    assembler: Assembler,
    classes: [f64; 3],
    row_shift: u32,
    row_mask: u32,
    bits_seen: u64,
}

impl BinaryMatrixRank {
    pub fn counts(&self) -> RankCounts {
        self.assembler.counts
    }

    pub fn matrices(&self) -> u64 {
        self.assembler.matrices
    }

    /// Expected probabilities of the full, full-minus-one and lower classes.
    pub fn class_probabilities(&self) -> [f64; 3] {
        self.classes
    }

    pub fn params(&self) -> &MatrixParams {
        &self.params
    }
}

impl TestEngine for BinaryMatrixRank {
    type Params = MatrixParams;

    fn init(params: &MatrixParams) -> Result<Self> {
        params.validate()?;
        let (unit, row_shift) = match params.feed {
            RowFeed::Bits => (params.cols, 0),
            RowFeed::Words { bit_offset } => (32, 32 - bit_offset - params.cols),
        };
        Ok(Self {
            params: params.clone(),
            carry: UnitCarry::new(unit),
            assembler: Assembler {
                arena: MatrixArena::new(params.rows as usize)?,
                cols: params.cols,
                full_rank: params.rows.min(params.cols),
                filled: 0,
                counts: RankCounts::default(),
                matrices: 0,
            },
            classes: rank_class_probabilities(params.rows, params.cols),
            row_shift,
            row_mask: mask32(params.cols),
            bits_seen: 0,
        })
    }

    fn descriptor(&self) -> &'static TestDescriptor {
        self.params.descriptor
    }

    fn update(&mut self, data: &[u8], nbits: usize) {
        self.bits_seen += nbits as u64;
        let (shift, mask) = (self.row_shift, self.row_mask);
        let assembler = &mut self.assembler;
        self.carry.feed(data, nbits, |unit| {
            assembler.push_row((unit >> shift) & mask);
            ControlFlow::Continue(())
        });
    }

    fn finalize(&mut self) -> Result<TestResult> {
        let n = self.assembler.matrices;
        if n < self.params.min_matrices {
            return Err(TestError::InsufficientData {
                needed: self.params.min_matrices,
                got: n,
                unit: "matrices",
            });
        }
        let observed = self.assembler.counts.as_array();
        let mut chi2 = 0.0;
        for (&obs, &p) in observed.iter().zip(self.classes.iter()) {
            let expected = n as f64 * p;
            if expected <= 0.0 {
                return Err(TestError::DomainError(format!(
                    "rank class with zero expected count for {}x{}",
                    self.params.rows, self.params.cols
                )));
            }
            let diff = obs as f64 - expected;
            chi2 += diff * diff / expected;
        }
        let chi2 = finite("rank chi-square", chi2)?;
        // Chi-square survival function with two degrees of freedom.
        let p = (-chi2 / 2.0).exp();
        let discarded = u64::from(self.carry.pending_bits())
            + self.assembler.filled as u64 * u64::from(self.carry.width());
        let counts = self.assembler.counts;
        Ok(TestResult::from_p(
            self.params.descriptor.name,
            p,
            self.params.alpha,
            chi2,
            discarded,
        )
        .with_statistic2(n as f64)
        .with_details(format!(
            "N={n}, {}x{}, full={}, full-1={}, lower={}",
            self.params.rows, self.params.cols, counts.full, counts.deficient_one, counts.lower
        )))
    }

    fn bits_seen(&self) -> u64 {
        self.bits_seen
    }
}

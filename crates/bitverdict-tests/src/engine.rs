//! Run-time engine selection.
//!
//! [`AnyEngine`] is the closed set of engines behind one [`TestEngine`]
//! implementation, so a single `TestContext<AnyEngine>` can run any preset
//! chosen by name.

use crate::context::{TestDescriptor, TestEngine};
use crate::error::Result;
use crate::matrix::{BinaryMatrixRank, MatrixParams};
use crate::result::TestResult;
use crate::sparse::{SparseOccupancy, SparseParams};
use crate::universal::{UniversalEngine, UniversalParams};

/// Parameters for any engine.
#[derive(Debug, Clone)]
pub enum EngineParams {
    Sparse(SparseParams),
    Matrix(MatrixParams),
    Universal(UniversalParams),
}

impl EngineParams {
    pub fn descriptor(&self) -> &'static TestDescriptor {
        match self {
            Self::Sparse(p) => p.descriptor,
            Self::Matrix(p) => p.descriptor,
            Self::Universal(p) => p.descriptor,
        }
    }

    pub fn alpha(&self) -> f64 {
        match self {
            Self::Sparse(p) => p.alpha,
            Self::Matrix(p) => p.alpha,
            Self::Universal(p) => p.alpha,
        }
    }

    pub fn with_alpha(self, alpha: f64) -> Self {
        match self {
            Self::Sparse(p) => Self::Sparse(p.with_alpha(alpha)),
            Self::Matrix(p) => Self::Matrix(p.with_alpha(alpha)),
            Self::Universal(p) => Self::Universal(p.with_alpha(alpha)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Sparse(p) => p.validate(),
            Self::Matrix(p) => p.validate(),
            Self::Universal(p) => p.validate(),
        }
    }
}

impl From<SparseParams> for EngineParams {
    fn from(p: SparseParams) -> Self {
        Self::Sparse(p)
    }
}

impl From<MatrixParams> for EngineParams {
    fn from(p: MatrixParams) -> Self {
        Self::Matrix(p)
    }
}

impl From<UniversalParams> for EngineParams {
    fn from(p: UniversalParams) -> Self {
        Self::Universal(p)
    }
}

/// Any engine, selected at run time.
#[derive(Debug, Clone)]
pub enum AnyEngine {
    Sparse(SparseOccupancy),
    Matrix(BinaryMatrixRank),
    Universal(UniversalEngine),
}

impl TestEngine for AnyEngine {
    type Params = EngineParams;

    fn init(params: &EngineParams) -> Result<Self> {
        Ok(match params {
            EngineParams::Sparse(p) => Self::Sparse(SparseOccupancy::init(p)?),
            EngineParams::Matrix(p) => Self::Matrix(BinaryMatrixRank::init(p)?),
            EngineParams::Universal(p) => Self::Universal(UniversalEngine::init(p)?),
        })
    }

    fn descriptor(&self) -> &'static TestDescriptor {
        match self {
            Self::Sparse(e) => e.descriptor(),
            Self::Matrix(e) => e.descriptor(),
            Self::Universal(e) => e.descriptor(),
        }
    }

    fn update(&mut self, data: &[u8], nbits: usize) {
        match self {
            Self::Sparse(e) => e.update(data, nbits),
            Self::Matrix(e) => e.update(data, nbits),
            Self::Universal(e) => e.update(data, nbits),
        }
    }

    fn finalize(&mut self) -> Result<TestResult> {
        match self {
            Self::Sparse(e) => e.finalize(),
            Self::Matrix(e) => e.finalize(),
            Self::Universal(e) => e.finalize(),
        }
    }

    fn bits_seen(&self) -> u64 {
        match self {
            Self::Sparse(e) => e.bits_seen(),
            Self::Matrix(e) => e.bits_seen(),
            Self::Universal(e) => e.bits_seen(),
        }
    }
}

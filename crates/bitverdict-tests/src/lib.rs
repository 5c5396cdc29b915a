//! # bitverdict-tests
//!
//! Streaming randomness tests that feed on arbitrary bit runs and commit a
//! p-value verdict once enough structure has been seen.
//!
//! ## Quick Start
//!
//! ```
//! use bitverdict_tests::{MatrixParams, TestContext, BinaryMatrixRank};
//!
//! let mut ctx = TestContext::<BinaryMatrixRank>::with_params(&MatrixParams::nist()).unwrap();
//! let data: Vec<u8> = (0..5000u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
//! for chunk in data.chunks(333) {
//!     ctx.update(chunk, chunk.len() * 8).unwrap();
//! }
//! let result = ctx.finalize().unwrap();
//! println!("{}: p={:.4} ({})", result.name, result.p_value, result.status);
//! ```
//!
//! ## Engines
//!
//! - [`SparseOccupancy`]: Marsaglia's monkey tests (OPSO, OQSO, OTSO, DNA).
//!   Counts overlapping words that never occur.
//! - [`BinaryMatrixRank`]: GF(2) rank of successive binary matrices, with a
//!   chi-square over the full / full-1 / lower rank classes.
//! - [`UniversalEngine`]: Maurer's universal statistical test, optionally
//!   with Coron's variance correction.
//!
//! All three carry partial structural units across `update` calls, so the
//! verdict does not depend on how the stream is chunked.
//!
//! [`TestContext`] enforces the life-cycle `init -> update* -> finalize`.
//! [`registry::resolve`] turns a preset name into parameters for
//! [`AnyEngine`].

pub mod bits;
pub mod carry;
pub mod context;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod registry;
pub mod result;
pub mod sparse;
pub mod universal;

pub use context::{ContextState, TestContext, TestDescriptor, TestEngine};
pub use engine::{AnyEngine, EngineParams};
pub use error::{Result, TestError};
pub use matrix::{BinaryMatrixRank, MatrixParams, RowFeed, gf2_rank};
pub use registry::{PresetOptions, presets, resolve};
pub use result::{Status, TestResult};
pub use sparse::{SparseOccupancy, SparseParams};
pub use universal::{CoefficientFn, UniversalEngine, UniversalParams, coron_coefficient, maurer_coefficient};

/// Default significance level.
pub const DEFAULT_ALPHA: f64 = 0.01;

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

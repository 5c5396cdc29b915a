//! Named presets.
//!
//! Maps the stable names used on the command line and in battery plans to
//! ready-to-run [`EngineParams`].

use crate::context::TestDescriptor;
use crate::engine::EngineParams;
use crate::error::{Result, TestError};
use crate::matrix::{self, MatrixParams};
use crate::sparse::{self, SparseParams};
use crate::universal::{self, UniversalParams};

/// Block length used by the universal presets. The smallest table entry
/// keeps the minimum input under 50 KiB.
pub const UNIVERSAL_PRESET_BLOCK_BITS: u32 = 6;

/// Tests from the wider batteries that are recognised by name but have no
/// engine here.
pub const UNSUPPORTED: &[&str] = &[
    "monobit",
    "cumulative-sums",
    "longest-run",
    "excursion",
    "template-matching",
    "craps",
    "birthday-spacing",
    "parking-lot",
    "3d-spheres",
    "squeeze",
];

/// A named preset.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub descriptor: &'static TestDescriptor,
    /// Whether the preset reads a selectable byte of each 32-bit stroke.
    pub takes_byte_offset: bool,
}

/// Every preset, in listing order.
pub fn presets() -> Vec<Preset> {
    let fixed = |descriptor: &'static TestDescriptor| Preset {
        descriptor,
        takes_byte_offset: false,
    };
    let offset = |descriptor: &'static TestDescriptor| Preset {
        descriptor,
        takes_byte_offset: true,
    };
    vec![
        fixed(&sparse::OPSO),
        fixed(&sparse::OQSO),
        offset(&sparse::OTSO),
        fixed(&sparse::DNA),
        fixed(&matrix::NIST_RANK),
        fixed(&matrix::RANK_32X32),
        fixed(&matrix::RANK_31X31),
        offset(&matrix::RANK_6X8),
        fixed(&universal::MAURER),
        fixed(&universal::CORON),
    ]
}

/// Per-run overrides applied on top of a preset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PresetOptions {
    pub alpha: Option<f64>,
    /// Byte of each stroke to read (0..=3), for `otso` and `rank-6x8`.
    pub byte_offset: Option<u32>,
}

/// Resolve `name` to validated engine parameters.
///
/// Names of unimplemented tests are `Unsupported`; anything else unknown is
/// `InvalidParameter`.
pub fn resolve(name: &str, options: &PresetOptions) -> Result<EngineParams> {
    let byte_offset = options.byte_offset.unwrap_or(0);
    if byte_offset > 3 {
        return Err(TestError::invalid(format!(
            "byte offset {byte_offset} outside 0..=3"
        )));
    }
    let params: EngineParams = match name {
        "opso" => SparseParams::opso().into(),
        "oqso" => SparseParams::oqso().into(),
        "otso" => SparseParams::otso(byte_offset).into(),
        "dna" => SparseParams::dna().into(),
        "nist-rank" => MatrixParams::nist().into(),
        "rank-32x32" => MatrixParams::rank_32x32().into(),
        "rank-31x31" => MatrixParams::rank_31x31().into(),
        "rank-6x8" => MatrixParams::rank_6x8(byte_offset).into(),
        "maurer-universal" => UniversalParams::maurer(UNIVERSAL_PRESET_BLOCK_BITS).into(),
        "coron-universal" => UniversalParams::coron(UNIVERSAL_PRESET_BLOCK_BITS).into(),
        other if UNSUPPORTED.contains(&other) => {
            return Err(TestError::Unsupported(other.to_string()));
        }
        other => return Err(TestError::invalid(format!("unknown test `{other}`"))),
    };
    if options.byte_offset.is_some() && !takes_byte_offset(name) {
        return Err(TestError::invalid(format!(
            "`{name}` does not take a byte offset"
        )));
    }
    let params = match options.alpha {
        Some(alpha) => params.with_alpha(alpha),
        None => params,
    };
    params.validate()?;
    Ok(params)
}

fn takes_byte_offset(name: &str) -> bool {
    presets()
        .iter()
        .any(|p| p.descriptor.name == name && p.takes_byte_offset)
}

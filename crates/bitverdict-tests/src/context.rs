//! Test life-cycle contract.
//!
//! Every engine implements [`TestEngine`]. A [`TestContext`] wraps one engine
//! and enforces the life-cycle:
//!
//! ```text
//! Uninitialized --init--> Initialized --finalize--> Finalized
//!       ^                   |    ^  |                   |
//!       |                   |    +--+ update /          |
//!       |                   |         InsufficientData  |
//!       +------free---------+---------------------------+
//! ```
//!
//! A `DomainError` from `finalize` moves the context to `Error`; from there
//! only `free` and `restart` are accepted.

use log::debug;

use crate::error::{Result, TestError};
use crate::result::TestResult;

/// Static metadata for one test (engine plus preset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestDescriptor {
    /// Stable identifier (e.g. `"opso"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// Semantic version of the test implementation.
    pub version: &'static str,
    /// `update` bit counts must be a multiple of this.
    pub alignment: u32,
}

/// Life-cycle state of a [`TestContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Initialized,
    Finalized,
    Error,
}

impl std::fmt::Display for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initialized => write!(f, "initialized"),
            Self::Finalized => write!(f, "finalized"),
            Self::Error => write!(f, "in error"),
        }
    }
}

/// Trait that every test engine must implement.
///
/// Engines own their private buffers. The context has already checked state,
/// buffer length and alignment by the time `update` runs, so `update` cannot
/// fail.
pub trait TestEngine: Sized {
    /// Parameter struct accepted by [`TestEngine::init`].
    type Params: Clone + std::fmt::Debug;

    /// Validate `params`, then allocate. Validation must happen before any
    /// allocation.
    fn init(params: &Self::Params) -> Result<Self>;

    /// Static metadata for the configured test.
    fn descriptor(&self) -> &'static TestDescriptor;

    /// Bit counts passed to `update` must be a multiple of this.
    fn alignment(&self) -> u32 {
        self.descriptor().alignment
    }

    /// Consume the first `nbits` bits of `data`.
    fn update(&mut self, data: &[u8], nbits: usize);

    /// Compute the verdict, or report `InsufficientData`.
    fn finalize(&mut self) -> Result<TestResult>;

    /// Total bits handed to `update` so far.
    fn bits_seen(&self) -> u64;
}

/// Exclusively-owned state of one test trial.
#[derive(Debug)]
pub struct TestContext<E: TestEngine> {
    state: ContextState,
    engine: Option<E>,
    result: Option<TestResult>,
}

impl<E: TestEngine> Default for TestContext<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: TestEngine> TestContext<E> {
    /// An uninitialized context.
    pub fn new() -> Self {
        Self {
            state: ContextState::Uninitialized,
            engine: None,
            result: None,
        }
    }

    /// Convenience: `new` followed by `init`.
    pub fn with_params(params: &E::Params) -> Result<Self> {
        let mut ctx = Self::new();
        ctx.init(params)?;
        Ok(ctx)
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// The committed result, present only once finalized.
    pub fn result(&self) -> Option<&TestResult> {
        self.result.as_ref()
    }

    /// The engine, for inspection of its running state.
    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Descriptor of the active engine.
    pub fn descriptor(&self) -> Option<&'static TestDescriptor> {
        self.engine.as_ref().map(|e| e.descriptor())
    }

    /// Validate parameters and allocate the engine.
    ///
    /// Only allowed from `Uninitialized`. On any failure the context stays
    /// `Uninitialized`, so the caller may retry.
    pub fn init(&mut self, params: &E::Params) -> Result<()> {
        self.expect_state("init", ContextState::Uninitialized)?;
        let engine = E::init(params)?;
        debug!(
            "init {} v{}: {:?}",
            engine.descriptor().name,
            engine.descriptor().version,
            params
        );
        self.engine = Some(engine);
        self.result = None;
        self.state = ContextState::Initialized;
        Ok(())
    }

    /// Feed the first `nbits` bits of `data`.
    ///
    /// `nbits` must fit in `data` and be a multiple of the engine's
    /// alignment. Zero bits is a no-op.
    pub fn update(&mut self, data: &[u8], nbits: usize) -> Result<()> {
        self.expect_state("update", ContextState::Initialized)?;
        let state = self.state;
        let Some(engine) = self.engine.as_mut() else {
            return Err(TestError::ProtocolViolation { op: "update", state });
        };
        if nbits > data.len().saturating_mul(8) {
            return Err(TestError::invalid(format!(
                "nbits {nbits} exceeds buffer of {} bytes",
                data.len()
            )));
        }
        let alignment = engine.alignment() as usize;
        if nbits % alignment != 0 {
            return Err(TestError::invalid(format!(
                "{}: nbits {nbits} is not a multiple of {alignment}",
                engine.descriptor().name
            )));
        }
        if nbits > 0 {
            engine.update(data, nbits);
        }
        Ok(())
    }

    /// Compute statistics and commit the result.
    ///
    /// `InsufficientData` leaves the context `Initialized`; a numeric domain
    /// error moves it to `Error`.
    pub fn finalize(&mut self) -> Result<&TestResult> {
        self.expect_state("finalize", ContextState::Initialized)?;
        let state = self.state;
        let Some(engine) = self.engine.as_mut() else {
            return Err(TestError::ProtocolViolation { op: "finalize", state });
        };
        match engine.finalize() {
            Ok(result) => {
                debug!(
                    "finalize {}: {} p={:.6} after {} bits",
                    result.name,
                    result.status,
                    result.p_value,
                    engine.bits_seen()
                );
                self.state = ContextState::Finalized;
                Ok(self.result.insert(result))
            }
            Err(err @ TestError::DomainError(_)) => {
                debug!("finalize {}: {err}", engine.descriptor().name);
                self.state = ContextState::Error;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Convenience: `update` then `finalize`.
    pub fn test(&mut self, data: &[u8], nbits: usize) -> Result<&TestResult> {
        self.update(data, nbits)?;
        self.finalize()
    }

    /// Convenience: `free` then `init`, for repeated independent trials.
    pub fn restart(&mut self, params: &E::Params) -> Result<()> {
        if let Some(engine) = &self.engine {
            debug!("restart {}", engine.descriptor().name);
        }
        self.free();
        self.init(params)
    }

    /// Release the engine. Abandons an unfinished trial; no-op when
    /// already uninitialized.
    pub fn free(&mut self) {
        self.engine = None;
        self.result = None;
        self.state = ContextState::Uninitialized;
    }

    fn expect_state(&self, op: &'static str, want: ContextState) -> Result<()> {
        if self.state == want {
            Ok(())
        } else {
            Err(self.violation(op))
        }
    }

    fn violation(&self, op: &'static str) -> TestError {
        TestError::ProtocolViolation {
            op,
            state: self.state,
        }
    }
}

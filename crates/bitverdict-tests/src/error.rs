//! Error taxonomy shared by every engine.
//!
//! Parameter errors are local and leave the context untouched. Protocol
//! violations mean the caller invoked an operation in the wrong life-cycle
//! state. [`TestError::InsufficientData`] is the one retryable outcome: feed
//! more bits and call `finalize` again.

use thiserror::Error;

use crate::context::ContextState;

/// Errors surfaced by test contexts and engines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TestError {
    /// A parameter is out of range or inconsistent. Nothing was allocated.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An operation was called in a state that does not allow it.
    #[error("`{op}` is not allowed while the context is {state}")]
    ProtocolViolation {
        op: &'static str,
        state: ContextState,
    },

    /// The engine's private buffer could not be allocated.
    #[error("out of memory: could not allocate {bytes} bytes")]
    OutOfMemory { bytes: usize },

    /// The structural minimum has not been reached yet.
    #[error("insufficient data: need {needed} {unit}, got {got}")]
    InsufficientData {
        needed: u64,
        got: u64,
        unit: &'static str,
    },

    /// The requested test exists in the catalogue but has no engine.
    #[error("unsupported test: {0}")]
    Unsupported(String),

    /// The statistic is undefined for this input (zero variance, zero
    /// expected count, ...).
    #[error("numeric domain error: {0}")]
    DomainError(String),
}

impl TestError {
    /// Whether the caller should feed more data and retry `finalize`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, TestError>;

/// Allocate a zero-filled vector, reporting failure instead of aborting.
pub(crate) fn try_zeroed<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| TestError::OutOfMemory {
        bytes: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    v.resize(len, T::default());
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_insufficient_data_is_retryable() {
        let insufficient = TestError::InsufficientData {
            needed: 10,
            got: 3,
            unit: "bits",
        };
        assert!(insufficient.is_retryable());
        assert!(!TestError::invalid("x").is_retryable());
        assert!(!TestError::DomainError("zero variance".into()).is_retryable());
        assert!(!TestError::OutOfMemory { bytes: 1 }.is_retryable());
    }

    #[test]
    fn display_mentions_state() {
        let err = TestError::ProtocolViolation {
            op: "update",
            state: ContextState::Finalized,
        };
        assert_eq!(
            err.to_string(),
            "`update` is not allowed while the context is finalized"
        );
    }

    #[test]
    fn try_zeroed_allocates_requested_length() {
        let v: Vec<u64> = try_zeroed(17).unwrap();
        assert_eq!(v.len(), 17);
        assert!(v.iter().all(|&x| x == 0));
    }

    #[test]
    fn try_zeroed_reports_impossible_sizes() {
        let err = try_zeroed::<u64>(usize::MAX).unwrap_err();
        assert!(matches!(err, TestError::OutOfMemory { .. }));
    }
}

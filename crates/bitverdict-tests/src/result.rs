//! Result record written by `finalize`.

use serde::Serialize;

use crate::error::{Result, TestError};

/// Verdict of a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a single randomness test trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub name: &'static str,
    pub status: Status,
    /// Trailing bits that were read but never completed a structural unit,
    /// plus any bits supplied after the engine stopped consuming.
    pub discarded_bits: u64,
    pub p_value: f64,
    pub p_value2: Option<f64>,
    pub statistic: f64,
    pub statistic2: Option<f64>,
    pub details: String,
    pub grade: char,
}

impl TestResult {
    /// Build a result from a p-value, deciding status against `alpha`.
    pub(crate) fn from_p(
        name: &'static str,
        p_value: f64,
        alpha: f64,
        statistic: f64,
        discarded_bits: u64,
    ) -> Self {
        Self {
            name,
            status: Self::status_from_p(p_value, alpha),
            discarded_bits,
            p_value,
            p_value2: None,
            statistic,
            statistic2: None,
            details: String::new(),
            grade: Self::grade_from_p(Some(p_value)),
        }
    }

    pub(crate) fn with_statistic2(mut self, value: f64) -> Self {
        self.statistic2 = Some(value);
        self
    }

    pub(crate) fn with_details(mut self, details: String) -> Self {
        self.details = details;
        self
    }

    /// Whether the trial passed.
    pub fn passed(&self) -> bool {
        self.status == Status::Passed
    }

    /// Assign a letter grade based on p-value.
    ///
    /// - A: p >= 0.1
    /// - B: p >= 0.01
    /// - C: p >= 0.001
    /// - D: p >= 0.0001
    /// - F: otherwise or None
    pub fn grade_from_p(p: Option<f64>) -> char {
        match p {
            Some(p) if p >= 0.1 => 'A',
            Some(p) if p >= 0.01 => 'B',
            Some(p) if p >= 0.001 => 'C',
            Some(p) if p >= 0.0001 => 'D',
            _ => 'F',
        }
    }

    /// `Failed` iff `p < alpha`.
    pub fn status_from_p(p: f64, alpha: f64) -> Status {
        if p < alpha {
            Status::Failed
        } else {
            Status::Passed
        }
    }
}

/// Significance levels must lie strictly between 0 and 1.
pub(crate) fn validate_alpha(alpha: f64) -> Result<()> {
    if alpha.is_finite() && alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(TestError::invalid(format!(
            "significance level {alpha} outside (0, 1)"
        )))
    }
}

/// Reject a non-finite statistic before it reaches a [`TestResult`].
pub(crate) fn finite(what: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TestError::DomainError(format!(
            "{what} is not finite ({value})"
        )))
    }
}

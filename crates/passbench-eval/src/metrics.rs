//! Outcome taxonomy and pass@1 accuracy over a scored batch.

use serde::{Deserialize, Serialize};

/// Terminal classification of a single scored entry.
///
/// Exactly one outcome per entry; the batch total is the sum of all
/// seven buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Code defined cleanly and every assertion held.
    Pass,
    /// An assertion raised `AssertionError`.
    FailAssert,
    /// An assertion raised something other than `AssertionError`.
    RuntimeError,
    /// The solution itself failed to define (syntax error or a raise at
    /// import time).
    CompileError,
    /// No prediction was supplied for this id.
    MissingCode,
    /// The reference `test_list` could not be decoded.
    ParseFail,
    /// Execution exceeded the per-entry deadline.
    Timeout,
}

impl Outcome {
    /// Canonical label, matching the dataset reporting convention.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::FailAssert => "FAIL_ASSERT",
            Outcome::RuntimeError => "RUNTIME_ERROR",
            Outcome::CompileError => "COMPILE_ERROR",
            Outcome::MissingCode => "MISSING_CODE",
            Outcome::ParseFail => "PARSE_FAIL",
            Outcome::Timeout => "TIMEOUT",
        }
    }
}

/// Per-outcome tallies for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub pass: usize,
    pub fail_assert: usize,
    pub runtime_error: usize,
    pub compile_error: usize,
    pub missing_code: usize,
    pub parse_fail: usize,
    pub timeout: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Pass => self.pass += 1,
            Outcome::FailAssert => self.fail_assert += 1,
            Outcome::RuntimeError => self.runtime_error += 1,
            Outcome::CompileError => self.compile_error += 1,
            Outcome::MissingCode => self.missing_code += 1,
            Outcome::ParseFail => self.parse_fail += 1,
            Outcome::Timeout => self.timeout += 1,
        }
    }

    pub fn get(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Pass => self.pass,
            Outcome::FailAssert => self.fail_assert,
            Outcome::RuntimeError => self.runtime_error,
            Outcome::CompileError => self.compile_error,
            Outcome::MissingCode => self.missing_code,
            Outcome::ParseFail => self.parse_fail,
            Outcome::Timeout => self.timeout,
        }
    }

    pub fn total(&self) -> usize {
        self.pass
            + self.fail_assert
            + self.runtime_error
            + self.compile_error
            + self.missing_code
            + self.parse_fail
            + self.timeout
    }

    pub fn failed(&self) -> usize {
        self.total() - self.pass
    }

    /// Pass@1 accuracy: passed over total, 0.0 for an empty batch.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.pass as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_get() {
        let mut counts = OutcomeCounts::default();
        counts.record(Outcome::Pass);
        counts.record(Outcome::Pass);
        counts.record(Outcome::FailAssert);
        counts.record(Outcome::Timeout);

        assert_eq!(counts.get(Outcome::Pass), 2);
        assert_eq!(counts.get(Outcome::FailAssert), 1);
        assert_eq!(counts.get(Outcome::Timeout), 1);
        assert_eq!(counts.get(Outcome::RuntimeError), 0);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.failed(), 2);
    }

    #[test]
    fn test_accuracy_is_pass_over_total() {
        let mut counts = OutcomeCounts::default();
        for _ in 0..3 {
            counts.record(Outcome::Pass);
        }
        counts.record(Outcome::CompileError);
        assert_eq!(counts.accuracy(), 0.75);
    }

    #[test]
    fn test_accuracy_of_empty_batch_is_zero() {
        assert_eq!(OutcomeCounts::default().accuracy(), 0.0);
    }

    #[test]
    fn test_labels_match_reporting_convention() {
        assert_eq!(Outcome::Pass.label(), "PASS");
        assert_eq!(Outcome::FailAssert.label(), "FAIL_ASSERT");
        assert_eq!(Outcome::RuntimeError.label(), "RUNTIME_ERROR");
        assert_eq!(Outcome::CompileError.label(), "COMPILE_ERROR");
        assert_eq!(Outcome::MissingCode.label(), "MISSING_CODE");
        assert_eq!(Outcome::ParseFail.label(), "PARSE_FAIL");
        assert_eq!(Outcome::Timeout.label(), "TIMEOUT");
    }

    #[test]
    fn test_serialized_form_uses_labels() {
        let json = serde_json::to_string(&Outcome::FailAssert).unwrap();
        assert_eq!(json, "\"FAIL_ASSERT\"");
    }
}

//! Batch scoring loop: classify every merged entry, accumulate counts,
//! render the summary.

use std::path::Path;
use std::time::Instant;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use passbench_core::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::datasets::MergedEntry;
use crate::metrics::{Outcome, OutcomeCounts};
use crate::normalize::strip_code_fences;
use crate::sandbox::ExecutionSandbox;
use crate::testlist::parse_tests;

/// Cells in the rendered accuracy bar.
const BAR_WIDTH: usize = 28;

/// Configuration for a scoring run.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Python interpreter command
    pub python_cmd: String,

    /// Per-step execution deadline (seconds)
    pub timeout_secs: u64,

    /// Number of entries to score (None = all)
    pub max_entries: Option<usize>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            python_cmd: "python3".to_string(),
            timeout_secs: 30,
            max_entries: None,
        }
    }
}

/// Drives the sequential batch loop. Entry outcomes are values; nothing
/// an entry does can abort the batch.
pub struct Evaluator {
    config: EvalConfig,
    sandbox: ExecutionSandbox,
}

/// Classification of a single entry plus whether it was skipped for a
/// blocking sleep call.
struct EntryEval {
    outcome: Outcome,
    slept: bool,
}

impl EntryEval {
    fn outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            slept: false,
        }
    }
}

impl Evaluator {
    pub fn new(config: EvalConfig) -> Self {
        let sandbox = ExecutionSandbox::new()
            .with_timeout(config.timeout_secs)
            .with_python_cmd(config.python_cmd.clone());
        Self { config, sandbox }
    }

    /// Score every entry in order and aggregate the result.
    pub async fn evaluate(&self, entries: &[MergedEntry]) -> ScoreReport {
        let entries = if let Some(max) = self.config.max_entries {
            &entries[..max.min(entries.len())]
        } else {
            entries
        };

        let pb = ProgressBar::new(entries.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );

        let mut counts = OutcomeCounts::default();
        let mut skipped_sleep = 0usize;
        for entry in entries {
            pb.set_message(format!("entry {}", entry.id));
            let start = Instant::now();

            let eval = self.evaluate_entry(entry).await;
            counts.record(eval.outcome);
            if eval.slept {
                skipped_sleep += 1;
            }

            debug!(
                id = entry.id,
                outcome = eval.outcome.label(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "scored entry"
            );
            pb.inc(1);
        }
        pb.finish_with_message("scoring complete");

        ScoreReport {
            accuracy: counts.accuracy(),
            total: counts.total(),
            skipped_sleep,
            counts,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    async fn evaluate_entry(&self, entry: &MergedEntry) -> EntryEval {
        // Absent prediction wins over everything, even a bad test_list.
        let Some(response) = entry.response.as_deref() else {
            return EntryEval::outcome(Outcome::MissingCode);
        };

        let tests = match parse_tests(&entry.test_list_raw) {
            Ok(tests) => tests,
            Err(e) => {
                debug!(id = entry.id, error = %e, "unusable test_list");
                return EntryEval::outcome(Outcome::ParseFail);
            }
        };

        let code = strip_code_fences(response);
        if code.to_lowercase().contains("time.sleep") {
            warn!(id = entry.id, "blocking sleep call, counted as timeout without execution");
            return EntryEval {
                outcome: Outcome::Timeout,
                slept: true,
            };
        }

        match self.sandbox.run_entry(&code, &tests).await {
            Ok(exec) => {
                if let Some(detail) = exec.detail() {
                    debug!(id = entry.id, detail, "entry failed");
                }
                EntryEval::outcome(Outcome::from(&exec))
            }
            Err(e) => {
                warn!(id = entry.id, error = %e, "worker could not be driven");
                EntryEval::outcome(Outcome::RuntimeError)
            }
        }
    }
}

/// Aggregated result of one scoring run.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    /// Pass@1 accuracy (0.0 to 1.0)
    pub accuracy: f64,

    /// Entries scored
    pub total: usize,

    /// Per-outcome tallies
    pub counts: OutcomeCounts,

    /// Entries counted as timeout without execution for a sleep call
    pub skipped_sleep: usize,

    /// RFC3339 timestamp of the run
    pub timestamp: String,
}

impl ScoreReport {
    /// Render the summary block to stdout.
    pub fn print_summary(&self) {
        let pct = self.accuracy * 100.0;
        let filled = ((BAR_WIDTH as f64 * pct / 100.0).round() as usize).min(BAR_WIDTH);
        let bar = format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled));

        println!();
        println!("{}", "Pass@1 Summary".bold());
        println!(
            "{}  {}  {}/{} passed",
            format!("{pct:6.2}%").bold(),
            bar,
            self.counts.pass.to_string().bold(),
            self.total
        );
        println!(
            "{}",
            format!(
                "Failures: {} = Assertion {} | Runtime {} | Compile {} | Missing {} | Parse {} | Timeout {}",
                self.counts.failed(),
                self.counts.fail_assert,
                self.counts.runtime_error,
                self.counts.compile_error,
                self.counts.missing_code,
                self.counts.parse_fail,
                self.counts.timeout,
            )
            .dimmed()
        );
        if self.skipped_sleep > 0 {
            println!(
                "{}",
                format!(
                    "{} entries with sleep calls counted as timeouts without execution",
                    self.skipped_sleep
                )
                .dimmed()
            );
        }
    }

    /// Write the machine-readable accuracy record.
    pub fn save_scores(&self, path: impl AsRef<Path>) -> Result<()> {
        let record = serde_json::json!({ "accuracy": self.accuracy });
        std::fs::write(path, serde_json::to_string_pretty(&record)?)?;
        Ok(())
    }
}

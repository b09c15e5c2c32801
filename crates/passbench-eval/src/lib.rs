//! Pass@1 batch scoring for model-generated Python solutions.
//!
//! Provides:
//! - Loaders for the reference CSV and prediction JSON, joined by id
//! - Fence stripping and test-list decoding
//! - Function-name resolution between assertions and defined code
//! - A deadline-bounded per-entry execution sandbox
//! - Outcome taxonomy, accuracy aggregation, and summary rendering

pub mod datasets;
pub mod eval;
pub mod metrics;
pub mod normalize;
pub mod resolver;
pub mod sandbox;
pub mod testlist;

pub use datasets::{MergedEntry, ProblemRecord};
pub use eval::{EvalConfig, Evaluator, ScoreReport};
pub use metrics::{Outcome, OutcomeCounts};
pub use sandbox::{EntryOutcome, ExecPhase, ExecutionSandbox};
pub use testlist::TestListError;

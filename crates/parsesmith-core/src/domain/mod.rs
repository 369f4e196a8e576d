//! Domain types for ParseSmith.
//!
//! These are the values that flow through one synthesis run: the immutable
//! [`Target`], the tabular [`Dataset`] shared by the reference and the
//! candidate output, the per-attempt records, and the error taxonomy.

pub mod attempt;
pub mod dataset;
pub mod error;
pub mod target;
pub mod verdict;

pub use attempt::{
    AttemptFailure, AttemptOutcome, AttemptRecord, ExecutionFault, ExecutionResult, FaultStage,
};
pub use dataset::{Cell, Dataset, DatasetError, ReferenceDataset};
pub use error::{RunError, SetupFault};
pub use target::Target;
pub use verdict::{CellDiff, MismatchReport, RowCountDelta, ValidationVerdict};

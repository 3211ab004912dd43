//! Inter-device agreement (ICC) analysis for tabular measurement data.
//!
//! The crate splits into a data layer (loading, label parsing, subject
//! filtering) and a statistics layer (variance decomposition, ICC
//! estimation), glued together by a per-feature pipeline that records
//! failures as result rows instead of aborting the run.

pub mod data;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod stats;

pub use data::model::{Dataset, Device, Record, Section};
pub use error::IccError;
pub use pipeline::{merge_results, IccOutcome, IccPipeline, Partition, ResultTable};
pub use stats::icc::{estimate, IccEstimate};
pub use stats::varcomp::{AnovaDecomposer, RemlDecomposer, VarianceComponents, VarianceDecomposer};

//! Statistics layer: variance decomposition and the ICC estimate.
//!
//! ```text
//!   ┌────────────────┐
//!   │ FilteredSubset  │  one feature, complete subjects only
//!   └────────────────┘
//!          │
//!          ▼
//!   ┌────────────────┐
//!   │    varcomp      │  REML / ANOVA fit → VarianceComponents
//!   └────────────────┘
//!          │
//!          ▼
//!   ┌────────────────┐
//!   │      icc        │  ratio + confidence interval → IccEstimate
//!   └────────────────┘
//! ```
//!
//! The fit is behind the `VarianceDecomposer` trait so the pipeline can swap
//! REML for the closed-form ANOVA backend without touching anything
//! downstream.

pub mod icc;
pub mod varcomp;

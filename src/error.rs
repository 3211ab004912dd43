use thiserror::Error;

// ---------------------------------------------------------------------------
// Feature-local error taxonomy
// ---------------------------------------------------------------------------

/// Everything that can go wrong while estimating the ICC of a single feature.
///
/// All variants are feature-local: the pipeline catches them at the
/// per-feature boundary and records the message in that feature's result row.
/// None of them abort the run; structural problems with the input table are
/// `anyhow` errors raised by the loader before any feature is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IccError {
    /// The feature has no admissible values: unknown column, entirely
    /// missing in the partition, or nothing left after filtering.
    #[error("no usable values for feature `{feature}`")]
    EmptyFeature { feature: String },

    /// Fewer than two device groups remain after filtering.
    #[error("feature `{feature}` has {found} device group(s), need at least 2")]
    InsufficientGroups { feature: String, found: usize },

    /// Defensive re-validation inside the variance decomposer failed.
    #[error("invalid decomposer input for `{feature}`: {reason}")]
    InvalidInput { feature: String, reason: String },

    /// The variance fit did not converge to a stable estimate.
    #[error("variance fit for `{feature}` did not converge: {reason}")]
    Convergence { feature: String, reason: String },

    /// The fitted variance components are unusable.
    #[error("degenerate variance fit for `{feature}`: {reason}")]
    DegenerateFit { feature: String, reason: String },

    /// Both variance components are zero, so the ICC ratio is undefined.
    #[error("total variance is zero; ICC is undefined")]
    DivisionByZero,
}

use serde::Serialize;

use crate::error::IccError;
use crate::stats::varcomp::VarianceComponents;

/// Two-sided 95% normal quantile used for the confidence interval.
pub const Z_95: f64 = 1.96;

/// Point estimate and confidence bounds for one feature's ICC.
///
/// The bounds are deliberately not clamped to `[0, 1]`; a wide interval is
/// itself the signal that the variance components are poorly separated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IccEstimate {
    pub icc: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Standard error of the mean of `values`: sample standard deviation with
/// one delta degree of freedom, divided by `sqrt(n)`. Needs at least two
/// values to be meaningful.
pub fn standard_error(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    var.sqrt() / n.sqrt()
}

/// Turn fitted variance components into the ICC and its interval.
///
/// The ICC is `between / (between + residual)`. The interval treats the two
/// fitted components as a two-element sample and spreads `Z_95` standard
/// errors of that sample around the point estimate, which collapses to
/// `icc ± Z_95 · |between − residual| / 2`.
pub fn estimate(components: VarianceComponents) -> Result<IccEstimate, IccError> {
    let VarianceComponents { between, residual } = components;
    let total = between + residual;
    if total == 0.0 {
        return Err(IccError::DivisionByZero);
    }

    let icc = between / total;
    let sem = standard_error(&[between, residual]);
    Ok(IccEstimate {
        icc,
        ci_low: icc - Z_95 * sem,
        ci_high: icc + Z_95 * sem,
    })
}

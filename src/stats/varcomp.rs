use crate::data::filter::FilteredSubset;
use crate::error::IccError;

// ---------------------------------------------------------------------------
// Variance components
// ---------------------------------------------------------------------------

/// Estimated variance components of the one-way random-intercept model
/// `value = mu + device_effect + residual_error`, where `device_effect` is a
/// zero-mean random offset shared by all observations of one device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarianceComponents {
    /// Variance of the per-device random intercept.
    pub between: f64,
    /// Residual (within-device) variance.
    pub residual: f64,
}

/// Fits the random-intercept model to one feature's filtered values.
///
/// Implementations must be safely callable in isolation: they re-validate
/// the subset and fail with [`IccError::InvalidInput`] instead of assuming
/// the record filter ran first.
pub trait VarianceDecomposer {
    fn fit(&self, subset: &FilteredSubset) -> Result<VarianceComponents, IccError>;
}

// ---------------------------------------------------------------------------
// Shared per-group summaries
// ---------------------------------------------------------------------------

/// Sufficient statistics of the grouped values; everything both backends
/// need from the raw observations.
struct GroupSummary {
    /// Group sizes `n_g`.
    sizes: Vec<f64>,
    /// Group means.
    means: Vec<f64>,
    /// Total observation count `N`.
    n_total: f64,
    /// Grand mean over all observations.
    grand_mean: f64,
    /// Within-group sum of squares.
    ssw: f64,
    /// Total sum of squares about the grand mean.
    tss: f64,
}

fn validate(subset: &FilteredSubset) -> Result<(), IccError> {
    let invalid = |reason: &str| IccError::InvalidInput {
        feature: subset.feature().to_string(),
        reason: reason.to_string(),
    };

    if subset.is_empty() {
        return Err(invalid("subset contains no observations"));
    }
    if subset.devices().len() < 2 {
        return Err(invalid("fewer than 2 device groups"));
    }
    if subset
        .observations()
        .iter()
        .any(|obs| !obs.value.is_finite())
    {
        return Err(invalid("non-finite feature value"));
    }
    Ok(())
}

fn summarize(subset: &FilteredSubset) -> GroupSummary {
    let groups = subset.device_groups();

    let mut sizes = Vec::with_capacity(groups.len());
    let mut means = Vec::with_capacity(groups.len());
    let mut ssw = 0.0;
    let mut sum = 0.0;
    let mut n_total = 0.0;

    for values in groups.values() {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        ssw += values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>();
        sum += values.iter().sum::<f64>();
        n_total += n;
        sizes.push(n);
        means.push(mean);
    }

    let grand_mean = sum / n_total;
    let tss = subset
        .observations()
        .iter()
        .map(|obs| (obs.value - grand_mean) * (obs.value - grand_mean))
        .sum();

    GroupSummary {
        sizes,
        means,
        n_total,
        grand_mean,
        ssw,
        tss,
    }
}

// ---------------------------------------------------------------------------
// REML backend
// ---------------------------------------------------------------------------

/// Restricted maximum likelihood fit of the one-way model.
///
/// The restricted likelihood is profiled down to the variance ratio
/// `lambda = between / residual`: with `u_g = n_g / (1 + n_g·λ)` and the
/// weighted grand mean `β̂ = Σ u_g·ȳ_g / Σ u_g`, the criterion to minimize
/// over `λ ≥ 0` is
///
/// ```text
/// f(λ) = (N−1)·ln Q(λ) + Σ_g ln(1 + n_g·λ) + ln Σ_g u_g
/// Q(λ) = SSW + Σ_g u_g·(ȳ_g − β̂)²
/// ```
///
/// and the minimizer gives `residual = Q(λ̂)/(N−1)`, `between = λ̂·residual`.
/// The search brackets the minimum by expanding the right edge and refines
/// it by golden-section, then snaps against the `λ = 0` boundary so a fit
/// with no between-device variance comes out as exactly zero.
pub struct RemlDecomposer {
    /// Iteration budget across bracketing and refinement.
    max_iterations: usize,
    /// Relative interval width at which the search stops.
    tolerance: f64,
}

/// Largest variance ratio the search will consider. Reached only when the
/// residual variance is (numerically) zero.
const LAMBDA_CAP: f64 = 1e9;

const INV_PHI: f64 = 0.618_033_988_749_894_9;

impl Default for RemlDecomposer {
    fn default() -> Self {
        RemlDecomposer {
            max_iterations: 500,
            tolerance: 1e-10,
        }
    }
}

impl RemlDecomposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profiled REML criterion and the associated `Q(λ)`.
    fn profile(summary: &GroupSummary, lambda: f64) -> (f64, f64) {
        let weights: Vec<f64> = summary
            .sizes
            .iter()
            .map(|n| n / (1.0 + n * lambda))
            .collect();
        let sum_u: f64 = weights.iter().sum();
        let beta: f64 = weights
            .iter()
            .zip(&summary.means)
            .map(|(u, m)| u * m)
            .sum::<f64>()
            / sum_u;

        let mut q = summary.ssw;
        let mut log_det = 0.0;
        for ((u, n), mean) in weights.iter().zip(&summary.sizes).zip(&summary.means) {
            q += u * (mean - beta) * (mean - beta);
            log_det += (1.0 + n * lambda).ln();
        }

        let objective = (summary.n_total - 1.0) * q.ln() + log_det + sum_u.ln();
        (objective, q)
    }

    /// Minimize the profiled criterion over `λ ≥ 0`.
    fn minimize(&self, summary: &GroupSummary, feature: &str) -> Result<f64, IccError> {
        let non_finite = || IccError::Convergence {
            feature: feature.to_string(),
            reason: "objective became non-finite".to_string(),
        };
        let budget_exhausted = || IccError::Convergence {
            feature: feature.to_string(),
            reason: format!("no convergence after {} iterations", self.max_iterations),
        };

        let mut iterations = 0usize;

        // Bracket: expand the right edge until the criterion turns upward.
        // The profiled REML criterion of the one-way model is unimodal, so
        // once it rises the minimum lies inside [0, hi].
        let mut f_prev = Self::profile(summary, 0.0).0;
        if !f_prev.is_finite() {
            return Err(non_finite());
        }
        let mut hi = 1.0;
        loop {
            let f_hi = Self::profile(summary, hi).0;
            if !f_hi.is_finite() {
                return Err(non_finite());
            }
            if f_hi >= f_prev || hi >= LAMBDA_CAP {
                break;
            }
            f_prev = f_hi;
            hi *= 10.0;
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(budget_exhausted());
            }
        }

        // Golden-section refinement on [0, hi].
        let mut a = 0.0;
        let mut b = hi;
        let mut c = b - INV_PHI * (b - a);
        let mut d = a + INV_PHI * (b - a);
        let mut f_c = Self::profile(summary, c).0;
        let mut f_d = Self::profile(summary, d).0;

        while (b - a) > self.tolerance * (1.0 + b.abs()) {
            if !f_c.is_finite() || !f_d.is_finite() {
                return Err(non_finite());
            }
            if f_c < f_d {
                b = d;
                d = c;
                f_d = f_c;
                c = b - INV_PHI * (b - a);
                f_c = Self::profile(summary, c).0;
            } else {
                a = c;
                c = d;
                f_c = f_d;
                d = a + INV_PHI * (b - a);
                f_d = Self::profile(summary, d).0;
            }
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(budget_exhausted());
            }
        }

        // Snap against the boundary: when no between-device variance is
        // supported, the candidate hovers just above zero but the exact
        // boundary is at least as likely.
        let candidate = 0.5 * (a + b);
        if Self::profile(summary, 0.0).0 <= Self::profile(summary, candidate).0 {
            Ok(0.0)
        } else {
            Ok(candidate)
        }
    }
}

impl VarianceDecomposer for RemlDecomposer {
    fn fit(&self, subset: &FilteredSubset) -> Result<VarianceComponents, IccError> {
        validate(subset)?;
        let summary = summarize(subset);

        // No variability at all: both components are exactly zero and the
        // estimator downstream reports the undefined ratio.
        if summary.tss == 0.0 {
            return Ok(VarianceComponents {
                between: 0.0,
                residual: 0.0,
            });
        }

        let lambda = self.minimize(&summary, subset.feature())?;
        let (_, q) = Self::profile(&summary, lambda);
        let residual = q / (summary.n_total - 1.0);
        let between = lambda * residual;

        check_components(subset.feature(), between, residual)
    }
}

// ---------------------------------------------------------------------------
// ANOVA (method of moments) backend
// ---------------------------------------------------------------------------

/// One-way ANOVA method-of-moments estimator: `residual = MSW` and
/// `between = (MSB − MSW)/n0` truncated at zero, with `n0` the effective
/// group size for unbalanced data. On balanced input it coincides with REML
/// whenever the between estimate is interior.
pub struct AnovaDecomposer;

impl VarianceDecomposer for AnovaDecomposer {
    fn fit(&self, subset: &FilteredSubset) -> Result<VarianceComponents, IccError> {
        validate(subset)?;
        let summary = summarize(subset);

        let k = summary.sizes.len() as f64;
        if summary.n_total <= k {
            return Err(IccError::DegenerateFit {
                feature: subset.feature().to_string(),
                reason: "no residual degrees of freedom".to_string(),
            });
        }

        let msw = summary.ssw / (summary.n_total - k);
        let ssb: f64 = summary
            .sizes
            .iter()
            .zip(&summary.means)
            .map(|(n, m)| n * (m - summary.grand_mean) * (m - summary.grand_mean))
            .sum();
        let msb = ssb / (k - 1.0);
        let sq_sizes: f64 = summary.sizes.iter().map(|n| n * n).sum();
        let n0 = (summary.n_total - sq_sizes / summary.n_total) / (k - 1.0);
        let between = ((msb - msw) / n0).max(0.0);

        check_components(subset.feature(), between, msw)
    }
}

/// Reject fits that produced unusable components.
fn check_components(
    feature: &str,
    between: f64,
    residual: f64,
) -> Result<VarianceComponents, IccError> {
    if !between.is_finite() || !residual.is_finite() || between < 0.0 || residual < 0.0 {
        return Err(IccError::DegenerateFit {
            feature: feature.to_string(),
            reason: format!("unusable estimate (between={between}, residual={residual})"),
        });
    }
    Ok(VarianceComponents { between, residual })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::Observation;
    use crate::data::model::Device;

    /// Build a subset from `(device, values)` groups; subject names are
    /// irrelevant to the fit.
    fn subset(groups: &[(char, &[f64])]) -> FilteredSubset {
        let mut observations = Vec::new();
        for (device, values) in groups {
            for (i, v) in values.iter().enumerate() {
                observations.push(Observation {
                    subject: format!("p{i}"),
                    device: Device::new(*device),
                    value: *v,
                });
            }
        }
        FilteredSubset::new("vol", observations)
    }

    // Balanced design: k = 3 groups of n = 3; MSW = 1, MSB = 3, so REML
    // lands at residual = MSW = 1 and between = (MSB − MSW)/n = 2/3.
    fn balanced() -> FilteredSubset {
        subset(&[
            ('F', &[1.0, 2.0, 3.0]),
            ('S', &[2.0, 3.0, 4.0]),
            ('X', &[3.0, 4.0, 5.0]),
        ])
    }

    #[test]
    fn reml_matches_balanced_closed_form() {
        let fit = RemlDecomposer::new().fit(&balanced()).expect("fit");
        assert!((fit.residual - 1.0).abs() < 1e-6, "residual {}", fit.residual);
        assert!(
            (fit.between - 2.0 / 3.0).abs() < 1e-6,
            "between {}",
            fit.between
        );
    }

    #[test]
    fn anova_agrees_with_reml_on_balanced_data() {
        let reml = RemlDecomposer::new().fit(&balanced()).expect("reml");
        let anova = AnovaDecomposer.fit(&balanced()).expect("anova");
        assert!((reml.between - anova.between).abs() < 1e-6);
        assert!((reml.residual - anova.residual).abs() < 1e-6);
    }

    #[test]
    fn equal_group_means_snap_between_to_exact_zero() {
        // MSB < MSW: the boundary fit pools everything into the residual,
        // which REML estimates as TSS/(N−1) = 2/3 here.
        let fit = RemlDecomposer::new()
            .fit(&subset(&[('F', &[1.0, 3.0]), ('S', &[2.0, 2.0])]))
            .expect("fit");
        assert_eq!(fit.between, 0.0);
        assert!((fit.residual - 2.0 / 3.0).abs() < 1e-9, "residual {}", fit.residual);
    }

    #[test]
    fn constant_values_yield_zero_components() {
        let fit = RemlDecomposer::new()
            .fit(&subset(&[('F', &[5.0, 5.0]), ('S', &[5.0, 5.0])]))
            .expect("fit");
        assert_eq!(fit.between, 0.0);
        assert_eq!(fit.residual, 0.0);
    }

    #[test]
    fn strong_device_separation_dominates_between() {
        let data = subset(&[
            ('F', &[10.0, 10.1]),
            ('S', &[20.0, 19.9]),
            ('X', &[30.0, 30.2]),
        ]);
        let reml = RemlDecomposer::new().fit(&data).expect("reml");
        let anova = AnovaDecomposer.fit(&data).expect("anova");
        // Balanced and far from the boundary: the two estimators coincide.
        assert!((reml.between - anova.between).abs() < 1e-6);
        assert!((reml.residual - anova.residual).abs() < 1e-6);
        assert!(reml.between > 100.0 * reml.residual);
    }

    #[test]
    fn unbalanced_groups_fit_deterministically() {
        let data = subset(&[('F', &[1.0, 2.0, 3.0, 4.0]), ('S', &[2.0, 3.0, 4.0])]);
        let first = RemlDecomposer::new().fit(&data).expect("fit");
        let second = RemlDecomposer::new().fit(&data).expect("fit");
        assert_eq!(first, second);
        assert!(first.between >= 0.0);
        assert!(first.residual > 0.0);
    }

    #[test]
    fn anova_without_residual_degrees_of_freedom_is_degenerate() {
        let err = AnovaDecomposer
            .fit(&subset(&[('F', &[1.0]), ('S', &[2.0])]))
            .expect_err("one value per group");
        assert!(matches!(err, IccError::DegenerateFit { .. }));
    }

    #[test]
    fn empty_subset_is_invalid_input() {
        let err = RemlDecomposer::new()
            .fit(&FilteredSubset::new("vol", Vec::new()))
            .expect_err("nothing to fit");
        assert!(matches!(err, IccError::InvalidInput { .. }));
    }

    #[test]
    fn single_group_is_invalid_input() {
        let err = RemlDecomposer::new()
            .fit(&subset(&[('F', &[1.0, 2.0, 3.0])]))
            .expect_err("one device only");
        assert!(matches!(err, IccError::InvalidInput { .. }));
    }

    #[test]
    fn non_finite_value_is_invalid_input() {
        let err = RemlDecomposer::new()
            .fit(&subset(&[('F', &[1.0, f64::NAN]), ('S', &[2.0, 3.0])]))
            .expect_err("NaN in data");
        assert!(matches!(err, IccError::InvalidInput { .. }));
    }
}

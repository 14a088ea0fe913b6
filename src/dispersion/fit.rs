//! Least-squares fitting of dispersion polynomials with iterative rejection.
//!
//! The fit is repeated while lines are being rejected: every line whose
//! residual exceeds the rejection threshold (in pixels) is dropped for good,
//! and the polynomial is refitted on the survivors. The iteration stops as
//! soon as a pass rejects nothing, or fails if fewer than the minimum number
//! of lines would remain.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::correspondence::Correspondence;
use crate::error::FitError;

use super::model::{eval_poly, DispersionModel};
use super::{min_lines_for_order, MAX_ORDER};

/// Configuration for a dispersion fit.
#[derive(Debug, Clone, PartialEq)]
pub struct DispersionFitConfig {
    /// Polynomial order (0..=5). Default 2.
    pub order: usize,
    /// Residual (pixels) above which a line is rejected. Values ≤ 0 disable
    /// rejection and accept the first fit. Default 0.7.
    pub reject_threshold: f64,
    /// Minimum number of lines for the fit to be attempted or kept.
    /// Conventionally `2·(order + 1)`. Default 6.
    pub min_lines: usize,
}

impl Default for DispersionFitConfig {
    fn default() -> Self {
        Self {
            order: 2,
            reject_threshold: 0.7,
            min_lines: min_lines_for_order(2),
        }
    }
}

/// Result of [`fit_pixel_from_wavelength`].
#[derive(Debug, Clone)]
pub struct DispersionFit {
    /// The fitted wavelength → pixel model.
    pub model: DispersionModel,
    /// The input correspondences, with `used` set on the lines kept by the fit.
    pub lines: Vec<Correspondence>,
    /// Number of lines used in the final fit.
    pub n_used: usize,
    /// RMS pixel residual of the used lines.
    pub rms: f64,
    /// Number of least-squares solves performed.
    pub iterations: u32,
}

impl DispersionFit {
    /// Only the lines kept by the fit.
    pub fn used_lines(&self) -> impl Iterator<Item = &Correspondence> {
        self.lines.iter().filter(|c| c.used)
    }

    /// Pixel residual (observed − model) of each input line.
    pub fn residuals(&self) -> Vec<f64> {
        self.lines
            .iter()
            .map(|c| c.pixel - self.model.pixel_at(c.wavelength))
            .collect()
    }
}

/// Fit `pixel = P(λ − λref)` to a list of correspondences.
///
/// See the module documentation for the rejection scheme. Errors:
/// - [`FitError::UnsupportedOrder`] if `order > 5`,
/// - [`FitError::TooFewLines`] if fewer than `min_lines` (or `order + 1`) lines are given,
/// - [`FitError::RejectedBelowMinimum`] if rejection leaves fewer than `min_lines`,
/// - [`FitError::Singular`] if the design matrix is rank deficient.
pub fn fit_pixel_from_wavelength(
    correspondences: &[Correspondence],
    reference_wavelength: f64,
    config: &DispersionFitConfig,
) -> Result<DispersionFit, FitError> {
    let xs: Vec<f64> = correspondences
        .iter()
        .map(|c| c.wavelength - reference_wavelength)
        .collect();
    let ys: Vec<f64> = correspondences.iter().map(|c| c.pixel).collect();

    let solution = iterative_fit(&xs, &ys, config)?;

    let lines = correspondences
        .iter()
        .zip(&solution.mask)
        .map(|(c, &used)| Correspondence { used, ..*c })
        .collect();

    Ok(DispersionFit {
        model: DispersionModel::new(solution.coefficients, reference_wavelength),
        lines,
        n_used: solution.n_used,
        rms: solution.rms,
        iterations: solution.iterations,
    })
}

/// Inverse relation `λ − λref = Q(pixel)` fitted directly from correspondences.
#[derive(Debug, Clone)]
pub struct PixelToWavelengthFit {
    /// Polynomial coefficients in pixel, constant term first.
    pub coefficients: Vec<f64>,
    /// Zero point added back to the polynomial value.
    pub reference_wavelength: f64,
    /// Number of lines used in the final fit.
    pub n_used: usize,
    /// RMS residual of the used lines, in wavelength units.
    pub rms: f64,
}

impl PixelToWavelengthFit {
    pub fn wavelength_at(&self, pixel: f64) -> f64 {
        eval_poly(&self.coefficients, pixel) + self.reference_wavelength
    }
}

/// Fit `λ − λref = Q(pixel)`, the inverse of [`fit_pixel_from_wavelength`].
///
/// Same rejection scheme; here `reject_threshold` is in wavelength units.
pub fn fit_wavelength_from_pixel(
    correspondences: &[Correspondence],
    reference_wavelength: f64,
    config: &DispersionFitConfig,
) -> Result<PixelToWavelengthFit, FitError> {
    let xs: Vec<f64> = correspondences.iter().map(|c| c.pixel).collect();
    let ys: Vec<f64> = correspondences
        .iter()
        .map(|c| c.wavelength - reference_wavelength)
        .collect();

    let solution = iterative_fit(&xs, &ys, config)?;
    Ok(PixelToWavelengthFit {
        coefficients: solution.coefficients,
        reference_wavelength,
        n_used: solution.n_used,
        rms: solution.rms,
    })
}

// ── Internal helpers ────────────────────────────────────────────────────────

struct Solution {
    coefficients: Vec<f64>,
    mask: Vec<bool>,
    n_used: usize,
    rms: f64,
    iterations: u32,
}

fn iterative_fit(xs: &[f64], ys: &[f64], config: &DispersionFitConfig) -> Result<Solution, FitError> {
    let order = config.order;
    if order > MAX_ORDER {
        return Err(FitError::UnsupportedOrder(order));
    }
    let required = config.min_lines.max(order + 1);
    if xs.len() < required {
        return Err(FitError::TooFewLines {
            available: xs.len(),
            required,
        });
    }

    let mut mask = vec![true; xs.len()];
    let mut n_used = xs.len();
    let mut coefficients = solve_poly_ls(xs, ys, &mask, order)?;
    let mut iterations = 1u32;

    if config.reject_threshold > 0.0 {
        loop {
            let mut kept = 0usize;
            for i in 0..xs.len() {
                let residual = eval_poly(&coefficients, xs[i]) - ys[i];
                if mask[i] && exceeds_threshold(residual, config.reject_threshold) {
                    mask[i] = false;
                }
                if mask[i] {
                    kept += 1;
                }
            }

            if kept == n_used {
                break;
            }
            debug!(
                "Dispersion fit iteration {}: rejected {} of {} lines",
                iterations,
                n_used - kept,
                n_used
            );
            if kept < config.min_lines {
                return Err(FitError::RejectedBelowMinimum {
                    remaining: kept,
                    required: config.min_lines,
                });
            }
            n_used = kept;
            coefficients = solve_poly_ls(xs, ys, &mask, order)?;
            iterations += 1;
        }
    }

    let sum_sq: f64 = xs
        .iter()
        .zip(ys)
        .zip(&mask)
        .filter(|(_, &m)| m)
        .map(|((&x, &y), _)| (eval_poly(&coefficients, x) - y).powi(2))
        .sum();
    let rms = (sum_sq / n_used as f64).sqrt();

    Ok(Solution {
        coefficients,
        mask,
        n_used,
        rms,
        iterations,
    })
}

/// A residual equal to the threshold is kept.
fn exceeds_threshold(residual: f64, threshold: f64) -> bool {
    residual.abs() > threshold
}

/// Solve the polynomial least-squares problem on the masked points via SVD.
///
/// The abscissa is divided by its largest magnitude before building the
/// Vandermonde matrix, so that high powers stay well conditioned; the
/// coefficients are scaled back afterwards.
fn solve_poly_ls(xs: &[f64], ys: &[f64], mask: &[bool], order: usize) -> Result<Vec<f64>, FitError> {
    let n = mask.iter().filter(|&&m| m).count();
    let k = order + 1;
    if n < k {
        return Err(FitError::Singular { n, k });
    }

    let scale = xs
        .iter()
        .zip(mask)
        .filter(|(_, &m)| m)
        .map(|(x, _)| x.abs())
        .fold(0.0_f64, f64::max);
    let scale = if scale > 0.0 { scale } else { 1.0 };

    let mut a_mat = DMatrix::<f64>::zeros(n, k);
    let mut b_vec = DVector::<f64>::zeros(n);
    let mut row = 0;
    for i in 0..xs.len() {
        if !mask[i] {
            continue;
        }
        let u = xs[i] / scale;
        let mut p = 1.0;
        for j in 0..k {
            a_mat[(row, j)] = p;
            p *= u;
        }
        b_vec[row] = ys[i];
        row += 1;
    }

    let svd = a_mat.svd(true, true);
    let max_sv = svd.singular_values.max();
    if !(max_sv > 0.0) || svd.rank(max_sv * 1e-12) < k {
        return Err(FitError::Singular { n, k });
    }
    let coeffs = svd
        .solve(&b_vec, max_sv * 1e-12)
        .map_err(|_| FitError::Singular { n, k })?;

    let mut out = Vec::with_capacity(k);
    let mut s = 1.0;
    for j in 0..k {
        out.push(coeffs[j] / s);
        s *= scale;
    }
    Ok(out)
}

//! Polynomial dispersion model: wavelength → pixel, with bounded inversion.

use super::{MAX_COEFFS, MAX_ORDER};

/// Maximum Newton/bisection iterations when inverting the model.
const MAX_SOLVE_ITERATIONS: usize = 100;

/// Pixel residual at which the inverse solution is accepted.
const SOLVE_TOLERANCE_PX: f64 = 1e-10;

/// Polynomial mapping from wavelength to pixel for one spectrum row.
///
/// Forward: `pixel = Σ c_k · (λ − λref)^k`. Inverse: bounded root solve.
#[derive(Debug, Clone, PartialEq)]
pub struct DispersionModel {
    /// Polynomial coefficients, constant term first. Length is `order + 1`.
    pub coefficients: Vec<f64>,
    /// Zero point subtracted from wavelengths before evaluation.
    pub reference_wavelength: f64,
}

impl DispersionModel {
    /// Create a model from its coefficients (constant term first).
    ///
    /// At least one and at most [`MAX_COEFFS`] coefficients must be given.
    pub fn new(coefficients: Vec<f64>, reference_wavelength: f64) -> Self {
        assert!(
            !coefficients.is_empty() && coefficients.len() <= MAX_COEFFS,
            "dispersion model needs 1..={} coefficients, got {}",
            MAX_COEFFS,
            coefficients.len()
        );
        Self {
            coefficients,
            reference_wavelength,
        }
    }

    /// Polynomial order.
    pub fn order(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Pixel position of a wavelength.
    pub fn pixel_at(&self, wavelength: f64) -> f64 {
        eval_poly(&self.coefficients, wavelength - self.reference_wavelength)
    }

    /// Local dispersion dpixel/dλ at a wavelength.
    pub fn slope_at(&self, wavelength: f64) -> f64 {
        let x = wavelength - self.reference_wavelength;
        self.coefficients
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (k, &c)| acc * x + k as f64 * c)
    }

    /// Wavelength imaged at `pixel`, searched within `[blue, red]`.
    ///
    /// Returns `None` if `pixel` does not lie between `pixel_at(blue)` and
    /// `pixel_at(red)`, or if the root solve does not converge. Models that
    /// decrease with wavelength are handled as well.
    pub fn wavelength_at(&self, pixel: f64, blue: f64, red: f64) -> Option<f64> {
        let (mut lo, mut hi) = (
            blue - self.reference_wavelength,
            red - self.reference_wavelength,
        );
        let f = |x: f64| eval_poly(&self.coefficients, x) - pixel;

        let (f_lo, f_hi) = (f(lo), f(hi));
        if !(f_lo * f_hi <= 0.0) {
            return None;
        }
        if f_lo == 0.0 {
            return Some(blue);
        }
        if f_hi == 0.0 {
            return Some(red);
        }

        // `lo` always keeps the sign of `f_lo`.
        let increasing = f_lo < 0.0;

        // Safeguarded Newton: fall back to bisection whenever the step
        // leaves the current bracket.
        let mut x = 0.5 * (lo + hi);
        for _ in 0..MAX_SOLVE_ITERATIONS {
            let fx = f(x);
            if !fx.is_finite() {
                return None;
            }
            if fx.abs() < SOLVE_TOLERANCE_PX {
                return Some(x + self.reference_wavelength);
            }
            if (fx < 0.0) == increasing {
                lo = x;
            } else {
                hi = x;
            }
            let slope = self.slope_at(x + self.reference_wavelength);
            let mut next = x - fx / slope;
            if !next.is_finite() || next <= lo || next >= hi {
                next = 0.5 * (lo + hi);
            }
            if (next - x).abs() <= 1e-12 * (1.0 + x.abs()) {
                return Some(next + self.reference_wavelength);
            }
            x = next;
        }
        None
    }

    /// True if the pixel position never decreases with wavelength over
    /// `[blue, red]`, checked every `step` wavelength units.
    pub fn is_monotonic(&self, blue: f64, red: f64, step: f64) -> bool {
        let step = if step > 0.0 { step } else { (red - blue) / 100.0 };
        if !(step > 0.0) {
            return self.slope_at(blue) >= 0.0;
        }
        let mut wave = blue;
        while wave < red {
            if self.slope_at(wave) < 0.0 {
                return false;
            }
            wave += step;
        }
        self.slope_at(red) >= 0.0
    }

    /// Coefficients zero-padded to [`MAX_COEFFS`] entries.
    pub fn padded_coefficients(&self) -> [f64; MAX_COEFFS] {
        let mut out = [0.0; MAX_COEFFS];
        out[..self.coefficients.len()].copy_from_slice(&self.coefficients);
        out
    }

    /// Build a model from zero-padded coefficients, trimmed to `order`.
    pub fn from_padded(
        coefficients: &[f64; MAX_COEFFS],
        order: usize,
        reference_wavelength: f64,
    ) -> Self {
        let order = order.min(MAX_ORDER);
        Self::new(coefficients[..=order].to_vec(), reference_wavelength)
    }

    /// Coefficient-wise median of several models.
    ///
    /// Used as a "first guess" for guided line searches: the median of the
    /// blind solutions of many rows is far more robust than any single one.
    /// The order of the result is the highest order among the inputs; the
    /// reference wavelength is taken from the first model.
    pub fn median(models: &[&DispersionModel]) -> Option<DispersionModel> {
        let first = models.first()?;
        let order = models.iter().map(|m| m.order()).max()?;
        let mut coefficients = Vec::with_capacity(order + 1);
        let mut column = Vec::with_capacity(models.len());
        for k in 0..=order {
            column.clear();
            column.extend(models.iter().map(|m| m.coefficients.get(k).copied().unwrap_or(0.0)));
            column.sort_by(|a, b| a.total_cmp(b));
            let n = column.len();
            let med = if n % 2 == 0 {
                0.5 * (column[n / 2 - 1] + column[n / 2])
            } else {
                column[n / 2]
            };
            coefficients.push(med);
        }
        Some(DispersionModel::new(coefficients, first.reference_wavelength))
    }
}

/// Evaluate `Σ c_k · x^k` by Horner's rule.
pub(crate) fn eval_poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

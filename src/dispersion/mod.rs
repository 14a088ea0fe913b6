//! Dispersion relation between wavelength and pixel position.
//!
//! The dispersion model ("IDS") is a polynomial giving the pixel position of
//! a wavelength along one spectrum row:
//!
//! ```text
//! pixel = c0 + c1·(λ − λref) + c2·(λ − λref)² + … + c5·(λ − λref)⁵
//! ```
//!
//! The reference wavelength `λref` is chosen by the caller (typically near
//! the centre of the spectral range) so that the coefficients stay small.
//!
//! Models are produced by [`fit_pixel_from_wavelength`], which performs
//! iterative least-squares fitting with rejection of lines whose residual
//! exceeds a fixed pixel threshold.

pub mod fit;
pub mod model;

pub use fit::{
    fit_pixel_from_wavelength, fit_wavelength_from_pixel, DispersionFit, DispersionFitConfig,
    PixelToWavelengthFit,
};
pub use model::DispersionModel;

/// Highest supported polynomial order.
pub const MAX_ORDER: usize = 5;

/// Number of coefficient slots in per-row outputs (order 0 through [`MAX_ORDER`]).
pub const MAX_COEFFS: usize = MAX_ORDER + 1;

/// Minimum number of lines keeping a fit of `order` over-determined.
pub fn min_lines_for_order(order: usize) -> usize {
    2 * (order + 1)
}

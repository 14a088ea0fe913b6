//! Define a correspondence between a detected peak position and a catalog
//! wavelength. Correspondences are the output of line identification and
//! the input to the dispersion fit.
//!

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Peak position in pixels along the dispersion direction.
    pub pixel: f64,
    /// Catalog wavelength assigned to the peak.
    pub wavelength: f64,
    /// Set by the dispersion fit: `true` if the line survived outlier rejection.
    pub used: bool,
}

impl Correspondence {
    pub fn new(pixel: f64, wavelength: f64) -> Self {
        Self {
            pixel,
            wavelength,
            used: false,
        }
    }

    /// Local dispersion (pixels per wavelength unit) between two correspondences.
    pub fn dispersion_to(&self, other: &Correspondence) -> f64 {
        (other.pixel - self.pixel) / (other.wavelength - self.wavelength)
    }
}

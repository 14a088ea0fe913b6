//! Reference line catalog: the ascending list of arc-lamp wavelengths that
//! detected peaks are identified against.

use crate::error::CatalogError;

/// An ascending list of reference wavelengths.
///
/// The catalog is read-only for the whole calibration run. Units are whatever
/// the caller uses consistently (typically Ångström).
#[derive(Debug, Clone, PartialEq)]
pub struct LineCatalog {
    wavelengths: Vec<f64>,
}

impl LineCatalog {
    /// Build a catalog, checking that wavelengths are finite and strictly ascending.
    pub fn new(wavelengths: Vec<f64>) -> Result<Self, CatalogError> {
        if wavelengths.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (i, w) in wavelengths.iter().enumerate() {
            if !w.is_finite() {
                return Err(CatalogError::NonFinite(i));
            }
            if i > 0 && *w <= wavelengths[i - 1] {
                return Err(CatalogError::NotAscending(i));
            }
        }
        Ok(Self { wavelengths })
    }

    /// Build a catalog from an unordered list, sorting and removing duplicates.
    pub fn from_unsorted(mut wavelengths: Vec<f64>) -> Result<Self, CatalogError> {
        if let Some(i) = wavelengths.iter().position(|w| !w.is_finite()) {
            return Err(CatalogError::NonFinite(i));
        }
        wavelengths.sort_by(|a, b| a.total_cmp(b));
        wavelengths.dedup();
        Self::new(wavelengths)
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    /// Bluest and reddest catalog wavelengths.
    pub fn span(&self) -> (f64, f64) {
        (self.wavelengths[0], self.wavelengths[self.wavelengths.len() - 1])
    }

    /// Wavelength ratio of the two intervals around interior index `i`:
    /// `(λ[i+1] − λ[i]) / (λ[i] − λ[i−1])`.
    ///
    /// This ratio is invariant under any affine pixel ↔ wavelength transform,
    /// which is what makes identification without a prior possible.
    pub fn interval_ratio(&self, i: usize) -> Option<f64> {
        if i == 0 || i + 1 >= self.wavelengths.len() {
            return None;
        }
        let w = &self.wavelengths;
        Some((w[i + 1] - w[i]) / (w[i] - w[i - 1]))
    }
}

impl std::ops::Index<usize> for LineCatalog {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.wavelengths[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsorted() {
        assert_eq!(
            LineCatalog::new(vec![5000.0, 4990.0]),
            Err(CatalogError::NotAscending(1))
        );
        assert_eq!(
            LineCatalog::new(vec![5000.0, 5000.0]),
            Err(CatalogError::NotAscending(1))
        );
        assert_eq!(LineCatalog::new(vec![]), Err(CatalogError::Empty));
        assert_eq!(
            LineCatalog::new(vec![5000.0, f64::NAN]),
            Err(CatalogError::NonFinite(1))
        );
    }

    #[test]
    fn test_from_unsorted() {
        let cat = LineCatalog::from_unsorted(vec![5100.0, 5000.0, 5050.0, 5000.0]).unwrap();
        assert_eq!(cat.wavelengths(), &[5000.0, 5050.0, 5100.0]);
        assert_eq!(cat.span(), (5000.0, 5100.0));
    }

    #[test]
    fn test_interval_ratio() {
        let cat = LineCatalog::new(vec![5000.0, 5020.0, 5050.0, 5100.0]).unwrap();
        assert!(cat.interval_ratio(0).is_none());
        assert!((cat.interval_ratio(1).unwrap() - 1.5).abs() < 1e-12);
        assert!((cat.interval_ratio(2).unwrap() - 50.0 / 30.0).abs() < 1e-12);
        assert!(cat.interval_ratio(3).is_none());
    }
}

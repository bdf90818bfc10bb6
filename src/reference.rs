//! Measured reference curves and deviation scalars.

use log::info;
use ndarray::Array1;
use std::path::Path;

use crate::errors::{Result, StackError};
use crate::helpers::{interp_clamped, sort_by_abscissa};
use crate::material::read_two_columns;
use crate::settings::ReferencePaths;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micrometres_and_percent_normalised() {
        let grid = Array1::from(vec![400.0, 500.0, 600.0]);
        let curve = reference_curve(&[0.4, 0.6], &[20.0, 40.0], &grid).unwrap();
        assert!((curve[0] - 0.2).abs() < 1e-12);
        assert!((curve[1] - 0.3).abs() < 1e-12);
        assert!((curve[2] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn clamped_outside_range() {
        let grid = Array1::from(vec![300.0, 500.0, 900.0]);
        let curve = reference_curve(&[400.0, 800.0], &[0.1, 0.5], &grid).unwrap();
        assert_eq!(curve[0], 0.1);
        assert_eq!(curve[2], 0.5);
    }

    #[test]
    fn chi_square_skips_zero_reference() {
        let calc = Array1::from(vec![0.2, 0.5, 0.3]);
        let reference = Array1::from(vec![0.1, 0.0, 0.3]);
        assert!((chi_square(&calc, &reference) - 1.0).abs() < 1e-12);
    }
}

/// Normalises raw reference samples onto `grid`. Wavelengths below 100 are
/// micrometres; values with a mean above 1 are percent.
pub fn reference_curve(wavelength: &[f64], value: &[f64], grid: &Array1<f64>) -> Result<Array1<f64>> {
    let (mut wavelength, value) = sort_by_abscissa(wavelength.to_vec(), value.to_vec());
    let Some(&first) = wavelength.first() else {
        return Err(StackError::load("reference curve", "no data rows"));
    };
    if first < 100.0 {
        wavelength.iter_mut().for_each(|w| *w *= 1000.0);
    }
    let mut curve = grid.mapv(|w| interp_clamped(w, &wavelength, &value));
    if curve.mean().is_some_and(|m| m > 1.0) {
        curve /= 100.0;
    }
    Ok(curve)
}

fn load(path: &Path, subject: &str, grid: &Array1<f64>) -> Result<Array1<f64>> {
    info!("loading {subject} from {}", path.display());
    let (wavelength, value) = read_two_columns(path, subject)?;
    reference_curve(&wavelength, &value, grid)
        .map_err(|e| StackError::load_file(subject, path, e.to_string()))
}

/// Σ ((calc − ref)/ref)² over points with a non-zero reference.
pub fn chi_square(calculated: &Array1<f64>, reference: &Array1<f64>) -> f64 {
    calculated
        .iter()
        .zip(reference)
        .filter(|(_, r)| **r != 0.0)
        .map(|(&c, &r)| ((c - r) / r).powi(2))
        .sum()
}

/// Reference curves on the master grid.
#[derive(Debug, Clone, Default)]
pub struct References {
    pub reflection: Option<Array1<f64>>,
    pub transmission: Option<Array1<f64>>,
    pub eqe: Option<Array1<f64>>,
    pub psi: Option<Array1<f64>>,
    pub delta: Option<Array1<f64>>,
}

impl References {
    pub fn load(paths: &ReferencePaths, grid: &Array1<f64>) -> Result<Self> {
        let get = |path: &Option<std::path::PathBuf>, subject: &str| {
            path.as_deref().map(|p| load(p, subject, grid)).transpose()
        };
        Ok(Self {
            reflection: get(&paths.reflection, "reflection reference")?,
            transmission: get(&paths.transmission, "transmission reference")?,
            eqe: get(&paths.eqe, "EQE reference")?,
            psi: get(&paths.psi, "psi reference")?,
            delta: get(&paths.delta, "delta reference")?,
        })
    }
}

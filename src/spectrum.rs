//! Illumination spectrum and photon current.

use log::info;
use ndarray::Array1;
use std::path::Path;

use crate::config::{ELEMENTARY_CHARGE, FLAT_SPECTRAL_IRRADIANCE, PLANCK, SPEED_OF_LIGHT};
use crate::errors::{Result, StackError};
use crate::helpers::{interp_clamped, sort_by_abscissa, trapz};
use crate::material::read_two_columns;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binned_power_converted_to_per_nm() {
        let grid = Array1::from(vec![400.0, 500.0, 600.0]);
        // 10 nm bins of 5 W/m² each
        let spectrum = Spectrum::from_samples(
            &[400.0, 410.0, 500.0, 590.0, 600.0],
            &[5.0, 5.0, 5.0, 5.0, 5.0],
            &grid,
            1.0,
        )
        .unwrap();
        assert!((spectrum.irradiance[0] - 0.5).abs() < 1e-12);
        assert!((spectrum.irradiance[2] - 0.5).abs() < 1e-12);
        assert!((spectrum.illumination - 25.0).abs() < 1e-12);
    }

    #[test]
    fn photon_current_of_flat_spectrum() {
        let grid = Array1::from(vec![500.0, 600.0]);
        let spectrum = Spectrum::flat(&grid, 1.0);
        let expected = 500.0 * 1e-9 / (PLANCK * SPEED_OF_LIGHT) * ELEMENTARY_CHARGE * 0.1;
        assert!((spectrum.photon_current[0] - expected).abs() < 1e-12 * expected);
        assert!(spectrum.jmax > 0.0);
    }

    #[test]
    fn intensity_scale_applies_to_current() {
        let grid = Array1::from(vec![500.0, 600.0]);
        let full = Spectrum::flat(&grid, 1.0);
        let half = Spectrum::flat(&grid, 0.5);
        assert!((half.jmax - 0.5 * full.jmax).abs() < 1e-12);
        assert!((half.illumination - 0.5 * full.illumination).abs() < 1e-12);
    }

    #[test]
    fn single_row_rejected() {
        let grid = Array1::from(vec![500.0]);
        assert!(Spectrum::from_samples(&[500.0], &[1.0], &grid, 1.0).is_err());
    }
}

/// Illumination on the master grid.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Spectral irradiance in W m⁻² nm⁻¹, scaled by the intensity setting.
    pub irradiance: Array1<f64>,
    /// Photon current density in mA cm⁻² nm⁻¹.
    pub photon_current: Array1<f64>,
    /// Maximum photocurrent ∫ photon current dλ in mA cm⁻².
    pub jmax: f64,
    /// Total illumination in W m⁻².
    pub illumination: f64,
}

impl Spectrum {
    /// Flat spectrum of [`FLAT_SPECTRAL_IRRADIANCE`] over the grid.
    pub fn flat(grid: &Array1<f64>, scale: f64) -> Self {
        let irradiance = Array1::from_elem(grid.len(), FLAT_SPECTRAL_IRRADIANCE * scale);
        let illumination = match grid.len() {
            0 | 1 => irradiance.sum(),
            _ => trapz(irradiance.view(), grid.view()),
        };
        Self::with_irradiance(irradiance, grid, illumination)
    }

    /// Loads a two-column file of wavelength (nm) and power per bin.
    pub fn from_file(path: &Path, grid: &Array1<f64>, scale: f64) -> Result<Self> {
        info!("loading spectrum {}", path.display());
        let (wavelength, power) = read_two_columns(path, "illumination spectrum")?;
        Self::from_samples(&wavelength, &power, grid, scale)
            .map_err(|e| StackError::load_file("illumination spectrum", path, e.to_string()))
    }

    /// Builds the spectrum from binned power samples.
    pub fn from_samples(wavelength: &[f64], power: &[f64], grid: &Array1<f64>, scale: f64) -> Result<Self> {
        if wavelength.len() < 2 {
            return Err(StackError::load("illumination spectrum", "fewer than two rows"));
        }
        let (wavelength, power) = sort_by_abscissa(wavelength.to_vec(), power.to_vec());
        let last = wavelength.len() - 1;
        let per_nm: Vec<f64> = (0..=last)
            .map(|i| {
                let width = match i {
                    0 => wavelength[1] - wavelength[0],
                    i if i == last => wavelength[last] - wavelength[last - 1],
                    i => (wavelength[i + 1] - wavelength[i - 1]) / 2.0,
                };
                power[i] / width
            })
            .collect();
        if per_nm.iter().any(|p| !p.is_finite()) {
            return Err(StackError::load("illumination spectrum", "duplicate wavelengths"));
        }
        let irradiance = grid.mapv(|w| interp_clamped(w, &wavelength, &per_nm) * scale);
        let illumination = power.iter().sum::<f64>() * scale;
        Ok(Self::with_irradiance(irradiance, grid, illumination))
    }

    fn with_irradiance(irradiance: Array1<f64>, grid: &Array1<f64>, illumination: f64) -> Self {
        // photons per m² s nm, times q, A/m² to mA/cm²
        let photon_current = grid * &irradiance * 1e-9 / (PLANCK * SPEED_OF_LIGHT) * ELEMENTARY_CHARGE * 0.1;
        let jmax = trapz(photon_current.view(), grid.view());
        info!("illumination {illumination:.4} W/m², Jmax {jmax:.4} mA/cm²");
        Self {
            irradiance,
            photon_current,
            jmax,
            illumination,
        }
    }
}

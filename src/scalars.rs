//! Scalar summary of a simulation.
//!
//! Percent values are spectral means over the wavelength grid, currents are
//! integrals against the photon current of the illumination spectrum.

use serde::Serialize;
use std::fmt;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_of_complete_budget() {
        let scalars = Scalars {
            absorbance: 30.0,
            reflectance: 10.0,
            transmittance: 60.0,
            ..Default::default()
        };
        assert!(scalars.missing().abs() < 1e-12);
    }

    #[test]
    fn display_lists_optional_rows_only_when_set() {
        let mut scalars = Scalars::default();
        assert!(!scalars.to_string().contains("Generated"));
        scalars.generated_current = Some(12.5);
        assert!(scalars.to_string().contains("Generated"));
    }
}

/// Deviation of computed curves from measured references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChiSquare {
    pub reflection: Option<f64>,
    pub transmission: Option<f64>,
    pub eqe: Option<f64>,
    pub psi: Option<f64>,
    pub delta: Option<f64>,
}

/// Stack-level scalars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scalars {
    pub absorbance: f64,    // %
    pub reflectance: f64,   // %
    pub transmittance: f64, // %
    pub absorbance_current: f64,    // mA/cm²
    pub reflectance_current: f64,   // mA/cm²
    pub transmittance_current: f64, // mA/cm²
    pub reflectance_diffuse: Option<f64>,
    pub transmittance_diffuse: Option<f64>,
    pub eqe_current: Option<f64>,
    pub generated_current: Option<f64>,
    pub absorbance_lambert_beer: Option<f64>,
    pub absorbance_lambert_beer_current: Option<f64>,
    pub illumination: f64, // W/m²
    pub jmax: f64,         // mA/cm²
    pub chi_square: ChiSquare,
    pub calc_time: f64, // s
}

impl Scalars {
    /// Share of the incident light not accounted for by R, T and A, in percent.
    pub fn missing(&self) -> f64 {
        100.0 - (self.absorbance + self.reflectance + self.transmittance)
    }
}

/// Absorption and collection attributed to one user layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerScalars {
    pub name: String,
    pub absorption: f64,         // %
    pub absorption_current: f64, // mA/cm²
    pub collection: Option<f64>,
    pub collection_current: Option<f64>,
}

fn optional(f: &mut fmt::Formatter<'_>, label: &str, value: Option<f64>) -> fmt::Result {
    match value {
        Some(v) => writeln!(f, "  {label:<26}{v:.6}"),
        None => Ok(()),
    }
}

impl fmt::Display for Scalars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scalars:")?;
        writeln!(f, "  Absorbance (%):           {:.6}", self.absorbance)?;
        writeln!(f, "  Reflectance (%):          {:.6}", self.reflectance)?;
        writeln!(f, "  Transmittance (%):        {:.6}", self.transmittance)?;
        writeln!(f, "  Absorbance (mA/cm²):      {:.6}", self.absorbance_current)?;
        writeln!(f, "  Reflectance (mA/cm²):     {:.6}", self.reflectance_current)?;
        writeln!(f, "  Transmittance (mA/cm²):   {:.6}", self.transmittance_current)?;
        optional(f, "Diffuse R (%):", self.reflectance_diffuse)?;
        optional(f, "Diffuse T (%):", self.transmittance_diffuse)?;
        optional(f, "EQE current (mA/cm²):", self.eqe_current)?;
        optional(f, "Generated (mA/cm²):", self.generated_current)?;
        optional(f, "Absorbance LB (%):", self.absorbance_lambert_beer)?;
        optional(f, "Absorbance LB (mA/cm²):", self.absorbance_lambert_beer_current)?;
        optional(f, "Chi square R:", self.chi_square.reflection)?;
        optional(f, "Chi square T:", self.chi_square.transmission)?;
        optional(f, "Chi square EQE:", self.chi_square.eqe)?;
        optional(f, "Chi square psi:", self.chi_square.psi)?;
        optional(f, "Chi square delta:", self.chi_square.delta)?;
        writeln!(f, "  Illumination (W/m²):      {:.6}", self.illumination)?;
        writeln!(f, "  Jmax (mA/cm²):            {:.6}", self.jmax)?;
        writeln!(f, "  Other (%):                {:.6}", self.missing())?;
        writeln!(f, "  Calc. time (s):           {:.3}", self.calc_time)
    }
}

impl fmt::Display for LayerScalars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<20} A {:>9.4} %  {:>9.4} mA/cm²",
            self.name, self.absorption, self.absorption_current
        )?;
        if let (Some(c), Some(j)) = (self.collection, self.collection_current) {
            write!(f, "  C {c:>9.4} %  {j:>9.4} mA/cm²")?;
        }
        Ok(())
    }
}

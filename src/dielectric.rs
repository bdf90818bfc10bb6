//! Parametric dielectric functions built from oscillator models.
//!
//! Drude and Lorentz terms are evaluated as complex permittivities directly.
//! The remaining models define only the imaginary part; the real part follows
//! from a numerical Kramers-Kronig transform over the evaluated energy range.

use nalgebra::Complex;
use ndarray::Array1;
use serde::Deserialize;
use std::f64::consts::PI;

use crate::config::EV_NM;
use crate::ema::nk_from_permittivity;
use crate::material::RawCri;

#[cfg(test)]
mod tests {
    use super::*;

    fn oscillator(model: OscillatorModel) -> Oscillator {
        Oscillator {
            model,
            amplitude: 20.0,
            center: 4.0,
            broadening: 1.0,
            band_gap: 1.5,
            p_energy: 1.0,
            transition: 0.0,
            urbach: 0.5,
        }
    }

    #[test]
    fn offset_only_is_transparent() {
        let df = DielectricFunction {
            e_offset: 2.25,
            energy_range: [1.0, 3.0],
            points: 50,
            oscillators: vec![],
        };
        let raw = df.evaluate();
        assert!(raw.n.iter().all(|&n| (n - 1.5).abs() < 1e-12));
        assert!(raw.k.iter().all(|&k| k.abs() < 1e-12));
        assert!(raw.wavelength.windows(2).all(|w| w[1] > w[0]));
        assert!((raw.wavelength[0] - EV_NM / 3.0).abs() < 1e-9);
    }

    #[test]
    fn tauc_lorentz_is_transparent_below_gap() {
        let df = DielectricFunction {
            e_offset: 1.0,
            energy_range: [0.5, 6.0],
            points: 200,
            oscillators: vec![oscillator(OscillatorModel::TaucLorentz)],
        };
        let raw = df.evaluate();
        // longest wavelength, 0.5 eV, below the 1.5 eV gap
        let last = raw.k.len() - 1;
        assert!(raw.k[last].abs() < 1e-12);
        assert!(raw.k[0] > 0.0);
    }

    #[test]
    fn lorentz_absorbs_near_resonance() {
        let osc = oscillator(OscillatorModel::Lorentz);
        let at_resonance = osc.permittivity(&Array1::from(vec![4.0]))[0];
        let far = osc.permittivity(&Array1::from(vec![1.0]))[0];
        assert!(at_resonance.im > far.im);
        assert!((at_resonance.im - 20.0).abs() < 1e-9);
    }

    #[test]
    fn kramers_kronig_of_zero_is_zero() {
        let energy = Array1::linspace(1.0, 5.0, 40);
        let e1 = kramers_kronig(&Array1::zeros(40), &energy);
        assert!(e1.iter().all(|v| v.abs() < 1e-15));
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OscillatorModel {
    Gaussian,
    Drude,
    Lorentz,
    TaucLorentz,
    CodyLorentz,
}

/// One oscillator term. Energies in eV.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Oscillator {
    pub model: OscillatorModel,
    pub amplitude: f64,
    /// Resonance energy (unused by Drude).
    #[serde(default)]
    pub center: f64,
    pub broadening: f64,
    /// Optical gap of Tauc-Lorentz and Cody-Lorentz terms.
    #[serde(default)]
    pub band_gap: f64,
    /// Cody-Lorentz transition energy between the Cody and Lorentz regimes.
    #[serde(default = "default_p_energy")]
    pub p_energy: f64,
    /// Cody-Lorentz offset of the Urbach tail onset above the gap.
    #[serde(default)]
    pub transition: f64,
    /// Cody-Lorentz Urbach energy.
    #[serde(default = "default_urbach")]
    pub urbach: f64,
}

fn default_p_energy() -> f64 {
    1.0
}

fn default_urbach() -> f64 {
    0.5
}

/// Dielectric function `e_offset + Σ oscillators` sampled over a photon-energy range.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DielectricFunction {
    #[serde(default = "default_offset")]
    pub e_offset: f64,
    /// Photon energy range in eV.
    #[serde(default = "default_energy_range")]
    pub energy_range: [f64; 2],
    #[serde(default = "default_points")]
    pub points: usize,
    #[serde(default)]
    pub oscillators: Vec<Oscillator>,
}

fn default_offset() -> f64 {
    1.0
}

fn default_energy_range() -> [f64; 2] {
    [0.5, 5.0]
}

fn default_points() -> usize {
    100
}

impl Oscillator {
    /// Complex permittivity contribution at each photon energy.
    pub fn permittivity(&self, energy: &Array1<f64>) -> Array1<Complex<f64>> {
        let (amp, en, br) = (self.amplitude, self.center, self.broadening);
        match self.model {
            OscillatorModel::Drude => {
                energy.mapv(|e| Complex::from(amp * br) / Complex::new(e * e, br * e))
            }
            OscillatorModel::Lorentz => {
                energy.mapv(|e| Complex::from(amp * br * en) / Complex::new(en * en - e * e, -br * e))
            }
            _ => {
                let e2 = self.imaginary_part(energy);
                let e1 = kramers_kronig(&e2, energy);
                Array1::from_iter(e1.iter().zip(e2.iter()).map(|(&re, &im)| Complex::new(re, im)))
            }
        }
    }

    fn imaginary_part(&self, energy: &Array1<f64>) -> Array1<f64> {
        let (amp, en, br, eg) = (self.amplitude, self.center, self.broadening, self.band_gap);
        match self.model {
            OscillatorModel::Gaussian => {
                let sigma = br / (2.0 * 2f64.ln().sqrt());
                energy.mapv(|e| {
                    amp * (-((e - en) / sigma).powi(2)).exp()
                        - amp * (-((e + en) / sigma).powi(2)).exp()
                })
            }
            OscillatorModel::TaucLorentz => energy.mapv(|e| {
                if e > eg {
                    amp * br * en * (e - eg).powi(2)
                        / (e * ((e * e - en * en).powi(2) + br * br * e * e))
                } else {
                    0.0
                }
            }),
            OscillatorModel::CodyLorentz => energy.mapv(|e| {
                let cody = (e - eg).powi(2) / ((e - eg).powi(2) + self.p_energy.powi(2));
                let lorentz = amp * en * br * e / ((e * e - en * en).powi(2) + br * br * e * e);
                if e > eg + self.transition {
                    cody * lorentz
                } else {
                    self.transition * cody * lorentz / e
                        * ((e - eg - self.transition) / self.urbach).exp()
                }
            }),
            OscillatorModel::Drude | OscillatorModel::Lorentz => Array1::zeros(energy.len()),
        }
    }
}

/// Real part from the imaginary part by a principal-value trapezoid sum,
/// skipping the singular node: e1(E) = 2/π P∫ E' e2(E') / (E'² − E²) dE'.
pub fn kramers_kronig(e2: &Array1<f64>, energy: &Array1<f64>) -> Array1<f64> {
    let n = energy.len();
    Array1::from_iter((0..n).map(|i| {
        let ei2 = energy[i] * energy[i];
        let integrand = |j: usize| energy[j] * e2[j] / (energy[j] * energy[j] - ei2);
        let mut sum = 0.0;
        for j in 0..n.saturating_sub(1) {
            if j == i || j + 1 == i {
                continue;
            }
            sum += 0.5 * (integrand(j) + integrand(j + 1)) * (energy[j + 1] - energy[j]);
        }
        2.0 / PI * sum
    }))
}

impl DielectricFunction {
    /// Raw (wavelength, n, k) data, wavelength ascending.
    pub fn evaluate(&self) -> RawCri {
        let energy = Array1::linspace(self.energy_range[0], self.energy_range[1], self.points.max(2));
        let mut e = Array1::from_elem(energy.len(), Complex::from(self.e_offset));
        for osc in &self.oscillators {
            e = e + osc.permittivity(&energy);
        }
        // ascending energy is descending wavelength
        let mut wavelength = Vec::with_capacity(energy.len());
        let mut n = Vec::with_capacity(energy.len());
        let mut k = Vec::with_capacity(energy.len());
        for (&en, &eps) in energy.iter().zip(e.iter()).rev() {
            let (ni, ki) = nk_from_permittivity(eps);
            wavelength.push(EV_NM / en);
            n.push(ni);
            k.push(ki);
        }
        RawCri { wavelength, n, k }
    }
}

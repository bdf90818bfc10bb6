//! Refractive index of graded-composition sub-layers.

use ndarray::Array1;

use crate::config::EV_NM;
use crate::errors::{Result, StackError};
use crate::helpers::interp_or_nan;


/// Reference index of one composition, already on the master grid.
#[derive(Debug, Clone)]
pub struct GradingCurve {
    pub fraction: f64,
    /// Band gap in eV.
    pub band_gap: f64,
    pub n: Array1<f64>,
    pub k: Array1<f64>,
}

/// Reference curves of a graded material ordered by composition fraction.
#[derive(Debug, Clone)]
pub struct GradingTable {
    layer: String,
    grid: Array1<f64>,
    curves: Vec<GradingCurve>,
}

impl GradingTable {
    pub fn new(layer: &str, grid: Array1<f64>, mut curves: Vec<GradingCurve>) -> Result<Self> {
        if curves.is_empty() {
            return Err(StackError::configuration(format!(
                "graded layer '{layer}' has no reference curves"
            )));
        }
        curves.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        if let Some(pair) = curves.windows(2).find(|w| w[0].fraction == w[1].fraction) {
            return Err(StackError::configuration(format!(
                "graded layer '{layer}' lists composition {} more than once",
                pair[0].fraction
            )));
        }
        Ok(Self {
            layer: layer.to_string(),
            grid,
            curves,
        })
    }

    /// Index of composition `fraction`, either band-gap shifted (`advanced`)
    /// or linearly interpolated across composition.
    pub fn resolve(&self, fraction: f64, advanced: bool) -> Result<(Array1<f64>, Array1<f64>)> {
        if let Some(curve) = self.curves.iter().find(|c| (c.fraction - fraction).abs() < 1e-9) {
            return Ok((curve.n.clone(), curve.k.clone()));
        }
        let below = self.curves.iter().rposition(|c| c.fraction < fraction);
        let above = self.curves.iter().position(|c| c.fraction > fraction);
        let (lo, hi) = match (below, above) {
            (Some(lo), Some(hi)) => (&self.curves[lo], &self.curves[hi]),
            _ => {
                return Err(StackError::configuration(format!(
                    "composition {fraction} of graded layer '{}' lies outside its reference curves ({} - {})",
                    self.layer,
                    self.curves[0].fraction,
                    self.curves[self.curves.len() - 1].fraction
                )))
            }
        };
        if advanced {
            self.shifted_average(lo, hi, fraction)
        } else {
            let t = (fraction - lo.fraction) / (hi.fraction - lo.fraction);
            Ok((
                &lo.n + &((&hi.n - &lo.n) * t),
                &lo.k + &((&hi.k - &lo.k) * t),
            ))
        }
    }

    fn shifted_average(
        &self,
        lo: &GradingCurve,
        hi: &GradingCurve,
        fraction: f64,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        let shift = (hi.band_gap - lo.band_gap) * fraction;
        // photon energy grid, ascending
        let energy: Vec<f64> = self.grid.iter().rev().map(|w| EV_NM / w).collect();
        let shifted: Vec<f64> = energy.iter().map(|e| e + shift).collect();
        let on_energy = |values: &Array1<f64>| -> Vec<f64> {
            let fp: Vec<f64> = values.iter().rev().copied().collect();
            // back to the wavelength order of the grid
            energy.iter().rev().map(|&e| interp_or_nan(e, &shifted, &fp)).collect()
        };
        let mut curves = [on_energy(&lo.n), on_energy(&hi.n), on_energy(&lo.k), on_energy(&hi.k)];

        let len = self.grid.len();
        let valid: Vec<usize> = (0..len).filter(|&i| !curves[0][i].is_nan()).collect();
        let (first, last) = match (valid.first(), valid.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => {
                return Err(StackError::configuration(format!(
                    "band-gap shift of graded layer '{}' leaves no overlap with the wavelength grid",
                    self.layer
                )))
            }
        };
        for i in 0..len {
            if !curves[0][i].is_nan() {
                continue;
            }
            let source = if i < first {
                first
            } else if i > last {
                last
            } else {
                i - 1
            };
            curves[0][i] = curves[0][source];
            curves[1][i] = curves[1][source];
            curves[2][i] = 0.0;
            curves[3][i] = 0.0;
        }
        let [n1, n2, k1, k2] = curves;
        let n = Array1::from_iter(n1.iter().zip(&n2).map(|(a, b)| (a + b) / 2.0));
        let k = Array1::from_iter(k1.iter().zip(&k2).map(|(a, b)| (a + b) / 2.0));
        Ok((n, k))
    }
}

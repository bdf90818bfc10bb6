//! Depth-resolved intensity, absorption, collection and generation.
//!
//! Field intensity inside a layer follows from its partial system matrices.
//! Thin layers use the field form with interference; thick layers use the
//! intensity form (Jung et al., JAP 50, 2011, eqs. 18-20).

use nalgebra::{Complex, Matrix2};
use ndarray::{Array1, Array2, Axis};

use crate::config::{ELEMENTARY_CHARGE, PLANCK, SPEED_OF_LIGHT};
use crate::helpers::{bounded_exp, trapz, trapz_depth, trapz_wavelength};
use crate::stack::EffectiveLayer;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_matched_layer_has_unit_intensity() {
        let id = Matrix2::identity();
        let xi = Complex::new(0.02, 0.0);
        for x in [0.0, 25.0, 50.0] {
            assert!((thin_intensity(&id, &id, xi, 50.0, x, 1.0) - 1.0).abs() < 1e-12);
            assert!((thick_intensity(&id, &id, xi, 50.0, x, 1.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn thick_intensity_decays_exponentially() {
        let id = Matrix2::identity();
        let xi = Complex::new(0.02, 0.001);
        let i = thick_intensity(&id, &id, xi, 1000.0, 500.0, 1.0);
        assert!((i - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn standing_wave_above_mirror() {
        // perfect rear reflection with r = -1 leaves a node at the bottom
        let id = Matrix2::identity();
        let c = |re| Complex::new(re, 0.0);
        let rear = Matrix2::new(c(1.0), c(0.0), c(-1.0), c(1.0));
        let xi = Complex::new(std::f64::consts::PI / 100.0, 0.0);
        assert!(thin_intensity(&id, &rear, xi, 100.0, 100.0, 1.0) < 1e-20);
        assert!((thin_intensity(&id, &rear, xi, 100.0, 50.0, 1.0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn shares_sum_to_absorbance() {
        let wavelength = Array1::from(vec![400.0, 500.0]);
        let current = Array1::from(vec![1.0, 1.0]);
        let curves = vec![
            Array1::from(vec![0.1, 0.1]),
            Array1::from(vec![0.2, 0.2]),
            Array1::from(vec![0.3, 0.3]),
        ];
        let groups = vec![("a".to_string(), vec![0]), ("b".to_string(), vec![1, 2])];
        let shares = layerwise(&groups, &curves, total_integral(&curves, &wavelength), 0.6, &wavelength, &current);
        assert_eq!(shares[1].name, "b");
        assert!((shares[0].percent - 10.0).abs() < 1e-9);
        assert!((shares[1].percent - 50.0).abs() < 1e-9);
        assert!((shares[1].curve[0] - 0.5).abs() < 1e-12);
        assert!((shares[1].current - 50.0).abs() < 1e-9);
    }

    #[test]
    fn generated_current_of_uniform_profile() {
        let depth = Array1::from(vec![0.0, 1e7]);
        let profile = Array1::from(vec![1e17, 1e17]);
        let j = generated_current(&profile, &depth);
        assert!((j - 1e17 * ELEMENTARY_CHARGE * 1000.0).abs() < 1e-6);
    }
}

/// n·|E|² at depth `x` of a coherent layer.
pub fn thin_intensity(
    psi: &Matrix2<Complex<f64>>,
    pso: &Matrix2<Complex<f64>>,
    xi: Complex<f64>,
    thickness: f64,
    x: f64,
    n: f64,
) -> f64 {
    let i = Complex::<f64>::i();
    let down = bounded_exp(i * xi * x);
    let up = bounded_exp(i * xi * (2.0 * thickness - x));
    let round_trip = bounded_exp(2.0 * i * xi * thickness);
    let field = (pso[(0, 0)] * down + pso[(1, 0)] * up)
        / (psi[(0, 0)] * pso[(0, 0)] + psi[(0, 1)] * pso[(1, 0)] * round_trip);
    n * field.norm_sqr()
}

/// n·|E|² at depth `x` of an incoherent layer.
pub fn thick_intensity(
    psi: &Matrix2<Complex<f64>>,
    pso: &Matrix2<Complex<f64>>,
    xi: Complex<f64>,
    thickness: f64,
    x: f64,
    n: f64,
) -> f64 {
    let g = 2.0 * xi.im;
    let decay = |depth: f64| (-g * depth).exp();
    let value = (pso[(0, 0)] * decay(x) + pso[(1, 0)] * decay(2.0 * thickness - x))
        / (psi[(0, 0)] * pso[(0, 0)] + psi[(0, 1)] * pso[(1, 0)] * decay(2.0 * thickness));
    n * value.norm()
}

/// Specular intensity over depth and wavelength. Partial matrices must be set.
pub fn field_intensity(layer: &EffectiveLayer) -> Array2<f64> {
    let intensity = if layer.thick { thick_intensity } else { thin_intensity };
    Array2::from_shape_fn((layer.x.len(), layer.xi.len()), |(i, w)| {
        intensity(
            &layer.psi[w],
            &layer.pso[w],
            layer.xi[w],
            layer.thickness,
            layer.x[i],
            layer.n[w],
        )
    })
}

/// α·I over depth and wavelength.
pub fn absorbed(layer: &EffectiveLayer, intensity: &Array2<f64>) -> Array2<f64> {
    intensity * &layer.alpha
}

/// Absorbed intensity weighted by the collection profile.
pub fn collected(layer: &EffectiveLayer, absorbed: &Array2<f64>) -> Array2<f64> {
    absorbed * &layer.fc.view().insert_axis(Axis(1))
}

/// Integral over depth, one value per wavelength.
pub fn over_depth(values: &Array2<f64>, layer: &EffectiveLayer) -> Array1<f64> {
    trapz_depth(values, &layer.x)
}

/// Σ over layers of ∫ curve dλ.
pub fn total_integral(curves: &[Array1<f64>], wavelength: &Array1<f64>) -> f64 {
    curves.iter().map(|c| trapz(c.view(), wavelength.view())).sum()
}

/// One user layer's share of a per-layer spectral quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerShare {
    pub name: String,
    /// Sum of the member curves.
    pub curve: Array1<f64>,
    /// Share of the stack absorbance in percent.
    pub percent: f64,
    /// ∫ curve · photon current dλ in mA/cm².
    pub current: f64,
}

/// Aggregates effective-layer curves onto user layers. Each member contributes
/// ∫curve / `normalisation` · `absorbance` (a fraction) to the percent share.
pub fn layerwise(
    groups: &[(String, Vec<usize>)],
    curves: &[Array1<f64>],
    normalisation: f64,
    absorbance: f64,
    wavelength: &Array1<f64>,
    photon_current: &Array1<f64>,
) -> Vec<LayerShare> {
    groups
        .iter()
        .map(|(name, members)| {
            let mut curve = Array1::zeros(wavelength.len());
            let mut percent = 0.0;
            let mut current = 0.0;
            for &k in members {
                curve += &curves[k];
                if normalisation != 0.0 {
                    percent += trapz(curves[k].view(), wavelength.view()) / normalisation * absorbance * 100.0;
                }
                current += trapz((&curves[k] * photon_current).view(), wavelength.view());
            }
            LayerShare {
                name: name.clone(),
                curve,
                percent,
                current,
            }
        })
        .collect()
}

/// Generation rate in cm⁻³ s⁻¹ nm⁻¹ from absorbed (or collected) intensity.
pub fn generation(values: &Array2<f64>, irradiance: &Array1<f64>, wavelength: &Array1<f64>) -> Array2<f64> {
    // per cm² s nm², then per cm³
    let photons = irradiance * wavelength * 1e-13 / (PLANCK * SPEED_OF_LIGHT) * 1e7;
    values * &photons
}

/// Generation integrated over wavelength, one value per depth node.
pub fn generation_profile(generation: &Array2<f64>, wavelength: &Array1<f64>) -> Array1<f64> {
    trapz_wavelength(generation, wavelength)
}

/// Current in mA/cm² from a collected generation profile (cm⁻³ s⁻¹) over depth in nm.
pub fn generated_current(profile: &Array1<f64>, depth: &Array1<f64>) -> f64 {
    trapz(profile.view(), depth.view()) * ELEMENTARY_CHARGE * 1000.0 / 1e7
}

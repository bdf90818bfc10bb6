//! Interface matrices.
//!
//! Every boundary gets a coherent (field) and an incoherent (intensity) matrix
//! per wavelength. Haze at a rough boundary removes the diffusely scattered
//! fractions from the specular amplitudes through h_R = √(1 − H_R) and
//! h_T = √(1 − H_T).

use nalgebra::{Complex, Matrix2};

use crate::config::AMBIENT_INDEX;
use crate::fresnel::{amplitudes, Amplitudes, Damping};
use crate::settings::Polarization;
use crate::stack::{EffectiveStack, Haze, InterfaceMatrices};

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64) -> Complex<f64> {
        Complex::new(re, 0.0)
    }

    fn normal(n1: f64, n2: f64) -> (Amplitudes, Amplitudes) {
        let zero = c(0.0);
        (
            amplitudes(Polarization::S, c(n1), c(n2), zero, zero, None),
            amplitudes(Polarization::S, c(n2), c(n1), zero, zero, None),
        )
    }

    #[test]
    fn index_matched_interface_is_identity() {
        let (fw, bw) = normal(1.5, 1.5);
        let (coh, inc) = interface_pair(fw, bw, Haze::default());
        assert!((coh - Matrix2::identity()).norm() < 1e-15);
        assert!((inc - Matrix2::identity()).norm() < 1e-15);
    }

    #[test]
    fn incoherent_matrix_without_haze() {
        let (fw, bw) = normal(1.0, 1.5);
        let (_, inc) = interface_pair(fw, bw, Haze::default());
        let t2 = fw.t.norm_sqr();
        assert!((inc[(0, 0)].re - 1.0 / t2).abs() < 1e-12);
        assert!((inc[(1, 0)].re - 0.04 / t2).abs() < 1e-12);
        assert!((inc[(0, 1)].re + 0.04 / t2).abs() < 1e-12);
        let expected = ((fw.t * bw.t).norm_sqr() - (fw.r * bw.r).norm_sqr()) / t2;
        assert!((inc[(1, 1)].re - expected).abs() < 1e-12);
    }

    #[test]
    fn haze_reduces_specular_reflection() {
        let (fw, bw) = normal(1.0, 1.5);
        let (clear, _) = interface_pair(fw, bw, Haze::default());
        let (hazy, _) = interface_pair(fw, bw, Haze { r: 0.5, t: 0.0 });
        let r_clear = (clear[(1, 0)] / clear[(0, 0)]).norm();
        let r_hazy = (hazy[(1, 0)] / hazy[(0, 0)]).norm();
        assert!((r_hazy - r_clear * 0.5f64.sqrt()).abs() < 1e-12);
    }
}

/// Coherent and incoherent matrix of one boundary from the forward (`fw`, from
/// above) and backward (`bw`, from below) amplitudes.
pub fn interface_pair(
    fw: Amplitudes,
    bw: Amplitudes,
    haze: Haze,
) -> (Matrix2<Complex<f64>>, Matrix2<Complex<f64>>) {
    let hr = (1.0 - haze.r).sqrt();
    let ht = (1.0 - haze.t).sqrt();
    let (hr2, ht2) = (hr * hr, ht * ht);

    let tt = ht * fw.t;
    let rr = hr * fw.r;
    let coherent = Matrix2::new(
        Complex::from(1.0),
        rr,
        rr,
        ht2 + (hr2 - ht2) * fw.r * fw.r,
    ) / tt;

    let t2 = tt.norm_sqr();
    let r2 = rr.norm_sqr();
    let through = (ht2 * fw.t * bw.t).norm_sqr() - (hr2 * fw.r * bw.r).norm_sqr();
    let incoherent = Matrix2::new(1.0, -r2, r2, through).map(|v| Complex::new(v / t2, 0.0));

    (coherent, incoherent)
}

/// |r|² of a boundary, without roughness damping.
pub fn reflectance(
    pol: Polarization,
    n1: Complex<f64>,
    n2: Complex<f64>,
    theta1: Complex<f64>,
    theta2: Complex<f64>,
) -> f64 {
    amplitudes(pol, n1, n2, theta1, theta2, None).r.norm_sqr()
}

/// Interface matrices of a whole stack for one polarization.
#[derive(Debug, Clone, Default)]
pub struct InterfaceSet {
    /// Ambient to first layer.
    pub top: InterfaceMatrices,
    /// Below each layer, the last one into the exit ambient.
    pub below: Vec<InterfaceMatrices>,
}

/// Builds every interface of `stack`. The roughness of the layer below a
/// boundary damps its amplitudes when `fresnel_model` is set; its haze always applies.
pub fn build(stack: &EffectiveStack, pol: Polarization, fresnel_model: bool) -> InterfaceSet {
    let ambient = Complex::new(AMBIENT_INDEX, 0.0);
    let wavelengths = stack.wavelength.len();
    let count = stack.layers.len();

    let mut boundaries: Vec<InterfaceMatrices> = Vec::with_capacity(count + 1);
    for j in 0..=count {
        let upper = j.checked_sub(1).map(|i| &stack.layers[i]);
        let lower = stack.layers.get(j);
        let mut matrices = InterfaceMatrices {
            coherent: Vec::with_capacity(wavelengths),
            incoherent: Vec::with_capacity(wavelengths),
        };
        let haze = lower.map_or(Haze::default(), |l| l.haze);
        let sigma = lower.map_or(0.0, |l| l.roughness_sigma);
        for w in 0..wavelengths {
            let (n1, theta1) = match upper {
                Some(layer) => (layer.cri[w], layer.theta[w]),
                None => (ambient, Complex::new(stack.angle.to_radians(), 0.0)),
            };
            let (n2, theta2) = match lower {
                Some(layer) => (layer.cri[w], layer.theta[w]),
                None => (ambient, stack.theta_out[w]),
            };
            let damping = (fresnel_model && sigma > 0.0).then_some(Damping {
                sigma,
                wavelength: stack.wavelength[w],
            });
            let fw = amplitudes(pol, n1, n2, theta1, theta2, damping);
            let bw = amplitudes(pol, n2, n1, theta2, theta1, damping);
            let (coherent, incoherent) = interface_pair(fw, bw, haze);
            matrices.coherent.push(coherent);
            matrices.incoherent.push(incoherent);
        }
        boundaries.push(matrices);
    }
    let below = boundaries.split_off(1);
    let top = boundaries.pop().unwrap_or_default();
    InterfaceSet { top, below }
}

//! Fresnel equations for planar interfaces between absorbing media.
//!
//! Amplitude coefficients are returned as diagonal matrices holding the
//! parallel (p) component at (0, 0) and the perpendicular (s) component at
//! (1, 1). Angles are complex so that absorbing media and evanescent waves
//! are handled by the same expressions.
//!
//! # Rough interfaces
//!
//! With the roughness Fresnel model enabled, a Gaussian height distribution of
//! RMS roughness σ damps the amplitudes (Katsidis & Siapkas, Appl. Opt. 41 (2002)):
//! - reflection by exp(−2 (2πσ n_i / λ)²)
//! - transmission by exp(−½ (2πσ / λ)² (n_j − n_i)²)

use nalgebra::{Complex, Matrix2, Vector2};
use std::f64::consts::PI;

use crate::settings::Polarization;

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64) -> Complex<f64> {
        Complex::new(re, 0.0)
    }

    #[test]
    fn normal_incidence_air_glass() {
        let zero = c(0.0);
        let r = refl(c(1.0), c(1.5), zero, zero);
        // p and s differ in sign convention at normal incidence
        assert!((r[(0, 0)] + r[(1, 1)]).norm() < 1e-15);
        assert!((r[(1, 1)].re + 0.2).abs() < 1e-15);
        let t = refr(c(1.0), c(1.5), zero, zero);
        assert!((t[(1, 1)].re - 0.8).abs() < 1e-15);
    }

    #[test]
    fn reversed_interface_flips_reflection() {
        let ti = c(0.4);
        let tt = crate::snell::get_theta_t(ti, c(1.0), c(2.0));
        for pol in [Polarization::S, Polarization::P] {
            let forward = amplitudes(pol, c(1.0), c(2.0), ti, tt, None);
            let backward = amplitudes(pol, c(2.0), c(1.0), tt, ti, None);
            assert!((forward.r + backward.r).norm() < 1e-14);
            // Stokes relation
            assert!((forward.t * backward.t - forward.r * backward.r - 1.0).norm() < 1e-14);
        }
    }

    #[test]
    fn brewster_angle_cancels_p_reflection() {
        let tb = c(1.5f64.atan());
        let tt = crate::snell::get_theta_t(tb, c(1.0), c(1.5));
        let r = amplitudes(Polarization::P, c(1.0), c(1.5), tb, tt, None);
        assert!(r.r.norm() < 1e-12);
    }

    #[test]
    fn roughness_damps_reflection() {
        let zero = c(0.0);
        let smooth = amplitudes(Polarization::S, c(1.0), c(1.5), zero, zero, None);
        let rough = amplitudes(
            Polarization::S,
            c(1.0),
            c(1.5),
            zero,
            zero,
            Some(Damping { sigma: 20.0, wavelength: 500.0 }),
        );
        let factor = (-2.0 * (2.0 * PI * 20.0 / 500.0f64).powi(2)).exp();
        assert!((rough.r - smooth.r * factor).norm() < 1e-14);
        assert!(rough.t.norm() < smooth.t.norm());
    }
}

/// Reflection amplitudes diag(r_p, r_s) from medium `n1` into `n2`.
pub fn refl(
    n1: Complex<f64>,
    n2: Complex<f64>,
    theta_i: Complex<f64>,
    theta_t: Complex<f64>,
) -> Matrix2<Complex<f64>> {
    let cti = theta_i.cos();
    let ctt = theta_t.cos();
    let f11 = (n2 * cti - n1 * ctt) / (n1 * ctt + n2 * cti);
    let f22 = (n1 * cti - n2 * ctt) / (n1 * cti + n2 * ctt);
    Matrix2::from_diagonal(&Vector2::new(f11, f22))
}

/// Transmission amplitudes diag(t_p, t_s) from medium `n1` into `n2`.
pub fn refr(
    n1: Complex<f64>,
    n2: Complex<f64>,
    theta_i: Complex<f64>,
    theta_t: Complex<f64>,
) -> Matrix2<Complex<f64>> {
    let cti = theta_i.cos();
    let ctt = theta_t.cos();
    let f11 = (2.0 * n1 * cti) / (n1 * ctt + n2 * cti);
    let f22 = (2.0 * n1 * cti) / (n1 * cti + n2 * ctt);
    Matrix2::from_diagonal(&Vector2::new(f11, f22))
}

/// Picks one polarization from a diagonal amplitude matrix.
pub fn component(matrix: &Matrix2<Complex<f64>>, pol: Polarization) -> Complex<f64> {
    match pol {
        Polarization::P => matrix[(0, 0)],
        Polarization::S => matrix[(1, 1)],
    }
}

/// Gaussian roughness of the interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Damping {
    /// RMS roughness in nm.
    pub sigma: f64,
    pub wavelength: f64,
}

/// Reflection and transmission amplitude for one polarization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amplitudes {
    pub r: Complex<f64>,
    pub t: Complex<f64>,
}

pub fn amplitudes(
    pol: Polarization,
    n1: Complex<f64>,
    n2: Complex<f64>,
    theta_i: Complex<f64>,
    theta_t: Complex<f64>,
    damping: Option<Damping>,
) -> Amplitudes {
    let mut r = component(&refl(n1, n2, theta_i, theta_t), pol);
    let mut t = component(&refr(n1, n2, theta_i, theta_t), pol);
    if let Some(Damping { sigma, wavelength }) = damping {
        let q = 2.0 * PI * sigma / wavelength;
        r *= (-2.0 * (q * n1).powi(2)).exp();
        t *= (-0.5 * q * q * (n2 - n1).powi(2)).exp();
    }
    Amplitudes { r, t }
}

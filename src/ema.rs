//! Effective-medium rules for roughness interlayers.

use nalgebra::Complex;
use ndarray::Array1;

use crate::config::EMA_FILL_FRACTION;
use crate::settings::EmaModel;

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(v: &[f64]) -> Array1<f64> {
        Array1::from(v.to_vec())
    }

    #[test]
    fn permittivity_round_trip() {
        let (n, k) = nk_from_permittivity(permittivity(3.5, 0.2));
        assert!((n - 3.5).abs() < 1e-12);
        assert!((k - 0.2).abs() < 1e-12);
    }

    #[test]
    fn identical_media_are_unchanged() {
        for model in [EmaModel::Mean, EmaModel::Bruggeman, EmaModel::MaxwellGarnett] {
            let (n, k) = mix(model, (&arr(&[2.0]), &arr(&[0.1])), (&arr(&[2.0]), &arr(&[0.1])));
            assert!((n[0] - 2.0).abs() < 1e-12, "{:?}", model);
            assert!((k[0] - 0.1).abs() < 1e-12, "{:?}", model);
        }
    }

    #[test]
    fn mixtures_lie_between_components() {
        let a = (arr(&[1.0]), arr(&[0.0]));
        let b = (arr(&[2.0]), arr(&[0.0]));
        for model in [EmaModel::Mean, EmaModel::Bruggeman, EmaModel::MaxwellGarnett] {
            let (n, k) = mix(model, (&a.0, &a.1), (&b.0, &b.1));
            assert!(n[0] > 1.0 && n[0] < 2.0, "{:?}: {}", model, n[0]);
            assert!(k[0].abs() < 1e-12);
        }
        let (n, _) = mix(EmaModel::Mean, (&a.0, &a.1), (&b.0, &b.1));
        assert_eq!(n[0], 1.5);
    }

    #[test]
    fn bruggeman_solves_the_balance_equation() {
        let ea = permittivity(1.0, 0.0);
        let eb = permittivity(3.0, 0.5);
        let e = bruggeman(ea, eb);
        let f = EMA_FILL_FRACTION;
        let residual = (1.0 - f) * (ea - e) / (ea + 2.0 * e) + f * (eb - e) / (eb + 2.0 * e);
        assert!(residual.norm() < 1e-12);
        assert!(e.im >= 0.0);
    }
}

/// Complex permittivity (n² − k²) + 2ink.
pub fn permittivity(n: f64, k: f64) -> Complex<f64> {
    Complex::new(n * n - k * k, 2.0 * n * k)
}

/// Refractive index and extinction coefficient of a permittivity.
pub fn nk_from_permittivity(e: Complex<f64>) -> (f64, f64) {
    let modulus = e.norm();
    ((0.5 * (e.re + modulus)).sqrt(), (0.5 * (-e.re + modulus)).max(0.0).sqrt())
}

/// Symmetric Bruggeman medium of `ea` and `eb`, the root with non-negative absorption.
pub fn bruggeman(ea: Complex<f64>, eb: Complex<f64>) -> Complex<f64> {
    let f = EMA_FILL_FRACTION;
    let b = ((2.0 - 3.0 * f) * ea + (3.0 * f - 1.0) * eb) / 4.0;
    let root = (b * b + ea * eb / 2.0).sqrt();
    let e = b + root;
    if e.im < 0.0 {
        b - root
    } else {
        e
    }
}

/// Maxwell-Garnett medium with `eb` as inclusions in host `ea`.
pub fn maxwell_garnett(ea: Complex<f64>, eb: Complex<f64>) -> Complex<f64> {
    let f = EMA_FILL_FRACTION;
    ea * (2.0 * f * (eb - ea) + eb + 2.0 * ea) / (2.0 * ea + eb - f * (eb - ea))
}

/// Mixes the index curves above (`a`) and below (`b`) a roughness interlayer.
pub fn mix(
    model: EmaModel,
    a: (&Array1<f64>, &Array1<f64>),
    b: (&Array1<f64>, &Array1<f64>),
) -> (Array1<f64>, Array1<f64>) {
    if model == EmaModel::Mean {
        return ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
    }
    let len = a.0.len();
    let mut n = Array1::zeros(len);
    let mut k = Array1::zeros(len);
    for i in 0..len {
        let ea = permittivity(a.0[i], a.1[i]);
        let eb = permittivity(b.0[i], b.1[i]);
        let e = match model {
            EmaModel::Bruggeman => bruggeman(ea, eb),
            _ => maxwell_garnett(ea, eb),
        };
        (n[i], k[i]) = nk_from_permittivity(e);
    }
    (n, k)
}

use nalgebra::Complex;
use ndarray::Array1;

use crate::config::SNELL_IMAG_TOLERANCE;

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64) -> Complex<f64> {
        Complex::new(re, 0.0)
    }

    #[test]
    fn normal_incidence() {
        let theta_t = get_theta_t(c(0.0), c(1.0), c(1.5));
        assert!(theta_t.norm() < 1e-15);
    }

    #[test]
    fn oblique_incidence_matches_real_snell() {
        let theta_i = 30f64.to_radians();
        let theta_t = get_theta_t(c(theta_i), c(1.0), c(1.5));
        let expected = (theta_i.sin() / 1.5).asin();
        assert!((theta_t.re - expected).abs() < 1e-12);
        assert_eq!(theta_t.im, 0.0);
    }

    #[test]
    fn total_internal_reflection_gives_complex_angle() {
        let theta_i = 60f64.to_radians();
        let theta_t = get_theta_t(c(theta_i), c(1.5), c(1.0));
        assert!(theta_t.im.abs() > 0.0);
        assert!(theta_t.is_finite());
    }

    #[test]
    fn chain_returns_to_ambient_angle() {
        let cri = vec![
            Array1::from_elem(3, Complex::new(2.0, 0.0)),
            Array1::from_elem(3, Complex::new(1.4, 0.0)),
        ];
        let (angles, exit) = angle_chain(&cri, 25.0);
        assert_eq!(angles.len(), 2);
        for theta in exit.iter() {
            assert!((theta.re - 25f64.to_radians()).abs() < 1e-12);
        }
    }
}

/// Complex refraction angle from medium `m1` into medium `m2`.
/// Imaginary parts of the sine below round-off are dropped before the arcsine.
pub fn get_theta_t(theta_i: Complex<f64>, m1: Complex<f64>, m2: Complex<f64>) -> Complex<f64> {
    let mut sin_t = m1 * theta_i.sin() / m2;
    if sin_t.im.abs() < SNELL_IMAG_TOLERANCE {
        sin_t.im = 0.0;
    }
    sin_t.asin()
}

/// Propagation angle in every layer and in the exit ambient, seeded by the
/// ambient angle of incidence in degrees. `cri` holds one index curve per layer.
pub fn angle_chain(
    cri: &[Array1<Complex<f64>>],
    angle_deg: f64,
) -> (Vec<Array1<Complex<f64>>>, Array1<Complex<f64>>) {
    let ambient = Complex::new(crate::config::AMBIENT_INDEX, 0.0);
    let len = cri.first().map_or(0, |c| c.len());
    let mut theta = Array1::from_elem(len, Complex::new(angle_deg.to_radians(), 0.0));
    let mut above = Array1::from_elem(len, ambient);
    let mut angles = Vec::with_capacity(cri.len());
    for layer in cri {
        theta = Array1::from_iter(
            (0..len).map(|w| get_theta_t(theta[w], above[w], layer[w])),
        );
        angles.push(theta.clone());
        above = layer.clone();
    }
    let exit = Array1::from_iter((0..len).map(|w| get_theta_t(theta[w], above[w], ambient)));
    (angles, exit)
}

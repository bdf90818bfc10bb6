//! Numeric helpers shared by the assembler and the optics engine.

use nalgebra::Complex;
use ndarray::{s, Array1, Array2, ArrayView1, Axis};

use crate::config::MAX_EXPONENT;

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_trapz() {
        // integral of sin(x) from 0 to pi
        let x = Array1::linspace(0.0, PI, 1000);
        let y = x.mapv(f64::sin);
        let result = trapz(y.view(), x.view());
        assert!((result - 2.0).abs() < 1e-5, "result: {}", result);

        // integral of x sin(x) from 0 to pi
        let y = &x * &x.mapv(f64::sin);
        let result = trapz(y.view(), x.view());
        assert!((result - PI).abs() < 1e-5, "result: {}", result);
    }

    #[test]
    fn trapz_single_point_is_zero() {
        let x = Array1::from(vec![3.0]);
        assert_eq!(trapz(x.view(), x.view()), 0.0);
    }

    #[test]
    fn depth_integration_per_wavelength() {
        let x = Array1::linspace(0.0, 2.0, 21);
        let mut a = Array2::zeros((21, 2));
        a.column_mut(0).fill(1.0);
        a.column_mut(1).assign(&x);
        let result = trapz_depth(&a, &x);
        assert!((result[0] - 2.0).abs() < 1e-12);
        assert!((result[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn grid_includes_end() {
        let grid = wavelength_grid(300.0, 310.0, 5.0);
        assert_eq!(grid.to_vec(), vec![300.0, 305.0, 310.0]);
        let grid = wavelength_grid(400.0, 400.0, 5.0);
        assert_eq!(grid.to_vec(), vec![400.0]);
    }

    #[test]
    fn clamped_interpolation() {
        let xp = [1.0, 2.0, 4.0];
        let fp = [10.0, 20.0, 0.0];
        assert_eq!(interp_clamped(0.0, &xp, &fp), 10.0);
        assert_eq!(interp_clamped(1.5, &xp, &fp), 15.0);
        assert_eq!(interp_clamped(3.0, &xp, &fp), 10.0);
        assert_eq!(interp_clamped(9.0, &xp, &fp), 0.0);
        assert!(interp_or_nan(9.0, &xp, &fp).is_nan());
        assert_eq!(interp_or_nan(4.0, &xp, &fp), 0.0);
    }

    #[test]
    fn resample_rejects_short_coverage() {
        let xp = [400.0, 500.0, 600.0];
        let fp = [1.0, 2.0, 3.0];
        let inside = Array1::from(vec![400.0, 450.0, 600.0]);
        let outside = Array1::from(vec![350.0, 450.0]);
        assert_eq!(resample(&xp, &fp, &inside).unwrap().to_vec(), vec![1.0, 1.5, 3.0]);
        assert!(resample(&xp, &fp, &outside).is_none());
    }

    #[test]
    fn exponent_is_bounded() {
        let z = bounded_exp(Complex::new(5000.0, 0.3));
        assert!(z.norm().is_finite());
        let z = bounded_exp(Complex::new(-5000.0, 0.3));
        assert_eq!(z.norm(), 0.0);
    }
}

/// Trapezoidal integral of `y` sampled at `x`.
pub fn trapz(y: ArrayView1<f64>, x: ArrayView1<f64>) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let dx = &x.slice(s![1..]) - &x.slice(s![..-1]);
    let y_avg = (&y.slice(s![1..]) + &y.slice(s![..-1])) / 2.0;
    (dx * y_avg).sum()
}

/// Integrates a depth x wavelength array over depth, one value per wavelength.
pub fn trapz_depth(values: &Array2<f64>, x: &Array1<f64>) -> Array1<f64> {
    values.map_axis(Axis(0), |lane| trapz(lane, x.view()))
}

/// Integrates a depth x wavelength array over wavelength, one value per depth node.
pub fn trapz_wavelength(values: &Array2<f64>, wavelength: &Array1<f64>) -> Array1<f64> {
    values.map_axis(Axis(1), |lane| trapz(lane, wavelength.view()))
}

/// Mean of a spectrum over the wavelength grid. A single-point grid returns the value itself.
pub fn spectral_mean(y: &Array1<f64>, wavelength: &Array1<f64>) -> f64 {
    let span = match (wavelength.first(), wavelength.last()) {
        (Some(first), Some(last)) if last > first => last - first,
        _ => return y.first().copied().unwrap_or(0.0),
    };
    trapz(y.view(), wavelength.view()) / span
}

/// Wavelength grid from `start` to `end` inclusive with spacing `step`.
pub fn wavelength_grid(start: f64, end: f64, step: f64) -> Array1<f64> {
    let count = ((end - start) / step + 1e-9).floor() as usize + 1;
    Array1::from_iter((0..count).map(|i| start + i as f64 * step))
}

/// Index of the last sample in ascending `xp` that is not above `x`.
fn bracket(x: f64, xp: &[f64]) -> usize {
    match xp.partition_point(|&v| v <= x) {
        0 => 0,
        i => (i - 1).min(xp.len().saturating_sub(2)),
    }
}

fn lerp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    if xp.len() == 1 {
        return fp[0];
    }
    let i = bracket(x, xp);
    let (x0, x1) = (xp[i], xp[i + 1]);
    if x1 == x0 {
        return fp[i];
    }
    fp[i] + (fp[i + 1] - fp[i]) * (x - x0) / (x1 - x0)
}

/// Linear interpolation on ascending `xp`, holding the end values outside the range.
pub fn interp_clamped(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    match (xp.first(), xp.last()) {
        (Some(&first), _) if x <= first => fp[0],
        (_, Some(&last)) if x >= last => fp[fp.len() - 1],
        (Some(_), Some(_)) => lerp(x, xp, fp),
        _ => f64::NAN,
    }
}

/// Linear interpolation on ascending `xp`, NaN outside the range.
pub fn interp_or_nan(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    match (xp.first(), xp.last()) {
        (Some(&first), Some(&last)) if x >= first && x <= last => lerp(x, xp, fp),
        _ => f64::NAN,
    }
}

/// Resamples `(xp, fp)` onto `grid`. Returns `None` if the grid leaves the data range.
pub fn resample(xp: &[f64], fp: &[f64], grid: &Array1<f64>) -> Option<Array1<f64>> {
    let values = grid.mapv(|x| interp_or_nan(x, xp, fp));
    if values.iter().any(|v| v.is_nan()) {
        None
    } else {
        Some(values)
    }
}

/// Sorts paired samples by abscissa.
pub fn sort_by_abscissa(x: Vec<f64>, y: Vec<f64>) -> (Vec<f64>, Vec<f64>) {
    let mut pairs: Vec<(f64, f64)> = x.into_iter().zip(y).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    pairs.into_iter().unzip()
}

/// Complex exponential with the real part of the exponent capped at [`MAX_EXPONENT`].
pub fn bounded_exp(z: Complex<f64>) -> Complex<f64> {
    Complex::new(z.re.min(MAX_EXPONENT), z.im).exp()
}

//! Ellipsometric angles from the coherent system matrices of both polarizations.

use log::info;
use nalgebra::Complex;
use ndarray::Array1;

use crate::interface;
use crate::result::Ellipsometry;
use crate::settings::Polarization;
use crate::stack::EffectiveStack;
use crate::system::field_system;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratios_give_45_degrees() {
        let rho = Complex::new(0.3, 0.1);
        let (psi, delta) = angles(rho, rho);
        assert!((psi - 45.0).abs() < 1e-12);
        assert!((delta.abs() - 180.0).abs() < 1e-12);
    }

    #[test]
    fn bare_substrate_at_normal_incidence() {
        // r_p = -r_s for the p-axis convention at normal incidence
        let rs = Complex::new(-0.2, 0.0);
        let (psi, delta) = angles(-rs, rs);
        assert!((psi - 45.0).abs() < 1e-12);
        assert!(delta.abs() < 1e-12);
    }
}

/// Ψ and Δ in degrees from the reflection ratios ρ = S10/S00 of both polarizations.
pub fn angles(rho_p: Complex<f64>, rho_s: Complex<f64>) -> (f64, f64) {
    let ratio = rho_p / rho_s;
    (ratio.norm().atan().to_degrees(), (-ratio).arg().to_degrees())
}

/// Computes Ψ and Δ without touching the stack's stored interfaces.
pub fn ellipsometry(stack: &EffectiveStack, fresnel_model: bool) -> Ellipsometry {
    info!("calculating ellipsometric angles...");
    let rho = |pol| {
        let set = interface::build(stack, pol, fresnel_model);
        (0..stack.wavelength.len())
            .map(|w| {
                let s = field_system(stack, &set, w);
                s[(1, 0)] / s[(0, 0)]
            })
            .collect::<Vec<_>>()
    };
    let rs = rho(Polarization::S);
    let rp = rho(Polarization::P);
    let (psi, delta): (Vec<f64>, Vec<f64>) = rp.iter().zip(&rs).map(|(&p, &s)| angles(p, s)).unzip();
    Ellipsometry {
        psi: Array1::from(psi),
        delta: Array1::from(delta),
    }
}

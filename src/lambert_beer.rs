//! Single-pass Lambert-Beer optics.
//!
//! Light enters with unit intensity, optionally reduced by (1 − R), and decays
//! as exp(−αx) through the layers without any reflection. Aggregation and
//! scalars follow the same conventions as the full transfer-matrix path.

use log::info;
use ndarray::{Array1, Array2};

use crate::absorption::{self, layerwise, total_integral};
use crate::helpers::{spectral_mean, trapz};
use crate::result::LambertBeer;
use crate::scalars::LayerScalars;
use crate::spectrum::Spectrum;
use crate::stack::EffectiveStack;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attenuation_carries_over_layers() {
        let alpha = [Array1::from(vec![0.01]), Array1::from(vec![0.0])];
        let x = [Array1::from(vec![0.0, 50.0, 100.0]), Array1::from(vec![0.0, 10.0])];
        let profiles = attenuate(
            Array1::from(vec![1.0]),
            alpha.iter().zip(x.iter()).map(|(a, x)| (a, x, x[x.len() - 1])),
        );
        assert!((profiles[0][[1, 0]] - (-0.5f64).exp()).abs() < 1e-12);
        assert!((profiles[1][[0, 0]] - (-1.0f64).exp()).abs() < 1e-12);
        assert_eq!(profiles[1][[0, 0]], profiles[1][[1, 0]]);
    }

    #[test]
    fn reflection_correction_scales_entry() {
        let alpha = Array1::from(vec![0.0]);
        let x = Array1::from(vec![0.0, 1.0]);
        let profiles = attenuate(Array1::from(vec![0.7]), std::iter::once((&alpha, &x, 1.0)));
        assert_eq!(profiles[0][[1, 0]], 0.7);
    }
}

/// Intensity profiles for layers given as (α, depth nodes, thickness), top first.
fn attenuate<'a>(
    mut entry: Array1<f64>,
    layers: impl Iterator<Item = (&'a Array1<f64>, &'a Array1<f64>, f64)>,
) -> Vec<Array2<f64>> {
    layers
        .map(|(alpha, x, thickness)| {
            let profile = Array2::from_shape_fn((x.len(), alpha.len()), |(i, w)| {
                entry[w] * (-alpha[w] * x[i]).exp()
            });
            entry = &entry * &alpha.mapv(|a| (-a * thickness).exp());
            profile
        })
        .collect()
}

/// Runs the single-pass model. `reflection` pre-scales the entering light by (1 − R).
pub fn lambert_beer(
    stack: &EffectiveStack,
    spectrum: &Spectrum,
    reflection: Option<&Array1<f64>>,
) -> LambertBeer {
    info!("calculating Lambert-Beer optics...");
    let wavelength = &stack.wavelength;
    let entry = match reflection {
        Some(r) => r.mapv(|r| 1.0 - r),
        None => Array1::ones(wavelength.len()),
    };
    let intensity = attenuate(
        entry,
        stack.layers.iter().map(|l| (&l.alpha, &l.x, l.thickness)),
    );

    let mut absorption_curves = Vec::with_capacity(stack.layers.len());
    let mut collection_curves = Vec::with_capacity(stack.layers.len());
    let mut profile = Vec::new();
    for (layer, intensity) in stack.layers.iter().zip(&intensity) {
        let absorbed = absorption::absorbed(layer, intensity);
        let collected = absorption::collected(layer, &absorbed);
        absorption_curves.push(absorption::over_depth(&absorbed, layer));
        collection_curves.push(absorption::over_depth(&collected, layer));
        let generation = absorption::generation(&collected, &spectrum.irradiance, wavelength);
        profile.extend(absorption::generation_profile(&generation, wavelength));
    }

    let absorption = absorption_curves
        .iter()
        .fold(Array1::zeros(wavelength.len()), |acc, c| acc + c);
    let eqe = collection_curves
        .iter()
        .fold(Array1::zeros(wavelength.len()), |acc, c| acc + c);
    let absorbance = spectral_mean(&absorption, wavelength);
    let absorbance_current = trapz((&absorption * &spectrum.photon_current).view(), wavelength.view());

    let groups = stack.groups();
    let normalisation = total_integral(&absorption_curves, wavelength);
    let absorbed = layerwise(&groups, &absorption_curves, normalisation, absorbance, wavelength, &spectrum.photon_current);
    let collected = layerwise(&groups, &collection_curves, normalisation, absorbance, wavelength, &spectrum.photon_current);
    let layers = absorbed
        .into_iter()
        .zip(collected)
        .map(|(a, c)| LayerScalars {
            name: a.name,
            absorption: a.percent,
            absorption_current: a.current,
            collection: Some(c.percent),
            collection_current: Some(c.current),
        })
        .collect();

    info!("Lambert-Beer absorbance {:.4} %", absorbance * 100.0);
    LambertBeer {
        intensity,
        absorption,
        eqe,
        absorbance: absorbance * 100.0,
        absorbance_current,
        collected_generation_profile: Array1::from(profile),
        layers,
    }
}

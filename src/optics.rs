//! The optics engine.
//!
//! [`Optics`] owns one assembled stack and computes the requested quantities in
//! dependency order: system composition, field intensity, absorption,
//! collection, then quantum efficiency and generation. Requesting a later stage
//! runs the missing earlier ones first.

use log::{debug, info};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use std::time::Instant;

use crate::absorption::{self, layerwise, total_integral};
use crate::diffuse::{self, DiffuseLight};
use crate::ellipsometry;
use crate::errors::Result;
use crate::helpers::{spectral_mean, trapz};
use crate::interface;
use crate::lambert_beer;
use crate::reference::{chi_square, References};
use crate::result::OpticsResult;
use crate::scalars::LayerScalars;
use crate::settings::{Calculations, Settings};
use crate::spectrum::Spectrum;
use crate::stack::EffectiveStack;
use crate::system;

/// Computation stages with data dependencies, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    Composed,
    Field,
    Absorbed,
    Collected,
}

/// Optics engine for one simulation invocation.
///
/// **Context**: Later quantities depend on earlier ones. Field intensity needs the
/// composed partials, absorption needs the field, and so on down the chain, while
/// callers often ask for a single late quantity only.
///
/// **How it Works**: Each `calc_*` method records the [`Stage`] it completes and
/// first runs whatever earlier stages are missing. Results accumulate in
/// [`OpticsResult`], which [`Optics::into_result`] hands back.
#[derive(Debug, Clone)]
pub struct Optics {
    pub stack: EffectiveStack,
    pub settings: Settings,
    pub spectrum: Spectrum,
    pub references: References,
    pub result: OpticsResult,
    diffuse: Option<DiffuseLight>,
    stage: Stage,
}

impl Optics {
    pub fn new(stack: EffectiveStack, settings: &Settings, spectrum: Spectrum, references: References) -> Self {
        let result = OpticsResult::new_empty(&stack);
        Self {
            stack,
            settings: settings.clone(),
            spectrum,
            references,
            result,
            diffuse: None,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs the missing stages up to `stage`.
    fn ensure(&mut self, stage: Stage) -> Result<()> {
        while self.stage < stage {
            match self.stage {
                Stage::Idle => self.calc_stack()?,
                Stage::Composed => self.calc_field_intensity()?,
                Stage::Field => self.calc_absorption()?,
                Stage::Absorbed => self.calc_collection()?,
                Stage::Collected => break,
            }
        }
        Ok(())
    }

    /// Runs every requested calculation, always including the stack spectra.
    pub fn run(&mut self, calculations: &Calculations) -> Result<()> {
        let start = Instant::now();
        self.calc_stack()?;
        if calculations.field {
            self.calc_field_intensity()?;
        }
        if calculations.absorption {
            self.calc_absorption()?;
        }
        if calculations.collection {
            self.calc_collection()?;
        }
        if calculations.quantum_efficiency {
            self.calc_qe()?;
        }
        if calculations.generation {
            self.calc_generation()?;
        }
        if calculations.ellipsometry {
            self.calc_ellipsometry();
        }
        if calculations.lambert_beer {
            self.calc_lambert_beer()?;
        }
        self.result.scalars.calc_time = start.elapsed().as_secs_f64();
        info!("optics finished in {:.3} s", self.result.scalars.calc_time);
        Ok(())
    }

    /// Interfaces, system matrix, diffuse light and the R/T/A spectra.
    pub fn calc_stack(&mut self) -> Result<()> {
        info!("calculating stack optics...");
        let pol = self.settings.polarization;
        let set = interface::build(&self.stack, pol, self.settings.roughness.fresnel_model);
        let composition = system::compose(&self.stack, &set)?;

        self.stack.top_interface = set.top;
        let parts = self
            .stack
            .layers
            .iter_mut()
            .zip(set.below)
            .zip(composition.psi.into_iter().zip(composition.pso));
        for ((layer, interface), (psi, pso)) in parts {
            layer.interface = interface;
            layer.psi = psi;
            layer.pso = pso;
        }

        let spectra = &mut self.result.spectra;
        spectra.reflection_specular = composition.reflection.clone();
        spectra.transmission_specular = composition.transmission.clone();
        spectra.reflection = composition.reflection;
        spectra.transmission = composition.transmission;
        spectra.absorption = composition.absorption;

        self.diffuse = None;
        if self.stack.haze_on {
            let light = diffuse::raytrace(&self.stack, pol, &self.settings.diffuse);
            spectra.reflection = &spectra.reflection + &light.reflection;
            spectra.transmission = &spectra.transmission + &light.transmission;
            spectra.absorption = (&spectra.reflection + &spectra.transmission).mapv(|v| 1.0 - v);
            spectra.reflection_diffuse = Some(light.reflection.clone());
            spectra.transmission_diffuse = Some(light.transmission.clone());
            self.result.diffuse_iterations = Some(light.iterations);
            self.diffuse = Some(light);
        } else {
            spectra.reflection_diffuse = None;
            spectra.transmission_diffuse = None;
            self.result.diffuse_iterations = None;
        }

        let wavelength = &self.stack.wavelength;
        let current = &self.spectrum.photon_current;
        let integrate = |y: &Array1<f64>| trapz((y * current).view(), wavelength.view());
        let spectra = &self.result.spectra;
        let scalars = &mut self.result.scalars;
        scalars.absorbance = spectral_mean(&spectra.absorption, wavelength) * 100.0;
        scalars.reflectance = spectral_mean(&spectra.reflection, wavelength) * 100.0;
        scalars.transmittance = spectral_mean(&spectra.transmission, wavelength) * 100.0;
        scalars.absorbance_current = integrate(&spectra.absorption);
        scalars.reflectance_current = integrate(&spectra.reflection);
        scalars.transmittance_current = integrate(&spectra.transmission);
        scalars.reflectance_diffuse = spectra
            .reflection_diffuse
            .as_ref()
            .map(|r| spectral_mean(r, wavelength) * 100.0);
        scalars.transmittance_diffuse = spectra
            .transmission_diffuse
            .as_ref()
            .map(|t| spectral_mean(t, wavelength) * 100.0);
        scalars.illumination = self.spectrum.illumination;
        scalars.jmax = self.spectrum.jmax;
        scalars.chi_square.reflection = self
            .references
            .reflection
            .as_ref()
            .map(|r| chi_square(&spectra.reflection, r));
        scalars.chi_square.transmission = self
            .references
            .transmission
            .as_ref()
            .map(|t| chi_square(&spectra.transmission, t));

        info!(
            "A {:.4} %, R {:.4} %, T {:.4} %",
            scalars.absorbance, scalars.reflectance, scalars.transmittance
        );
        self.stage = Stage::Composed;
        Ok(())
    }

    /// Local intensity |E|² in every layer, with diffuse light when haze is on.
    pub fn calc_field_intensity(&mut self) -> Result<()> {
        self.ensure(Stage::Composed)?;
        info!("calculating local field intensity...");
        let diffuse = self.diffuse.as_ref();
        // layers are independent of each other
        self.stack
            .layers
            .par_iter()
            .zip(self.result.layers.par_iter_mut())
            .enumerate()
            .for_each(|(k, (layer, result))| {
                result.specular = absorption::field_intensity(layer);
                result.diffuse = match diffuse {
                    Some(light) => light.intensity(k),
                    None => Array2::zeros(result.specular.raw_dim()),
                };
                result.intensity = &result.specular + &result.diffuse;
            });
        self.stage = Stage::Field;
        Ok(())
    }

    /// Absorbed intensity per layer and its share per user layer.
    pub fn calc_absorption(&mut self) -> Result<()> {
        self.ensure(Stage::Field)?;
        info!("calculating layerwise absorption...");
        for (layer, result) in self.stack.layers.iter().zip(&mut self.result.layers) {
            result.absorbed = absorption::absorbed(layer, &result.intensity);
            result.absorption = absorption::over_depth(&result.absorbed, layer);
        }

        let curves: Vec<Array1<f64>> = self.result.layers.iter().map(|l| l.absorption.clone()).collect();
        let shares = self.shares(&curves);
        self.result.layer_absorption = shares.iter().map(|s| (s.name.clone(), s.curve.clone())).collect();
        self.result.layer_scalars = shares
            .into_iter()
            .map(|s| LayerScalars {
                name: s.name,
                absorption: s.percent,
                absorption_current: s.current,
                collection: None,
                collection_current: None,
            })
            .collect();
        for scalars in &self.result.layer_scalars {
            debug!("{scalars}");
        }
        self.stage = Stage::Absorbed;
        Ok(())
    }

    /// Collected intensity per layer and its share per user layer.
    pub fn calc_collection(&mut self) -> Result<()> {
        self.ensure(Stage::Absorbed)?;
        info!("calculating layerwise collection...");
        for (layer, result) in self.stack.layers.iter().zip(&mut self.result.layers) {
            result.collected = absorption::collected(layer, &result.absorbed);
            result.collection = absorption::over_depth(&result.collected, layer);
        }

        let curves: Vec<Array1<f64>> = self.result.layers.iter().map(|l| l.collection.clone()).collect();
        let shares = self.shares(&curves);
        self.result.layer_collection = shares.iter().map(|s| (s.name.clone(), s.curve.clone())).collect();
        for (scalars, share) in self.result.layer_scalars.iter_mut().zip(shares) {
            scalars.collection = Some(share.percent);
            scalars.collection_current = Some(share.current);
        }
        self.stage = Stage::Collected;
        Ok(())
    }

    /// Layerwise shares normalised by the total absorption integral.
    fn shares(&self, curves: &[Array1<f64>]) -> Vec<absorption::LayerShare> {
        let wavelength = &self.stack.wavelength;
        let absorption: Vec<Array1<f64>> = self.result.layers.iter().map(|l| l.absorption.clone()).collect();
        layerwise(
            &self.stack.groups(),
            curves,
            total_integral(&absorption, wavelength),
            self.result.scalars.absorbance / 100.0,
            wavelength,
            &self.spectrum.photon_current,
        )
    }

    /// External and internal quantum efficiency.
    pub fn calc_qe(&mut self) -> Result<()> {
        self.ensure(Stage::Collected)?;
        info!("calculating quantum efficiency...");
        let wavelength = &self.stack.wavelength;
        let eqe = self
            .result
            .layers
            .iter()
            .fold(Array1::zeros(wavelength.len()), |acc, l| acc + l.collection.mapv(f64::abs));
        let iqe = &eqe / &self.result.spectra.absorption.mapv(f64::abs);
        let scalars = &mut self.result.scalars;
        scalars.eqe_current = Some(trapz((&eqe * &self.spectrum.photon_current).view(), wavelength.view()));
        scalars.chi_square.eqe = self.references.eqe.as_ref().map(|r| chi_square(&eqe, r));
        self.result.spectra.eqe = Some(eqe);
        self.result.spectra.iqe = Some(iqe);
        Ok(())
    }

    /// Generation rates over depth and the collected photocurrent.
    pub fn calc_generation(&mut self) -> Result<()> {
        self.ensure(Stage::Collected)?;
        info!("calculating generation profile...");
        let wavelength = &self.stack.wavelength;
        let irradiance = &self.spectrum.irradiance;
        for result in &mut self.result.layers {
            result.generation = absorption::generation(&result.absorbed, irradiance, wavelength);
            result.generation_profile = absorption::generation_profile(&result.generation, wavelength);
            result.collected_generation = absorption::generation(&result.collected, irradiance, wavelength);
            result.collected_generation_profile =
                absorption::generation_profile(&result.collected_generation, wavelength);
        }
        let profile = self.result.stack_profile(|l| &l.collected_generation_profile);
        let current = absorption::generated_current(&profile, &self.result.depth);
        info!("generated current {current:.4} mA/cm²");
        self.result.scalars.generated_current = Some(current);
        Ok(())
    }

    /// Ψ and Δ for both polarizations. The stored interfaces are left as they are.
    pub fn calc_ellipsometry(&mut self) {
        let angles = ellipsometry::ellipsometry(&self.stack, self.settings.roughness.fresnel_model);
        let chi = &mut self.result.scalars.chi_square;
        chi.psi = self.references.psi.as_ref().map(|r| chi_square(&angles.psi, r));
        chi.delta = self.references.delta.as_ref().map(|r| chi_square(&angles.delta, r));
        self.result.ellipsometry = Some(angles);
    }

    /// Single-pass variant, reflection-corrected when configured.
    pub fn calc_lambert_beer(&mut self) -> Result<()> {
        let reflection = if self.settings.lambert_beer.reflection_correction {
            match &self.references.reflection {
                Some(r) => Some(r.clone()),
                None => {
                    self.ensure(Stage::Composed)?;
                    Some(self.result.spectra.reflection.clone())
                }
            }
        } else {
            None
        };
        let lb = lambert_beer::lambert_beer(&self.stack, &self.spectrum, reflection.as_ref());
        self.result.scalars.absorbance_lambert_beer = Some(lb.absorbance);
        self.result.scalars.absorbance_lambert_beer_current = Some(lb.absorbance_current);
        self.result.lambert_beer = Some(lb);
        Ok(())
    }

    pub fn into_result(self) -> OpticsResult {
        self.result
    }
}

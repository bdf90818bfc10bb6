use ndarray::{Array1, Array2};

use crate::scalars::{LayerScalars, Scalars};
use crate::stack::EffectiveStack;

/// Derived arrays of one effective layer. Every field exists from the start and
/// stays empty until the stage computing it has run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerResult {
    pub name: String,
    pub parent: String,
    /// Specular |E|²·n, depth x wavelength.
    pub specular: Array2<f64>,
    /// Diffuse intensity, depth x wavelength.
    pub diffuse: Array2<f64>,
    /// Total intensity, specular plus diffuse.
    pub intensity: Array2<f64>,
    /// Absorbed intensity α·|E|², depth x wavelength.
    pub absorbed: Array2<f64>,
    /// Absorbed intensity integrated over depth, per wavelength.
    pub absorption: Array1<f64>,
    /// Absorbed intensity weighted by the collection profile.
    pub collected: Array2<f64>,
    pub collection: Array1<f64>,
    /// Generation rate per depth and wavelength (cm⁻³ s⁻¹ nm⁻¹).
    pub generation: Array2<f64>,
    /// Generation rate per depth (cm⁻³ s⁻¹).
    pub generation_profile: Array1<f64>,
    pub collected_generation: Array2<f64>,
    pub collected_generation_profile: Array1<f64>,
}

/// Spectra of the whole stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackSpectra {
    pub reflection: Array1<f64>,
    pub transmission: Array1<f64>,
    pub absorption: Array1<f64>,
    pub reflection_specular: Array1<f64>,
    pub transmission_specular: Array1<f64>,
    pub reflection_diffuse: Option<Array1<f64>>,
    pub transmission_diffuse: Option<Array1<f64>>,
    pub eqe: Option<Array1<f64>>,
    pub iqe: Option<Array1<f64>>,
}

/// Ellipsometric angles in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Ellipsometry {
    pub psi: Array1<f64>,
    pub delta: Array1<f64>,
}

/// Single-pass attenuation results.
#[derive(Debug, Clone, PartialEq)]
pub struct LambertBeer {
    /// Intensity per effective layer, depth x wavelength.
    pub intensity: Vec<Array2<f64>>,
    pub absorption: Array1<f64>,
    pub eqe: Array1<f64>,
    /// Spectral mean absorbance in percent.
    pub absorbance: f64,
    /// Absorbed photocurrent in mA/cm².
    pub absorbance_current: f64,
    /// Collected generation profile over the global depth (cm⁻³ s⁻¹).
    pub collected_generation_profile: Array1<f64>,
    pub layers: Vec<LayerScalars>,
}

/// Everything computed for one stack.
#[derive(Debug, Clone, PartialEq)]
pub struct OpticsResult {
    pub wavelength: Array1<f64>,
    /// Depth of every node from the stack top, in layer order.
    pub depth: Array1<f64>,
    pub spectra: StackSpectra,
    pub layers: Vec<LayerResult>,
    /// Absorption and collection spectra per user layer.
    pub layer_absorption: Vec<(String, Array1<f64>)>,
    pub layer_collection: Vec<(String, Array1<f64>)>,
    pub layer_scalars: Vec<LayerScalars>,
    pub ellipsometry: Option<Ellipsometry>,
    pub lambert_beer: Option<LambertBeer>,
    pub diffuse_iterations: Option<usize>,
    pub scalars: Scalars,
}

impl OpticsResult {
    /// Creates an empty result shaped after `stack`.
    pub fn new_empty(stack: &EffectiveStack) -> Self {
        let layers = stack
            .layers
            .iter()
            .map(|l| LayerResult {
                name: l.name.clone(),
                parent: l.parent.clone(),
                ..Default::default()
            })
            .collect();
        Self {
            wavelength: stack.wavelength.clone(),
            depth: stack.global_depth(),
            spectra: StackSpectra::default(),
            layers,
            layer_absorption: Vec::new(),
            layer_collection: Vec::new(),
            layer_scalars: Vec::new(),
            ellipsometry: None,
            lambert_beer: None,
            diffuse_iterations: None,
            scalars: Scalars::default(),
        }
    }

    /// Concatenates a per-layer depth profile over the whole stack.
    pub fn stack_profile(&self, profile: impl Fn(&LayerResult) -> &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(self.layers.iter().flat_map(|l| profile(l).iter().copied()))
    }
}

//! User-level layer definitions.
//!
//! A [`Layer`] is what a user describes: a name, a thickness, where its refractive
//! index comes from and how its depth is meshed. The stack assembler expands these
//! into effective layers.

use ndarray::Array1;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::{DIFFUSION_CONSTANT, THERMAL_VOLTAGE};
use crate::dielectric::DielectricFunction;
use crate::errors::{Result, StackError};


/// A user-described layer, top of the stack first.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Layer {
    pub name: String,
    /// Thickness in nm.
    pub thickness: f64,
    /// Incoherent (intensity-only) propagation.
    #[serde(default)]
    pub thick: bool,
    pub cri: CriSource,
    #[serde(default)]
    pub mesh: Meshing,
    /// Rough top interface.
    #[serde(default)]
    pub roughness: Option<Roughness>,
    #[serde(default)]
    pub collection: Collection,
}

impl Layer {
    pub fn new(name: &str, thickness: f64, cri: CriSource) -> Self {
        Self {
            name: name.to_string(),
            thickness,
            thick: false,
            cri,
            mesh: Meshing::default(),
            roughness: None,
            collection: Collection::default(),
        }
    }

    /// Builder-style switch to incoherent propagation.
    pub fn thick(mut self) -> Self {
        self.thick = true;
        self
    }

    pub fn with_roughness(mut self, roughness: Roughness) -> Self {
        self.roughness = Some(roughness);
        self
    }

    pub fn with_mesh(mut self, mesh: Meshing) -> Self {
        self.mesh = mesh;
        self
    }

    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.collection = collection;
        self
    }
}

/// Source of a layer's complex refractive index.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CriSource {
    Constant {
        n: f64,
        #[serde(default)]
        k: f64,
    },
    /// Entry of the material database directory.
    Material { name: String },
    /// Wavelength, n, k table.
    File { path: PathBuf },
    /// Wavelength, absorption coefficient table with a constant real index.
    Absorption { path: PathBuf, n: f64 },
    Graded(Grading),
    DielectricFunction(DielectricFunction),
}

/// Composition-graded material described by reference curves at fixed fractions.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Grading {
    pub profile: CompositionProfile,
    pub references: Vec<GradingReference>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GradingReference {
    /// Composition fraction in [0, 1].
    pub fraction: f64,
    /// Band gap in eV.
    pub band_gap: f64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompositionProfile {
    Constant { fraction: f64 },
    Linear { top: f64, bottom: f64 },
}

impl CompositionProfile {
    /// Composition fraction at every mesh node, clamped to [0, 1].
    pub fn profile(&self, x: &Array1<f64>, thickness: f64) -> Array1<f64> {
        let values = match *self {
            CompositionProfile::Constant { fraction } => Array1::from_elem(x.len(), fraction),
            CompositionProfile::Linear { top, bottom } => linear(x, thickness, top, bottom),
        };
        values.mapv(|v| v.clamp(0.0, 1.0))
    }
}

/// Depth mesh rule.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Meshing {
    /// Fixed number of evenly spaced nodes.
    Points { count: usize },
    /// Constant node spacing in nm.
    Spacing { step: f64 },
    /// Fine near both interfaces, growing geometrically toward the middle.
    Optimized,
}

impl Default for Meshing {
    fn default() -> Self {
        Meshing::Points { count: 100 }
    }
}

impl Meshing {
    /// Depth nodes from 0 to `thickness` inclusive.
    pub fn nodes(&self, thickness: f64) -> Array1<f64> {
        match *self {
            Meshing::Points { count } => Array1::linspace(0.0, thickness, count.max(2)),
            Meshing::Spacing { step } => {
                let mut x: Vec<f64> = (0..)
                    .map(|i| i as f64 * step)
                    .take_while(|&v| v < thickness)
                    .collect();
                if x.is_empty() {
                    x.push(0.0);
                }
                x.push(thickness);
                Array1::from(x)
            }
            Meshing::Optimized => {
                let mut x = vec![0.0];
                let mut node = 1.0;
                while node < thickness / 2.0 {
                    x.push(node);
                    node *= 1.1;
                }
                let mirrored: Vec<f64> = x.iter().rev().map(|v| thickness - v).collect();
                x.extend(mirrored);
                Array1::from(x)
            }
        }
    }
}

/// Rough top interface of a layer.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Roughness {
    /// RMS roughness in nm, also the thickness of an inserted interlayer.
    pub thickness: f64,
    /// Diffusely reflected fraction.
    #[serde(default)]
    pub haze_r: f64,
    /// Diffusely transmitted fraction.
    #[serde(default)]
    pub haze_t: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScrSide {
    Top,
    Bottom,
}

/// Collection efficiency over depth.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Collection {
    Constant {
        value: f64,
    },
    Linear {
        top: f64,
        bottom: f64,
    },
    /// Short-circuit collection from a diffusion length with a fully collecting
    /// space-charge region (Green, Prog. Photovolt. 17 (2009) 57, Eq. 22).
    Diffusion {
        /// Space-charge region width in nm.
        scr_width: f64,
        /// Minority carrier diffusion length in nm.
        diffusion_length: f64,
        /// Back-surface recombination velocity in cm/s.
        recombination_velocity: f64,
        scr_side: ScrSide,
        /// Band-gap grading in meV/µm.
        #[serde(default)]
        grading: f64,
    },
}

impl Default for Collection {
    fn default() -> Self {
        Collection::Constant { value: 1.0 }
    }
}

impl Collection {
    /// Collection efficiency at every mesh node, clamped to [0, 1].
    pub fn profile(&self, x: &Array1<f64>, thickness: f64) -> Array1<f64> {
        let fc = match *self {
            Collection::Constant { value } => Array1::from_elem(x.len(), value),
            Collection::Linear { top, bottom } => linear(x, thickness, top, bottom),
            Collection::Diffusion {
                scr_width,
                diffusion_length,
                recombination_velocity,
                scr_side,
                grading,
            } => match scr_side {
                ScrSide::Bottom => x.mapv(|v| if thickness - v <= scr_width { 1.0 } else { 0.0 }),
                ScrSide::Top => {
                    // reduced field [1/nm] from the band-gap gradient
                    let chi = 1e-6 * grading / THERMAL_VOLTAGE;
                    let l = diffusion_length / (1.0 + (chi * diffusion_length / 2.0).powi(2)).sqrt();
                    let s = recombination_velocity + chi * DIFFUSION_CONSTANT * 1e7 / 2.0;
                    let sl = 1e-7 * s * l / DIFFUSION_CONSTANT;
                    // cosh/sinh ratios scaled by exp(-thickness/l) to stay finite
                    let w = thickness / l;
                    let scaled = |u: f64| {
                        let plus = (u - w).exp();
                        let minus = (-u - w).exp();
                        ((plus + minus) / 2.0, (plus - minus) / 2.0)
                    };
                    let (cosh_w, sinh_w) = scaled(w);
                    let denominator = cosh_w + sl * sinh_w;
                    x.mapv(|v| {
                        let u = (thickness - (v - scr_width)) / l;
                        let (cosh_u, sinh_u) = scaled(u);
                        (chi * (v - scr_width) / 2.0).exp() * (cosh_u + sl * sinh_u) / denominator
                    })
                }
            },
        };
        fc.mapv(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) })
    }
}

fn linear(x: &Array1<f64>, thickness: f64, top: f64, bottom: f64) -> Array1<f64> {
    if thickness <= 0.0 {
        return Array1::from_elem(x.len(), top);
    }
    x.mapv(|v| top - (top - bottom) * v / thickness)
}

/// Ordered list of user layers, top first.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StackDefinition {
    pub layers: Vec<Layer>,
}

impl StackDefinition {
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        let stack = Self { layers };
        stack.validate()?;
        Ok(stack)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StackError::load_file("stack description", path, e.to_string()))?;
        Self::from_toml(&text, path)
    }

    pub fn from_toml(text: &str, origin: &Path) -> Result<Self> {
        let stack: StackDefinition = toml::from_str(text)
            .map_err(|e| StackError::load_file("stack description", origin, e.to_string()))?;
        stack.validate()?;
        Ok(stack)
    }

    fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(StackError::configuration("stack contains no layers"));
        }
        let mut names = HashSet::new();
        for layer in &self.layers {
            if !names.insert(layer.name.as_str()) {
                return Err(StackError::configuration(format!(
                    "layer name '{}' is used more than once",
                    layer.name
                )));
            }
            if !(layer.thickness >= 0.0) {
                return Err(StackError::configuration(format!(
                    "layer '{}' has negative thickness",
                    layer.name
                )));
            }
            if let Meshing::Spacing { step } = layer.mesh {
                if !(step.is_finite() && step > 0.0) {
                    return Err(StackError::configuration(format!(
                        "mesh spacing of layer '{}' must be positive",
                        layer.name
                    )));
                }
            }
            if let Some(rough) = &layer.roughness {
                let valid = |h: f64| (0.0..=1.0).contains(&h);
                if !valid(rough.haze_r) || !valid(rough.haze_t) {
                    return Err(StackError::configuration(format!(
                        "haze of layer '{}' must lie in [0, 1]",
                        layer.name
                    )));
                }
            }
        }
        Ok(())
    }
}

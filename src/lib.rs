//! Optical simulation of planar multilayer thin-film stacks.
//!
//! A user-level layer list is expanded by the [`stack`] assembler into effective
//! layers (roughness interlayers, graded sub-layers, resolved refractive indices),
//! then handed to the [`optics`] engine which composes a mixed coherent/incoherent
//! transfer-matrix system and derives reflectance, transmittance, absorption,
//! collection and generation quantities.

pub mod absorption;
pub mod config;
pub mod dielectric;
pub mod diffuse;
pub mod ellipsometry;
pub mod ema;
pub mod errors;
pub mod fresnel;
pub mod grading;
pub mod helpers;
pub mod interface;
pub mod lambert_beer;
pub mod layer;
pub mod material;
pub mod optics;
pub mod output;
pub mod reference;
pub mod result;
pub mod scalars;
pub mod settings;
pub mod simulation;
pub mod snell;
pub mod spectrum;
pub mod stack;
pub mod system;

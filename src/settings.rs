use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use config::{Config, Environment, File};
use ndarray::Array1;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::helpers::wavelength_grid;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let settings = load_default_config().unwrap();
        assert_eq!(settings.polarization, Polarization::S);
        assert_eq!(settings.grading.step, 5);
        assert_eq!(settings.diffuse.max_iterations, 100);
        assert!((settings.diffuse.min_intensity - 1e-5).abs() < 1e-12);
        assert_eq!(settings.roughness.ema_model, EmaModel::Bruggeman);
    }

    #[test]
    fn grid_follows_range() {
        let mut settings = load_default_config().unwrap();
        settings.wavelength = WavelengthRange {
            start: 400.0,
            end: 420.0,
            step: 10.0,
        };
        assert_eq!(settings.grid().to_vec(), vec![400.0, 410.0, 420.0]);
    }

    #[test]
    fn rejects_invalid_ranges() {
        let mut settings = load_default_config().unwrap();
        settings.grading.step = 0;
        assert!(validate_config(&settings).is_err());
        let mut settings = load_default_config().unwrap();
        settings.wavelength.step = -1.0;
        assert!(validate_config(&settings).is_err());
    }
}

/// Polarization of the incident plane wave.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Polarization {
    /// Electric field perpendicular to the plane of incidence.
    #[default]
    S,
    /// Electric field parallel to the plane of incidence.
    P,
}

/// Effective-medium rule for roughness interlayers.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EmaModel {
    Mean,
    #[default]
    Bruggeman,
    MaxwellGarnett,
}

/// Depth at which a graded sub-layer samples its composition.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompositionSampling {
    /// First mesh node of the slice.
    #[default]
    Start,
    /// Mesh node closest to the middle of the slice.
    Centre,
    /// Average over all nodes of the slice.
    Mean,
}

/// Master wavelength grid in nm, end inclusive.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WavelengthRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GradingSettings {
    /// Band-gap shifted interpolation between reference curves.
    #[serde(default = "default_true")]
    pub advanced: bool,
    /// Mesh nodes per graded sub-layer.
    #[serde(default = "default_grading_step")]
    pub step: usize,
    #[serde(default)]
    pub sampling: CompositionSampling,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RoughnessSettings {
    /// Insert effective-medium interlayers above rough layers.
    #[serde(default = "default_true")]
    pub ema_layer: bool,
    #[serde(default)]
    pub ema_model: EmaModel,
    /// Gaussian damping of Fresnel amplitudes at rough interfaces.
    #[serde(default)]
    pub fresnel_model: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiffuseSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_min_intensity")]
    pub min_intensity: f64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LambertBeerSettings {
    /// Scale the entering intensity by (1 - R).
    #[serde(default)]
    pub reflection_correction: bool,
}

/// Optional measured curves used for chi-square deviations.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ReferencePaths {
    pub reflection: Option<PathBuf>,
    pub transmission: Option<PathBuf>,
    pub eqe: Option<PathBuf>,
    pub psi: Option<PathBuf>,
    pub delta: Option<PathBuf>,
}

/// Which optics computations a run performs beyond the spectral scalars.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Calculations {
    #[serde(default = "default_true")]
    pub field: bool,
    #[serde(default = "default_true")]
    pub absorption: bool,
    #[serde(default = "default_true")]
    pub collection: bool,
    #[serde(default = "default_true")]
    pub quantum_efficiency: bool,
    #[serde(default = "default_true")]
    pub generation: bool,
    #[serde(default)]
    pub ellipsometry: bool,
    #[serde(default)]
    pub lambert_beer: bool,
}

/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Stack description (TOML with a `[[layers]]` list).
    pub stack: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_material_dir")]
    pub material_dir: PathBuf,
    /// Directory for per-layer `tmp_nk_<name>.txt` exports. Disabled when absent.
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
    pub wavelength: WavelengthRange,
    /// Angle of incidence in degrees.
    #[serde(default)]
    pub angle: f64,
    #[serde(default)]
    pub polarization: Polarization,
    /// Illumination intensity in percent of the spectrum.
    #[serde(default = "default_intensity")]
    pub intensity: f64,
    /// Illumination spectrum (wavelength, P dλ). A flat spectrum is used when absent.
    #[serde(default)]
    pub spectrum: Option<PathBuf>,
    pub grading: GradingSettings,
    pub roughness: RoughnessSettings,
    pub diffuse: DiffuseSettings,
    #[serde(default)]
    pub lambert_beer: LambertBeerSettings,
    #[serde(default)]
    pub references: ReferencePaths,
    pub calculations: Calculations,
}

fn default_true() -> bool {
    true
}

fn default_grading_step() -> usize {
    5
}

fn default_max_iterations() -> usize {
    100
}

fn default_min_intensity() -> f64 {
    1e-5
}

fn default_intensity() -> f64 {
    100.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_material_dir() -> PathBuf {
    PathBuf::from("materials")
}

impl Settings {
    /// Master wavelength grid in nm.
    pub fn grid(&self) -> Array1<f64> {
        wavelength_grid(self.wavelength.start, self.wavelength.end, self.wavelength.step)
    }

    /// Multiplier applied to the illumination spectrum.
    pub fn intensity_scale(&self) -> f64 {
        self.intensity / 100.0
    }
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let config: Settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("loading default configuration")?
        .try_deserialize()
        .context("deserializing default configuration")?;

    validate_config(&config)?;

    Ok(config)
}

pub fn load_config() -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    // Check if local config exists, if not use default
    let config_file = if local_config.exists() {
        log::info!("using local configuration: {:?}", local_config);
        local_config
    } else {
        log::info!("using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let mut config: Settings = Config::builder()
        .add_source(File::from(config_file).required(true))
        .add_source(Environment::with_prefix("filmtmm").separator("__"))
        .build()
        .context("loading configuration")?
        .try_deserialize()
        .context("deserializing configuration")?;

    // Parse command-line arguments and override values
    let args = CliArgs::parse();

    if let Some(stack) = args.stack {
        config.stack = stack;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(start) = args.start {
        config.wavelength.start = start;
    }
    if let Some(end) = args.end {
        config.wavelength.end = end;
    }
    if let Some(step) = args.step {
        config.wavelength.step = step;
    }
    if let Some(angle) = args.angle {
        config.angle = angle;
    }
    if let Some(pol) = args.pol {
        config.polarization = pol;
    }
    if let Some(intensity) = args.intensity {
        config.intensity = intensity;
    }
    if let Some(spectrum) = args.spectrum {
        config.spectrum = Some(spectrum);
    }
    if let Some(model) = args.ema {
        config.roughness.ema_model = model;
    }
    if let Some(max_iter) = args.max_iter {
        config.diffuse.max_iterations = max_iter;
    }
    if args.no_diffuse {
        config.diffuse.enabled = false;
    }
    if args.no_export {
        config.export_dir = None;
    }

    validate_config(&config)?;

    log::debug!("{:#?}", config);

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the FILMTMM_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        // When running through cargo (e.g. cargo run, cargo test)
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("FILMTMM_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }
    // Walk upward from the executable to the nearest directory holding "config"
    let exe_path = env::current_exe().context("locating the current executable")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(|dir| dir.to_path_buf())
        .context("could not find project root directory")
}

pub fn validate_config(config: &Settings) -> Result<()> {
    let range = &config.wavelength;
    ensure!(range.step > 0.0, "wavelength step must be greater than 0");
    ensure!(
        range.start > 0.0 && range.end >= range.start,
        "wavelength range must satisfy 0 < start <= end"
    );
    ensure!(config.grading.step > 0, "grading step must be at least one mesh node");
    ensure!(config.intensity >= 0.0, "illumination intensity must not be negative");
    ensure!(
        config.angle.abs() < 90.0,
        "angle of incidence must lie between -90 and 90 degrees"
    );
    ensure!(
        config.diffuse.min_intensity > 0.0,
        "diffuse minimum intensity must be greater than 0"
    );
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "filmtmm - transfer-matrix optics of thin-film stacks")]
pub struct CliArgs {
    /// Stack description file (TOML, one `[[layers]]` entry per layer, top to bottom).
    #[arg(short, long)]
    stack: Option<PathBuf>,

    /// Directory for result files.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// First wavelength of the grid in nm.
    #[arg(long)]
    start: Option<f64>,

    /// Last wavelength of the grid in nm.
    #[arg(long)]
    end: Option<f64>,

    /// Wavelength spacing in nm.
    #[arg(long)]
    step: Option<f64>,

    /// Angle of incidence in degrees.
    #[arg(short, long)]
    angle: Option<f64>,

    /// Polarization of the incident light.
    #[arg(short, long, value_enum)]
    pol: Option<Polarization>,

    /// Illumination intensity in percent of the spectrum.
    #[arg(long)]
    intensity: Option<f64>,

    /// Illumination spectrum file with columns wavelength and P dλ.
    #[arg(long)]
    spectrum: Option<PathBuf>,

    /// Effective-medium rule for roughness interlayers.
    #[arg(long, value_enum)]
    ema: Option<EmaModel>,

    /// Maximum number of diffuse raytracing sweeps.
    #[arg(long)]
    max_iter: Option<usize>,

    /// Disable diffuse (haze) raytracing.
    #[arg(long)]
    no_diffuse: bool,

    /// Skip the per-layer n,k debug export.
    #[arg(long)]
    no_export: bool,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stack: {}", self.stack.display())?;
        writeln!(
            f,
            "Wavelength: {} - {} nm, step {} nm",
            self.wavelength.start, self.wavelength.end, self.wavelength.step
        )?;
        writeln!(f, "Angle: {} deg, polarization {:?}", self.angle, self.polarization)?;
        writeln!(f, "Intensity: {} %", self.intensity)?;
        writeln!(
            f,
            "Grading: advanced {}, {} nodes per sub-layer, sampling {:?}",
            self.grading.advanced, self.grading.step, self.grading.sampling
        )?;
        writeln!(
            f,
            "Roughness: EMA layer {} ({:?}), Fresnel damping {}",
            self.roughness.ema_layer, self.roughness.ema_model, self.roughness.fresnel_model
        )?;
        writeln!(
            f,
            "Diffuse: enabled {}, max iterations {}, min intensity {:e}",
            self.diffuse.enabled, self.diffuse.max_iterations, self.diffuse.min_intensity
        )
    }
}

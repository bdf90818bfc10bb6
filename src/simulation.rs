use log::info;
use std::path::Path;
use std::time::Instant;

use crate::errors::Result;
use crate::layer::StackDefinition;
use crate::material::CriProvider;
use crate::optics::Optics;
use crate::output;
use crate::reference::References;
use crate::result::OpticsResult;
use crate::settings::Settings;
use crate::spectrum::Spectrum;
use crate::stack::StackAssembler;

/// A single simulation: one user stack, one set of settings.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub definition: StackDefinition,
    pub settings: Settings,
    pub result: Option<OpticsResult>,
}

impl Simulation {
    pub fn new(definition: StackDefinition, settings: Settings) -> Self {
        Self {
            definition,
            settings,
            result: None,
        }
    }

    /// Assembles a fresh stack and runs the configured calculations on it.
    pub fn run(&mut self, provider: &dyn CriProvider) -> Result<&OpticsResult> {
        let start = Instant::now();
        let stack = StackAssembler::new(&self.settings, provider).assemble(&self.definition)?;
        info!("stack assembled in {:.3} s", start.elapsed().as_secs_f64());

        let grid = &stack.wavelength;
        let scale = self.settings.intensity_scale();
        let spectrum = match &self.settings.spectrum {
            Some(path) => Spectrum::from_file(path, grid, scale)?,
            None => Spectrum::flat(grid, scale),
        };
        let references = References::load(&self.settings.references, grid)?;

        let mut optics = Optics::new(stack, &self.settings, spectrum, references);
        optics.run(&self.settings.calculations)?;
        Ok(self.result.insert(optics.into_result()))
    }

    /// Writes the result files into `dir`. Does nothing before [`Simulation::run`].
    pub fn writeup(&self, dir: &Path) -> Result<()> {
        match &self.result {
            Some(result) => output::writeup(dir, result),
            None => Ok(()),
        }
    }

    pub fn print_stats(&self) {
        if let Some(result) = &self.result {
            println!("{}", result.scalars);
            for layer in &result.layer_scalars {
                println!("  {layer}");
            }
        }
    }
}

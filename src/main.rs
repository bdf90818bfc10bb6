use anyhow::{Context, Result};
use filmtmm::layer::StackDefinition;
use filmtmm::material::MaterialLibrary;
use filmtmm::settings;
use filmtmm::simulation::Simulation;

fn main() -> Result<()> {
    env_logger::init();
    let settings = settings::load_config()?;
    log::info!("{settings}");

    let definition = StackDefinition::from_file(&settings.stack)
        .with_context(|| format!("reading stack {}", settings.stack.display()))?;
    let stack_dir = settings.stack.parent().map(|p| p.to_path_buf()).unwrap_or_default();
    let library = MaterialLibrary::new(&settings.material_dir, stack_dir);

    let output_dir = settings.output_dir.clone();
    let mut simulation = Simulation::new(definition, settings);
    simulation.run(&library)?;
    simulation.writeup(&output_dir)?;
    simulation.print_stats();
    Ok(())
}

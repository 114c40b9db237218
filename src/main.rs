#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

use std::{fs, path::Path};

use clap::Parser;
use color_eyre::eyre::{self, WrapErr};
use itertools::Itertools;
use rocketyard::{
    assembly::Assembly,
    catalog::Catalog,
    config::Config,
    flight::FlightSimulator,
    persist::SavedAssembly,
    staging::plan_stages,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod demo;
mod fly;

use cli::{Cli, Command, FlyArgs};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let catalog = load_catalog(cli.parts.as_deref())?;

    match cli.command {
        Command::Plan { assembly } => {
            let assembly = load_assembly(&assembly, &catalog, &config)?;
            print_plan(&assembly, &config);
        }
        Command::Fly(args) => fly(&args, &catalog, &config)?,
        Command::Demo { output } => {
            let assembly = demo::build(&catalog, &config.editor)?;
            save_assembly(&assembly, &output)?;
            print_plan(&assembly, &config);
            info!(path = %output.display(), "saved demo rocket");
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).wrap_err_with(|| format!("invalid config {}", path.display()))
}

fn load_catalog(extra: Option<&Path>) -> eyre::Result<Catalog> {
    let mut catalog = Catalog::stock();
    if let Some(path) = extra {
        let text = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read parts {}", path.display()))?;
        catalog.extend_from_ron_str(&text)?;
    }
    Ok(catalog)
}

fn load_assembly(path: &Path, catalog: &Catalog, config: &Config) -> eyre::Result<Assembly> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read assembly {}", path.display()))?;
    let saved = SavedAssembly::from_ron_str(&text)?;
    Assembly::from_saved(&saved, catalog, &config.editor)
        .wrap_err_with(|| format!("failed to load assembly {}", path.display()))
}

fn save_assembly(assembly: &Assembly, path: &Path) -> eyre::Result<()> {
    let text = assembly.to_saved().to_ron_string()?;
    fs::write(path, text).wrap_err_with(|| format!("failed to write {}", path.display()))
}

fn print_plan(assembly: &Assembly, config: &Config) {
    let plan = plan_stages(assembly);
    println!(
        "{} parts ({} live), mass {:.3} t, cost {:.0}, TWR {:.2}, delta-v {:.0} m/s",
        assembly.part_count(),
        assembly.live_parts().len(),
        assembly.total_mass(true),
        assembly.total_cost(true),
        assembly.thrust_to_weight(true, config.sim.gravity),
        assembly.estimate_delta_v(true),
    );
    for stage in &plan.stages {
        let decoupler = stage
            .decoupler
            .map_or_else(|| "none".to_owned(), |d| d.to_string());
        println!(
            "stage {}: decoupler {decoupler}, parts [{}], mass {:.3} t, thrust {:.0} kN, delta-v {:.0} m/s",
            stage.index,
            stage.parts.iter().join(" "),
            stage.mass,
            stage.thrust,
            stage.delta_v,
        );
    }
}

fn fly(args: &FlyArgs, catalog: &Catalog, config: &Config) -> eyre::Result<()> {
    let assembly = load_assembly(&args.assembly, catalog, config)?;
    let mut sim = FlightSimulator::new(assembly, config.sim.clone());

    let outcome = if args.realtime {
        tokio::runtime::Runtime::new()?.block_on(fly::run_realtime(&mut sim, args))?
    } else {
        fly::run(&mut sim, args)?
    };

    if let Some(telemetry) = sim.telemetry() {
        println!(
            "{outcome:?} after {:.2} s, max altitude {:.1} m, {:.1} m downrange, stage {}/{}",
            telemetry.time,
            telemetry.max_altitude,
            telemetry.horizontal_position,
            telemetry.stage + 1,
            telemetry.stage_count,
        );
    }

    if let Some(path) = &args.save {
        sim.write_back_fuel();
        save_assembly(sim.assembly(), path)?;
        info!(path = %path.display(), "saved flown assembly");
    }
    Ok(())
}

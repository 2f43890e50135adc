#![warn(clippy::unwrap_used, clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::doc_markdown
)]
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{self, WrapErr};
use config::DriverConfig;
use orrery::{
    bodies::SceneScale,
    catalogue::Catalogue,
    frame::Simulation,
    time::{Clock, SimTime},
};
use rand::{rngs::StdRng, SeedableRng};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod driver;

#[derive(Parser)]
#[command(name = "orrery")]
#[command(about = "Headless driver for the orrery frame loop")]
struct Cli {
    /// TOML settings; `orrery.toml` is used when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// RON catalogue replacing the built-in bodies and missions
    #[arg(long, global = true)]
    catalogue: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scripted frame loop (the default)
    Run {
        /// Override the number of frames
        #[arg(short, long)]
        frames: Option<u64>,
    },

    /// Print the catalogue as RON
    Catalogue,

    /// Print positions after a number of ticks at the start date
    Positions {
        #[arg(short, long, default_value = "0")]
        ticks: u64,
    },
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = DriverConfig::load(cli.config.as_deref())?;
    if cli.catalogue.is_some() {
        config.catalogue = cli.catalogue;
    }
    let catalogue = load_catalogue(&config)?;

    match cli.command.unwrap_or(Commands::Run { frames: None }) {
        Commands::Run { frames } => {
            if let Some(frames) = frames {
                config.frames = frames;
            }
            let clock = {
                let mut clock = Clock::new(config.start_time()?);
                clock.set_time_scale(config.time_scale);
                clock
            };
            let mut sim = Simulation::from_catalogue(catalogue, clock, config.simulation())?;
            info!(
                bodies = sim.registry().bodies().count(),
                missions = sim.registry().missions().count(),
                start = %sim.clock().now(),
                "starting"
            );
            driver::run(&mut sim, &config)?;
        }
        Commands::Catalogue => println!("{}", catalogue.to_ron()?),
        Commands::Positions { ticks } => {
            print_positions(catalogue, &config, ticks)?;
        }
    }
    Ok(())
}

fn load_catalogue(config: &DriverConfig) -> eyre::Result<Catalogue> {
    let mut catalogue = match &config.catalogue {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read {}", path.display()))?;
            Catalogue::from_ron(&text).wrap_err_with(|| format!("in {}", path.display()))?
        }
        None => Catalogue::builtin()?,
    };
    catalogue.scatter_moons(&mut StdRng::seed_from_u64(config.seed));
    Ok(catalogue)
}

fn print_positions(catalogue: Catalogue, config: &DriverConfig, ticks: u64) -> eyre::Result<()> {
    let scale = SceneScale::new(config.au_scale);
    let mut registry = catalogue.into_registry(scale)?;
    registry.set_planet_motion(config.planet_motion);
    let now: SimTime = config.start_time()?;
    for _ in 0..ticks.max(1) {
        registry.advance(now);
    }
    println!("{now}, {} ticks", ticks.max(1));
    for id in registry.ids() {
        if let Some(p) = registry.position(id) {
            println!(
                "{id:>14} {:>12.4} {:>12.4} {:>12.4} {:>10.4} AU",
                p.x,
                p.y,
                p.z,
                p.norm() / scale.units_per_au
            );
        }
    }
    Ok(())
}

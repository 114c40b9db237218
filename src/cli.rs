use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rocketyard", version, about = "Build rockets from parts and fly them")]
pub struct Cli {
    /// TOML file overriding simulator and editor settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// RON file with part definitions to add to the stock catalog
    #[arg(long, global = true)]
    pub parts: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the stage plan of a saved assembly
    Plan {
        /// Saved assembly (RON)
        assembly: PathBuf,
    },
    /// Launch a saved assembly and report telemetry
    Fly(FlyArgs),
    /// Assemble a two-stage stock rocket and save it
    Demo {
        #[arg(default_value = "demo.ron")]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct FlyArgs {
    /// Saved assembly (RON)
    pub assembly: PathBuf,

    /// Throttle held for the whole flight, 0 to 1
    #[arg(long, default_value_t = 1.0)]
    pub throttle: f64,

    /// Lean from vertical in degrees, positive to the right
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub steering: f64,

    /// Give up after this many ticks
    #[arg(long, default_value_t = 30_000)]
    pub ticks: usize,

    /// Tick on a wall-clock timer instead of as fast as possible
    #[arg(long, default_value_t = false)]
    pub realtime: bool,

    /// Log telemetry every this many ticks
    #[arg(long, default_value_t = 50)]
    pub report_every: usize,

    /// Deploy parachutes once descending below this altitude (m)
    #[arg(long)]
    pub chute_below: Option<f64>,

    /// Save the flown assembly, with its remaining fuel, to this file
    #[arg(long)]
    pub save: Option<PathBuf>,
}

//! MCL SIM: a headless simulation tool for landmark-based Monte Carlo localization.
//!
//! A ground-truth agent drives through a toroidal world following a scripted list of motion
//! commands while a particle filter tracks it from noisy landmark ranges. Optionally the agent is
//! kidnapped (teleported to a random pose) mid-run to exercise the filter's recovery.
//!
//! You can run simulations either by:
//!   1. Loading all parameters from a configuration file (TOML/JSON/YAML)
//!   2. Using the built-in default scenario, optionally adjusted with command-line flags
//!
//! Use `mcl-sim config -o scenario.toml` to write a template configuration.

mod common;

use clap::{Args, Parser, Subcommand};
use common::{init_logger, validate_config_path};
use log::info;
use mcl::particle::{ParticleAveragingStrategy, ParticleResamplingStrategy};
use mcl::sim::{Simulation, SimulationConfig};
use std::error::Error;
use std::path::{Path, PathBuf};

const LONG_ABOUT: &str =
    "MCL SIM: A headless simulation tool for landmark-based Monte Carlo localization.

A ground-truth agent drives through a toroidal world following a scripted list of motion
commands while a particle filter tracks it from noisy ranges to a fixed set of landmarks.
The agent can be kidnapped (teleported to a random pose) mid-run to measure how quickly the
filter re-localizes.

You can run simulations either by:
  1. Loading all parameters from a configuration file (TOML/JSON/YAML)
  2. Using the built-in default scenario, optionally adjusted with command-line flags

Per-tick reports are logged at debug level; the run summary is printed on completion.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "A headless simulation tool for landmark-based Monte Carlo localization.", long_about = LONG_ABOUT)]
struct Cli {
    /// Load the scenario from a configuration file (TOML/JSON/YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Command to execute (defaults to `run`)
    #[command(subcommand)]
    command: Option<Command>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "run",
        about = "Run a localization scenario",
        long_about = "Run a localization scenario. The scenario comes from --config when given and from the built-in default otherwise; every flag below overrides the corresponding configuration value."
    )]
    Run(RunArgs),

    #[command(name = "config", about = "Generate a template configuration file")]
    CreateConfig(CreateConfigArgs),
}

/// Overrides applied on top of the loaded (or default) configuration
#[derive(Args, Clone, Debug, Default)]
struct RunArgs {
    /// Number of particles
    #[arg(long)]
    num_particles: Option<usize>,

    /// Percentage (0-100) of particles reset to random poses every cycle
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    percent_random: Option<u8>,

    /// RNG seed for the filter (the ground truth uses seed + 1)
    #[arg(long)]
    seed: Option<u64>,

    /// Forward motion noise standard deviation (world units)
    #[arg(long)]
    forward_noise: Option<f64>,

    /// Turn noise standard deviation (radians)
    #[arg(long)]
    turn_noise: Option<f64>,

    /// Range sensing noise standard deviation (world units)
    #[arg(long)]
    sense_noise: Option<f64>,

    /// Resampling strategy
    #[arg(long, value_enum)]
    resampling: Option<ParticleResamplingStrategy>,

    /// Pose estimation strategy
    #[arg(long, value_enum)]
    estimator: Option<ParticleAveragingStrategy>,

    /// Tick before which the ground truth is kidnapped
    #[arg(long, conflicts_with = "no_kidnap")]
    kidnap_at: Option<usize>,

    /// Disable the scheduled kidnapping
    #[arg(long)]
    no_kidnap: bool,
}

/// Arguments for create-config command
#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output file path for the config file
    /// File extension determines format: .json, .yaml/.yml, or .toml (recommended)
    #[arg(short, long, value_parser)]
    output: PathBuf,
}

/// Apply command-line overrides to a configuration. Noise overrides apply to both the filter and
/// the ground truth.
fn apply_overrides(config: &mut SimulationConfig, args: &RunArgs) {
    if let Some(n) = args.num_particles {
        config.filter.num_particles = n;
    }
    if let Some(percent) = args.percent_random {
        config.filter.percent_random_particles = percent;
    }
    if let Some(seed) = args.seed {
        config.filter.seed = Some(seed);
    }
    if let Some(noise) = args.forward_noise {
        config.filter.noise.forward_noise = noise;
        config.truth_noise.forward_noise = noise;
    }
    if let Some(noise) = args.turn_noise {
        config.filter.noise.turn_noise = noise;
        config.truth_noise.turn_noise = noise;
    }
    if let Some(noise) = args.sense_noise {
        config.filter.noise.sense_noise = noise;
        config.truth_noise.sense_noise = noise;
    }
    if let Some(strategy) = args.resampling {
        config.filter.resampling_strategy = strategy;
    }
    if let Some(strategy) = args.estimator {
        config.filter.averaging_strategy = strategy;
    }
    if args.no_kidnap {
        config.kidnap_at_tick = None;
    } else if let Some(tick) = args.kidnap_at {
        config.kidnap_at_tick = Some(tick);
    }
}

/// Load the scenario, apply overrides, run it and print the summary
fn run_simulation(config_path: Option<&Path>, args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match config_path {
        Some(path) => {
            validate_config_path(path)?;
            info!("Loading configuration from {}", path.display());
            SimulationConfig::from_file(path)?
        }
        None => {
            info!("No configuration file given, using the default scenario");
            SimulationConfig::default()
        }
    };
    apply_overrides(&mut config, args);
    info!(
        "Running {} ticks with {} particles ({:?} resampling, {:?} estimate)",
        config.total_ticks(),
        config.filter.num_particles,
        config.filter.resampling_strategy,
        config.filter.averaging_strategy
    );

    let mut simulation = Simulation::new(config)?;
    let summary = simulation.run()?;
    println!("{summary}");
    Ok(())
}

/// Write the default scenario as a template configuration file
fn create_config_file(args: &CreateConfigArgs) -> Result<(), Box<dyn Error>> {
    validate_config_path(&args.output)?;
    common::ensure_parent_dir(&args.output)?;
    SimulationConfig::default().to_file(&args.output)?;
    println!("Template configuration written to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    match cli.command {
        Some(Command::Run(args)) => run_simulation(cli.config.as_deref(), &args),
        Some(Command::CreateConfig(args)) => create_config_file(&args),
        None => run_simulation(cli.config.as_deref(), &RunArgs::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::tempdir;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::parse_from([
            "mcl-sim",
            "run",
            "--num-particles",
            "250",
            "--resampling",
            "multinomial",
            "--estimator",
            "weighted-average",
            "--no-kidnap",
        ]);
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected the run subcommand");
        };
        assert_eq!(args.num_particles, Some(250));
        assert_eq!(args.resampling, Some(ParticleResamplingStrategy::Multinomial));
        assert_eq!(args.estimator, Some(ParticleAveragingStrategy::WeightedAverage));
        assert!(args.no_kidnap);
    }

    #[test]
    fn test_percent_random_is_bounded() {
        assert!(Cli::try_parse_from(["mcl-sim", "run", "--percent-random", "101"]).is_err());
    }

    #[test]
    fn test_overrides_reach_filter_and_truth() {
        let mut config = SimulationConfig::default();
        let args = RunArgs {
            num_particles: Some(64),
            seed: Some(9),
            sense_noise: Some(1.0),
            no_kidnap: true,
            ..Default::default()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.filter.num_particles, 64);
        assert_eq!(config.filter.seed, Some(9));
        assert_eq!(config.filter.noise.sense_noise, 1.0);
        assert_eq!(config.truth_noise.sense_noise, 1.0);
        assert_eq!(config.kidnap_at_tick, None);
    }

    #[test]
    fn test_create_config_then_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scenarios").join("template.toml");
        create_config_file(&CreateConfigArgs {
            output: path.clone(),
        })
        .unwrap();
        assert_eq!(
            SimulationConfig::from_file(&path).unwrap(),
            SimulationConfig::default()
        );
        let args = RunArgs {
            num_particles: Some(100),
            seed: Some(3),
            ..Default::default()
        };
        assert!(run_simulation(Some(&path), &args).is_ok());
    }

    #[test]
    fn test_create_config_rejects_unknown_format() {
        let dir = tempdir().unwrap();
        let args = CreateConfigArgs {
            output: dir.path().join("template.ini"),
        };
        assert!(create_config_file(&args).is_err());
    }
}

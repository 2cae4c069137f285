//! Headless simulation driver for landmark localization.
//!
//! This module provides:
//! - A configuration struct (`SimulationConfig`) readable and writable as JSON, YAML or TOML
//! - A `Simulation` that owns the ground-truth agent and the particle filter and advances both one
//!   tick at a time from scripted motion commands
//! - Optional kidnapping of the ground truth at a scheduled tick, with the number of ticks the
//!   filter needed to re-converge reported in the `SimulationSummary`
//!
//! Nothing is rendered or persisted: every tick is logged and summarized.
use std::f64::consts::PI;
use std::fmt::{self, Display};
use std::fs;
use std::io;
use std::path::Path;
use std::rc::Rc;

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::particle::{Particle, ParticleFilter, ParticleFilterConfig};
use crate::{LandmarkMap, MclError, NoiseModel, Pose, Result};

/// Landmark layout of the classic 80 by 80 localization course.
pub const DEFAULT_LANDMARKS: [[f64; 2]; 8] = [
    [10.0, 10.0],
    [50.0, 70.0],
    [25.0, 30.0],
    [10.0, 65.0],
    [5.0, 40.0],
    [50.0, 10.0],
    [70.0, 50.0],
    [70.0, 12.0],
];

/// A motion command issued `repeat` times in a row.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedCommand {
    /// Forward distance per tick (world units, >= 0)
    pub forward: f64,
    /// Turn angle per tick (radians)
    pub turn: f64,
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}
fn default_repeat() -> usize {
    1
}
impl ScriptedCommand {
    pub fn new(forward: f64, turn: f64, repeat: usize) -> ScriptedCommand {
        ScriptedCommand {
            forward,
            turn,
            repeat,
        }
    }
}

/// Everything needed to set up and run a localization scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Landmark coordinates, in measurement order
    pub landmarks: Vec<[f64; 2]>,
    /// Starting pose of the ground-truth agent
    pub initial_pose: Pose,
    /// Noise of the ground-truth agent's motion and sensing
    pub truth_noise: NoiseModel,
    /// Particle filter options, including the world extent and the random seed
    pub filter: ParticleFilterConfig,
    /// Motion script, executed in order
    pub commands: Vec<ScriptedCommand>,
    /// Tick (zero-based) before which the ground truth is teleported to a random pose
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kidnap_at_tick: Option<usize>,
    /// Position error (world units) under which the filter counts as converged
    pub convergence_threshold: f64,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            landmarks: DEFAULT_LANDMARKS.to_vec(),
            initial_pose: Pose::new(40.0, 40.0, 0.0),
            truth_noise: NoiseModel::default(),
            filter: ParticleFilterConfig::default(),
            commands: vec![ScriptedCommand::new(1.0, PI / 50.0, 80)],
            kidnap_at_tick: Some(40),
            convergence_threshold: 2.0,
        }
    }
}
impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        self.truth_noise.validate()?;
        if !self.initial_pose.is_finite() {
            return Err(MclError::InvalidConfig(format!(
                "initial pose must be finite (got {})",
                self.initial_pose
            )));
        }
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold > 0.0) {
            return Err(MclError::InvalidConfig(format!(
                "convergence_threshold must be positive (got {})",
                self.convergence_threshold
            )));
        }
        if let Some(landmark) = self
            .landmarks
            .iter()
            .find(|l| !(l[0].is_finite() && l[1].is_finite()))
        {
            return Err(MclError::InvalidConfig(format!(
                "landmark coordinates must be finite (got {landmark:?})"
            )));
        }
        if let Some(command) = self
            .commands
            .iter()
            .find(|c| !(c.forward.is_finite() && c.forward >= 0.0 && c.turn.is_finite()))
        {
            return Err(MclError::InvalidMotion {
                forward: command.forward,
                turn: command.turn,
            });
        }
        Ok(())
    }
    /// Total number of ticks in the motion script
    pub fn total_ticks(&self) -> usize {
        self.commands.iter().map(|c| c.repeat).sum()
    }
    /// Write the configuration as pretty JSON.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.write_as(path.as_ref(), ConfigFormat::Json)
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::read_as(path.as_ref(), ConfigFormat::Json)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.write_as(path.as_ref(), ConfigFormat::Yaml)
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::read_as(path.as_ref(), ConfigFormat::Yaml)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.write_as(path.as_ref(), ConfigFormat::Toml)
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::read_as(path.as_ref(), ConfigFormat::Toml)
    }
    /// Write the configuration in the format named by the file extension, see [`ConfigFormat`].
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        self.write_as(path, ConfigFormat::from_path(path)?)
    }
    /// Read the configuration in the format named by the file extension, see [`ConfigFormat`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        Self::read_as(path, ConfigFormat::from_path(path)?)
    }
    fn write_as(&self, path: &Path, format: ConfigFormat) -> io::Result<()> {
        let text = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(io::Error::other)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(io::Error::other)?,
            ConfigFormat::Toml => toml::to_string(self).map_err(io::Error::other)?,
        };
        fs::write(path, text)
    }
    fn read_as(path: &Path, format: ConfigFormat) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        match format {
            ConfigFormat::Json => serde_json::from_str(&text).map_err(io::Error::other),
            ConfigFormat::Yaml => serde_yaml::from_str(&text).map_err(io::Error::other),
            ConfigFormat::Toml => toml::from_str(&text).map_err(io::Error::other),
        }
    }
}

/// File extensions accepted for scenario files, matched case-insensitively
pub const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "json", "yaml", "yml"];

/// Serialization format of a scenario file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}
impl ConfigFormat {
    /// Pick the format from the extension of `path`.
    ///
    /// # Errors
    /// [`io::ErrorKind::InvalidInput`] naming the accepted extensions when the extension is
    /// missing or unknown.
    pub fn from_path(path: &Path) -> io::Result<ConfigFormat> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "configuration file '{}' must end in one of: .{}",
                    path.display(),
                    CONFIG_EXTENSIONS.join(", .")
                ),
            )),
        }
    }
}

/// Outcome of a single simulation tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    /// Zero-based tick index
    pub tick: usize,
    pub truth: Pose,
    pub estimate: Pose,
    /// Toroidal distance between the estimated and the true position
    pub position_error: f64,
    /// Effective number of particles after the weighting pass of this tick
    pub effective_sample_size: f64,
}
impl Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick {:>4}: truth ({:.2}, {:.2}, {:.3}) estimate ({:.2}, {:.2}, {:.3}) error {:.3} n_eff {:.1}",
            self.tick,
            self.truth.x,
            self.truth.y,
            self.truth.theta,
            self.estimate.x,
            self.estimate.y,
            self.estimate.theta,
            self.position_error,
            self.effective_sample_size
        )
    }
}

/// Outcome of a complete scripted run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulationSummary {
    pub ticks: usize,
    /// Mean position error over every tick
    pub mean_error: f64,
    /// Position error of the last tick
    pub final_error: f64,
    /// Tick before which the ground truth was kidnapped, if it was
    pub kidnapped_at: Option<usize>,
    /// Ticks needed after the kidnapping until the error first dropped under the convergence threshold
    pub recovery_ticks: Option<usize>,
}
impl Display for SimulationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ticks, mean error {:.3}, final error {:.3}",
            self.ticks, self.mean_error, self.final_error
        )?;
        match (self.kidnapped_at, self.recovery_ticks) {
            (Some(at), Some(ticks)) => {
                write!(f, ", kidnapped at tick {at}, recovered after {ticks} ticks")
            }
            (Some(at), None) => write!(f, ", kidnapped at tick {at}, never recovered"),
            _ => Ok(()),
        }
    }
}

/// Ground-truth agent plus particle filter, advanced in lockstep.
pub struct Simulation {
    config: SimulationConfig,
    landmarks: Rc<LandmarkMap>,
    truth: Particle,
    filter: ParticleFilter,
    rng: StdRng,
    tick: usize,
}
impl Simulation {
    /// Build the landmark map, the ground-truth agent and the filter from a configuration.
    ///
    /// The ground truth draws its noise from its own generator, seeded one past the filter seed, so
    /// that a seeded run is fully reproducible.
    pub fn new(config: SimulationConfig) -> Result<Simulation> {
        config.validate()?;
        let landmarks = Rc::new(LandmarkMap::from(&config.landmarks[..]));
        let world = config.filter.world;
        let (x, y) = world.wrap_position(config.initial_pose.x, config.initial_pose.y);
        let initial = Pose::new(x, y, config.initial_pose.normalized_heading());
        let truth = Particle::new(initial, 1.0, config.truth_noise);
        let rng = StdRng::seed_from_u64(
            config
                .filter
                .seed
                .map(|s| s.wrapping_add(1))
                .unwrap_or_else(rand::random),
        );
        let filter = ParticleFilter::new(config.filter.clone(), Rc::clone(&landmarks))?;
        info!(
            "Simulation ready: {} particles, {} landmarks, truth starts at {}",
            filter.num_particles(),
            landmarks.len(),
            initial
        );
        Ok(Simulation {
            config,
            landmarks,
            truth,
            filter,
            rng,
            tick: 0,
        })
    }
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
    pub fn truth(&self) -> &Particle {
        &self.truth
    }
    pub fn filter(&self) -> &ParticleFilter {
        &self.filter
    }
    pub fn landmarks(&self) -> &Rc<LandmarkMap> {
        &self.landmarks
    }
    /// Number of ticks executed so far
    pub fn ticks(&self) -> usize {
        self.tick
    }
    /// Teleport the ground truth to a uniformly random pose. The filter is not told.
    pub fn kidnap(&mut self) -> Pose {
        let pose = self.config.filter.world.random_pose(&mut self.rng);
        self.kidnap_to(pose);
        pose
    }
    /// Teleport the ground truth to `pose` (wrapped into the world). The filter is not told.
    pub fn kidnap_to(&mut self, pose: Pose) {
        let (x, y) = self.config.filter.world.wrap_position(pose.x, pose.y);
        let pose = Pose::new(x, y, pose.normalized_heading());
        info!("Kidnapping ground truth from {} to {}", self.truth.pose, pose);
        self.truth.set_pose(pose);
    }
    /// One full cycle: move the ground truth and every particle with the same command, measure
    /// from the ground truth, then weight, resample, randomize and estimate.
    pub fn tick(&mut self, forward: f64, turn: f64) -> Result<TickReport> {
        let world = self.config.filter.world;
        self.truth.propagate(forward, turn, &world, &mut self.rng)?;
        self.filter.move_particles(forward, turn)?;
        let measurement = self.truth.get_measurements(&self.landmarks, &mut self.rng)?;
        let estimate = self.filter.update(&measurement)?;
        let report = TickReport {
            tick: self.tick,
            truth: self.truth.pose,
            estimate,
            position_error: world.toroidal_distance(&estimate, &self.truth.pose),
            effective_sample_size: self.filter.state().effective_sample_size,
        };
        debug!("{report}");
        self.tick += 1;
        Ok(report)
    }
    /// Execute the whole motion script, kidnapping the ground truth when scheduled.
    pub fn run(&mut self) -> Result<SimulationSummary> {
        let commands = self.config.commands.clone();
        let kidnap_at = self.config.kidnap_at_tick;
        let threshold = self.config.convergence_threshold;
        let mut summary = SimulationSummary::default();
        let mut total_error = 0.0;
        for command in commands {
            for _ in 0..command.repeat {
                if kidnap_at == Some(self.tick) {
                    self.kidnap();
                    summary.kidnapped_at = Some(self.tick);
                }
                let report = self.tick(command.forward, command.turn)?;
                total_error += report.position_error;
                summary.ticks += 1;
                summary.final_error = report.position_error;
                if let Some(at) = summary.kidnapped_at {
                    if summary.recovery_ticks.is_none() && report.position_error < threshold {
                        summary.recovery_ticks = Some(report.tick + 1 - at);
                        info!(
                            "Re-converged {} ticks after the kidnapping (error {:.3})",
                            report.tick + 1 - at,
                            report.position_error
                        );
                    }
                }
            }
        }
        if summary.ticks > 0 {
            summary.mean_error = total_error / summary.ticks as f64;
        }
        info!("Simulation finished: {summary}");
        Ok(summary)
    }
}

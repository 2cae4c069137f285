//! Particle filter for landmark-based Monte Carlo localization.
//!
//! The [`Particle`] type plays two roles: the single ground-truth agent driven by the simulation and
//! each of the N pose hypotheses owned by the [`ParticleFilter`]. Both are plain values; resampling
//! copies particles and never aliases them, so two hypotheses drawn from the same parent evolve
//! independently afterwards.
//!
//! One filter cycle is
//! 1. [`ParticleFilter::move_particles`]: apply the command that moved the ground truth,
//! 2. [`ParticleFilter::calculate_weights`]: score every particle against the measurement taken after that motion,
//! 3. [`ParticleFilter::resample_particles`]: draw a new population proportional to the weights,
//! 4. [`ParticleFilter::randomize_n_particles`]: reset a fixed share of particles to random poses (kidnapping recovery),
//! 5. [`ParticleFilter::estimate_location`]: extract the best pose.
//!
//! Steps 2 to 5 are bundled in [`ParticleFilter::update`].
use std::f64::consts::TAU;
use std::fmt::{self, Debug, Display};
use std::rc::Rc;

use log::{debug, trace, warn};
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::measurements::{
    LIKELIHOOD_FLOOR, MeasurementModel, RangeMeasurement, check_finite, floor_likelihood,
    likelihood, log_likelihood,
};
use crate::{
    LandmarkMap, MclError, NoiseModel, Pose, Result, World, gaussian_noise, wrap_to_2pi,
    wrap_to_extent,
};

/// A weighted pose hypothesis (or the ground-truth agent itself).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub pose: Pose,
    /// Importance weight; only meaningful between a weighting pass and the next motion update
    pub weight: f64,
    pub noise: NoiseModel,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("x", &self.pose.x)
            .field("y", &self.pose.y)
            .field("theta", &self.pose.theta)
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(pose: Pose, weight: f64, noise: NoiseModel) -> Particle {
        Particle {
            pose,
            weight,
            noise,
        }
    }
    /// Teleport the particle. The weight is left untouched.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }
    /// Motion update: turn by `turn` (plus turn noise, only when `turn != 0`), then travel
    /// `forward` (plus forward noise, only when `forward > 0`) along the new heading, wrapping the
    /// position onto the torus.
    ///
    /// Rejects backwards or non-finite commands before touching the pose. Never changes the weight.
    pub fn propagate<R: Rng + ?Sized>(
        &mut self,
        forward: f64,
        turn: f64,
        world: &World,
        rng: &mut R,
    ) -> Result<()> {
        validate_command(forward, turn)?;
        let mut theta = self.pose.theta;
        if turn != 0.0 {
            theta += turn + gaussian_noise(self.noise.turn_noise, rng)?;
        }
        let theta = wrap_to_2pi(theta);
        let distance = if forward == 0.0 {
            0.0
        } else {
            forward + gaussian_noise(self.noise.forward_noise, rng)?
        };
        let (x, y) = world.wrap_position(
            self.pose.x + theta.cos() * distance,
            self.pose.y + theta.sin() * distance,
        );
        self.pose = Pose::new(x, y, theta);
        Ok(())
    }
    /// Sense every landmark: noiseless range plus `N(0, sense_noise)`, in landmark order.
    pub fn get_measurements<R: Rng + ?Sized>(
        &self,
        landmarks: &Rc<LandmarkMap>,
        rng: &mut R,
    ) -> Result<RangeMeasurement> {
        RangeMeasurement::sample(&self.pose, self.noise.sense_noise, Rc::clone(landmarks), rng)
    }
    /// Log-likelihood of `measurement` for this particle's pose and sensing noise
    pub fn log_likelihood<M: MeasurementModel + ?Sized>(&self, measurement: &M) -> Result<f64> {
        log_likelihood(measurement, &self.pose, self.noise.sense_noise)
    }
    /// Score the particle against `measurement`: the product of per-landmark Gaussian densities,
    /// floored at [`LIKELIHOOD_FLOOR`]. The result is stored as the particle's weight and returned.
    ///
    /// Fails without touching the weight when the particle's `sense_noise` is negative.
    pub fn measurement_prob<M: MeasurementModel + ?Sized>(
        &mut self,
        measurement: &M,
    ) -> Result<f64> {
        self.weight = likelihood(measurement, &self.pose, self.noise.sense_noise)?;
        Ok(self.weight)
    }
}

fn validate_command(forward: f64, turn: f64) -> Result<()> {
    if !(forward.is_finite() && forward >= 0.0 && turn.is_finite()) {
        return Err(MclError::InvalidMotion { forward, turn });
    }
    Ok(())
}

/// Check a weight vector against a population of `n` particles: same length, every entry finite
/// and non-negative, positive sum.
pub fn validate_weights(n: usize, weights: &[f64]) -> Result<()> {
    if weights.is_empty() {
        return Err(MclError::DegenerateWeights("empty weight vector".to_string()));
    }
    if weights.len() != n {
        return Err(MclError::PopulationMismatch {
            expected: n,
            actual: weights.len(),
        });
    }
    if let Some((i, w)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
    {
        return Err(MclError::DegenerateWeights(format!(
            "weight {i} is {w}, weights must be finite and non-negative"
        )));
    }
    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 {
        return Err(MclError::DegenerateWeights(
            "weights sum to zero".to_string(),
        ));
    }
    Ok(())
}

/// How a single pose is extracted from the weighted population.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ParticleAveragingStrategy {
    /// Pose of the heaviest particle, first one wins on ties
    #[default]
    HighestWeight,
    /// Weighted circular mean of every coordinate on the torus
    WeightedAverage,
}
impl ParticleAveragingStrategy {
    /// Estimate a pose from the population. `None` only for an empty population.
    pub fn estimate(&self, particles: &[Particle], world: &World) -> Option<Pose> {
        match self {
            ParticleAveragingStrategy::HighestWeight => Self::highest_weight_pose(particles),
            ParticleAveragingStrategy::WeightedAverage => {
                Self::weighted_average_pose(particles, world, false)
            }
        }
    }
    /// Estimate a pose from a population drawn by resampling.
    ///
    /// Resampled copies keep their parent's weight while their multiplicity already encodes it, so
    /// the average counts every copy once. The highest-weight pose still reads the carried weights.
    pub fn estimate_resampled(&self, particles: &[Particle], world: &World) -> Option<Pose> {
        match self {
            ParticleAveragingStrategy::HighestWeight => Self::highest_weight_pose(particles),
            ParticleAveragingStrategy::WeightedAverage => {
                Self::weighted_average_pose(particles, world, true)
            }
        }
    }
    fn highest_weight_pose(particles: &[Particle]) -> Option<Pose> {
        let mut best: Option<&Particle> = None;
        for particle in particles {
            match best {
                Some(b) if !(particle.weight > b.weight) => {}
                _ => best = Some(particle),
            }
        }
        best.map(|p| p.pose)
    }
    fn weighted_average_pose(
        particles: &[Particle],
        world: &World,
        uniform: bool,
    ) -> Option<Pose> {
        if particles.is_empty() {
            return None;
        }
        let total: f64 = particles.iter().map(|p| p.weight).sum();
        let uniform = uniform || !(total.is_finite() && total > 0.0);
        // Each coordinate lives on a circle: x on [0, width), y on [0, height), theta on [0, 2π).
        let mut sums = [(0.0_f64, 0.0_f64); 3];
        for particle in particles {
            let w = if uniform { 1.0 } else { particle.weight };
            let angles = [
                particle.pose.x / world.width * TAU,
                particle.pose.y / world.height * TAU,
                particle.pose.theta,
            ];
            for (sum, angle) in sums.iter_mut().zip(angles) {
                sum.0 += w * angle.sin();
                sum.1 += w * angle.cos();
            }
        }
        let mean_angle = |(s, c): (f64, f64)| wrap_to_2pi(s.atan2(c));
        Some(Pose::new(
            wrap_to_extent(mean_angle(sums[0]) / TAU * world.width, world.width),
            wrap_to_extent(mean_angle(sums[1]) / TAU * world.height, world.height),
            mean_angle(sums[2]),
        ))
    }
}

/// How a new population is drawn from the weighted one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ParticleResamplingStrategy {
    /// Low-variance resampling wheel
    #[default]
    LowVariance,
    /// Independent weighted draws with replacement
    Multinomial,
    /// Deterministic integer copies plus systematic draws on the remainders
    Residual,
}
impl ParticleResamplingStrategy {
    /// Draw `particles.len()` independent copies, each particle's expected copy count proportional
    /// to its weight. `weights` need not be normalized.
    pub fn resample<R: Rng + ?Sized>(
        &self,
        particles: &[Particle],
        weights: &[f64],
        rng: &mut R,
    ) -> Result<Vec<Particle>> {
        let n = particles.len();
        validate_weights(n, weights)?;
        let resampled = match self {
            ParticleResamplingStrategy::LowVariance => {
                Self::low_variance_resample(particles, weights, rng)
            }
            ParticleResamplingStrategy::Multinomial => {
                Self::multinomial_resample(particles, weights, rng)?
            }
            ParticleResamplingStrategy::Residual => {
                Self::residual_resample(particles, weights, rng)
            }
        };
        if resampled.len() != n {
            return Err(MclError::PopulationMismatch {
                expected: n,
                actual: resampled.len(),
            });
        }
        Ok(resampled)
    }
    fn low_variance_resample<R: Rng + ?Sized>(
        particles: &[Particle],
        weights: &[f64],
        rng: &mut R,
    ) -> Vec<Particle> {
        let n = particles.len();
        let max_weight = weights.iter().cloned().fold(0.0, f64::max);
        let mut index = rng.random_range(0..n);
        let mut beta = 0.0;
        let mut new_particles = Vec::with_capacity(n);
        for _ in 0..n {
            beta += rng.random::<f64>() * 2.0 * max_weight;
            while beta > weights[index] {
                beta -= weights[index];
                index = (index + 1) % n;
            }
            new_particles.push(particles[index]);
        }
        new_particles
    }
    fn multinomial_resample<R: Rng + ?Sized>(
        particles: &[Particle],
        weights: &[f64],
        rng: &mut R,
    ) -> Result<Vec<Particle>> {
        let distribution = WeightedIndex::new(weights)
            .map_err(|e| MclError::DegenerateWeights(e.to_string()))?;
        Ok((0..particles.len())
            .map(|_| particles[distribution.sample(rng)])
            .collect())
    }
    fn residual_resample<R: Rng + ?Sized>(
        particles: &[Particle],
        weights: &[f64],
        rng: &mut R,
    ) -> Vec<Particle> {
        let n = particles.len();
        let sum: f64 = weights.iter().sum();
        let mut new_particles = Vec::<Particle>::with_capacity(n);
        let mut residual: Vec<f64> = vec![0.0; n];
        for (i, &w) in weights.iter().enumerate() {
            let expected = w / sum * n as f64;
            let copies = (expected.floor() as usize).min(n - new_particles.len());
            residual[i] = expected - copies as f64;
            new_particles.extend(std::iter::repeat_n(particles[i], copies));
        }
        let residual_particles = n - new_particles.len();
        if residual_particles > 0 {
            let sum_residual: f64 = residual.iter().sum();
            let step = sum_residual / residual_particles as f64;
            let mut position = rng.random::<f64>() * step;
            let mut i = 0;
            let mut cumsum = residual[0];
            for _ in 0..residual_particles {
                while position > cumsum && i + 1 < n {
                    i += 1;
                    cumsum += residual[i];
                }
                new_particles.push(particles[i]);
                position += step;
            }
        }
        new_particles
    }
}

/// Recognized filter options, fixed at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleFilterConfig {
    /// Population size N
    pub num_particles: usize,
    /// Motion and sensing noise carried by every particle
    pub noise: NoiseModel,
    /// Share of the population (0-100) reset to random poses after each resampling
    pub percent_random_particles: u8,
    pub world: World,
    pub resampling_strategy: ParticleResamplingStrategy,
    pub averaging_strategy: ParticleAveragingStrategy,
    /// Seed for the filter's random number generator (random when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}
impl Default for ParticleFilterConfig {
    fn default() -> Self {
        ParticleFilterConfig {
            num_particles: 1000,
            noise: NoiseModel::default(),
            percent_random_particles: 10,
            world: World::default(),
            resampling_strategy: ParticleResamplingStrategy::default(),
            averaging_strategy: ParticleAveragingStrategy::default(),
            seed: None,
        }
    }
}
impl ParticleFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(MclError::InvalidConfig(
                "num_particles must be positive".to_string(),
            ));
        }
        if self.percent_random_particles > 100 {
            return Err(MclError::InvalidConfig(format!(
                "percent_random_particles must be within 0-100 (got {})",
                self.percent_random_particles
            )));
        }
        self.noise.validate()?;
        self.world.validate()
    }
    /// Number of particles randomized per cycle: `round(percent / 100 * N)`
    pub fn random_particle_count(&self) -> usize {
        (self.percent_random_particles as f64 / 100.0 * self.num_particles as f64).round() as usize
    }
}

/// Diagnostics of the most recent filter cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticleFilterState {
    /// Effective number of particles right after the last weighting pass
    pub effective_sample_size: f64,
    /// Largest normalized weight of the last weighting pass
    pub max_weight: f64,
    /// Number of particles pushed onto the likelihood floor by the last weighting pass
    pub floored: usize,
    /// Number of particles randomized in the last cycle
    pub randomized: usize,
    /// Total number of completed cycles
    pub iterations: u64,
}

/// Monte Carlo localization particle filter over a fixed landmark map.
#[derive(Clone)]
pub struct ParticleFilter {
    particles: Vec<Particle>,
    landmarks: Rc<LandmarkMap>,
    config: ParticleFilterConfig,
    rng: StdRng,
    state: ParticleFilterState,
    /// Sorted indices of particles reset since the last weighting pass; their weights are stale
    reset: Vec<usize>,
    /// Whether the population was resampled since the last weighting pass
    resampled: bool,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let estimate = self.estimate_location();
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.particles.len())
            .field("num_landmarks", &self.landmarks.len())
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field(
                "estimate",
                &format_args!(
                    "({:.3}, {:.3}, {:.4} rad)",
                    estimate.x, estimate.y, estimate.theta
                ),
            )
            .field("iterations", &self.state.iterations)
            .finish()
    }
}
impl ParticleFilter {
    /// Build a filter whose N particles are spread uniformly over the world with weight `1/N`.
    pub fn new(config: ParticleFilterConfig, landmarks: Rc<LandmarkMap>) -> Result<ParticleFilter> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
        let n = config.num_particles;
        let weight = 1.0 / n as f64;
        let particles = (0..n)
            .map(|_| Particle::new(config.world.random_pose(&mut rng), weight, config.noise))
            .collect();
        debug!(
            "Initialized {} particles over a {}x{} world with {} landmarks",
            n,
            config.world.width,
            config.world.height,
            landmarks.len()
        );
        Ok(ParticleFilter {
            particles,
            landmarks,
            config,
            rng,
            state: ParticleFilterState::default(),
            reset: Vec::new(),
            resampled: false,
        })
    }
    /// Build a filter from an explicit population. `config.num_particles` is replaced by the
    /// population size; the population must already satisfy every filter invariant and every
    /// particle must carry a valid noise model.
    pub fn from_particles(
        particles: Vec<Particle>,
        config: ParticleFilterConfig,
        landmarks: Rc<LandmarkMap>,
    ) -> Result<ParticleFilter> {
        let config = ParticleFilterConfig {
            num_particles: particles.len(),
            ..config
        };
        config.validate()?;
        for particle in &particles {
            particle.noise.validate()?;
        }
        let rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
        let filter = ParticleFilter {
            particles,
            landmarks,
            config,
            rng,
            state: ParticleFilterState::default(),
            reset: Vec::new(),
            resampled: false,
        };
        filter.check_health()?;
        Ok(filter)
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    pub fn weights(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.weight).collect()
    }
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }
    pub fn config(&self) -> &ParticleFilterConfig {
        &self.config
    }
    pub fn world(&self) -> &World {
        &self.config.world
    }
    pub fn landmarks(&self) -> &Rc<LandmarkMap> {
        &self.landmarks
    }
    pub fn state(&self) -> &ParticleFilterState {
        &self.state
    }
    /// Apply a motion command to every particle, each with its own independent noise draw.
    ///
    /// The command is validated once up front, so a rejected command leaves every particle untouched.
    pub fn move_particles(&mut self, forward: f64, turn: f64) -> Result<()> {
        validate_command(forward, turn)?;
        let world = self.config.world;
        for particle in &mut self.particles {
            particle.propagate(forward, turn, &world, &mut self.rng)?;
        }
        Ok(())
    }
    /// Weight every particle against `measurement` and normalize the weights to sum to one.
    ///
    /// Likelihoods are compared relative to the best particle (log-sum-exp) so that many landmarks
    /// or a tight sensing noise cannot underflow the whole population; each relative likelihood is
    /// then floored at [`LIKELIHOOD_FLOOR`]. Returns the normalized weights.
    ///
    /// A measurement of the wrong dimension or with a non-finite entry is rejected before any
    /// weight changes.
    pub fn calculate_weights<M: MeasurementModel + ?Sized>(
        &mut self,
        measurement: &M,
    ) -> Result<Vec<f64>> {
        if measurement.get_dimension() != self.landmarks.len() {
            return Err(MclError::MeasurementMismatch {
                expected: self.landmarks.len(),
                actual: measurement.get_dimension(),
            });
        }
        check_finite(measurement.get_vector())?;
        let log_likelihoods = self
            .particles
            .iter()
            .map(|p| p.log_likelihood(measurement))
            .collect::<Result<Vec<f64>>>()?;
        let max_log_likelihood = log_likelihoods
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        if max_log_likelihood.is_finite() {
            for (particle, ll) in self.particles.iter_mut().zip(&log_likelihoods) {
                particle.weight = floor_likelihood((ll - max_log_likelihood).exp());
            }
        } else {
            warn!("Every particle fell below the likelihood floor, falling back to uniform weights");
            for particle in &mut self.particles {
                particle.weight = LIKELIHOOD_FLOOR;
            }
        }
        self.reset.clear();
        self.resampled = false;
        self.state.floored = self
            .particles
            .iter()
            .filter(|p| p.weight <= LIKELIHOOD_FLOOR)
            .count();
        self.normalize_weights();
        self.state.effective_sample_size = self.effective_sample_size();
        self.state.max_weight = self.particles.iter().map(|p| p.weight).fold(0.0, f64::max);
        trace!(
            "Weighted {} particles: n_eff = {:.1}, max weight = {:.4e}, floored = {}",
            self.particles.len(),
            self.state.effective_sample_size,
            self.state.max_weight,
            self.state.floored
        );
        Ok(self.weights())
    }
    /// Divide every weight by the total so the weights form a probability distribution.
    pub fn normalize_weights(&mut self) {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        if sum > 0.0 && sum.is_finite() {
            for particle in &mut self.particles {
                particle.weight /= sum;
            }
        } else {
            let uniform = 1.0 / self.particles.len() as f64;
            for particle in &mut self.particles {
                particle.weight = uniform;
            }
        }
    }
    /// Replace the population by `N` copies drawn with the configured strategy from the current weights.
    pub fn resample_particles(&mut self) -> Result<()> {
        let weights = self.weights();
        let resampled =
            self.config
                .resampling_strategy
                .resample(&self.particles, &weights, &mut self.rng)?;
        self.particles = resampled;
        self.reset.clear();
        self.resampled = true;
        Ok(())
    }
    /// Reset `n` distinct particles, chosen uniformly without replacement, to uniformly random
    /// poses over the world. Weights are left untouched. Returns the indices of the reset particles.
    ///
    /// Until the next weighting pass the reset particles are ignored by [`Self::estimate_location`],
    /// since the weight they carry belongs to the pose they replaced.
    pub fn randomize_n_particles(&mut self, n: usize) -> Result<Vec<usize>> {
        let available = self.particles.len();
        if n > available {
            return Err(MclError::TooManyRandomParticles {
                requested: n,
                available,
            });
        }
        let world = self.config.world;
        let indices = rand::seq::index::sample(&mut self.rng, available, n).into_vec();
        for &index in &indices {
            let pose = world.random_pose(&mut self.rng);
            self.particles[index].set_pose(pose);
        }
        self.reset.extend_from_slice(&indices);
        self.reset.sort_unstable();
        self.reset.dedup();
        self.state.randomized = n;
        Ok(indices)
    }
    /// Number of particles the full cycle randomizes
    pub fn random_particle_count(&self) -> usize {
        self.config.random_particle_count()
    }
    /// Best single pose according to the configured averaging strategy.
    ///
    /// After a resampling pass the weighted average counts every copy once, see
    /// [`ParticleAveragingStrategy::estimate_resampled`].
    pub fn estimate_location(&self) -> Pose {
        let strategy = self.config.averaging_strategy;
        let world = &self.config.world;
        let estimate_from = |particles: &[Particle]| {
            if self.resampled {
                strategy.estimate_resampled(particles, world)
            } else {
                strategy.estimate(particles, world)
            }
        };
        let estimate = if self.reset.is_empty() || self.reset.len() == self.particles.len() {
            estimate_from(&self.particles)
        } else {
            let weighted: Vec<Particle> = self
                .particles
                .iter()
                .enumerate()
                .filter(|(i, _)| self.reset.binary_search(i).is_err())
                .map(|(_, p)| *p)
                .collect();
            estimate_from(&weighted)
        };
        // The population is never empty, so the strategy always yields a pose.
        estimate.unwrap_or_default()
    }
    /// One full filter cycle after the particles were moved: weight, resample, randomize the
    /// configured share, estimate.
    pub fn update<M: MeasurementModel + ?Sized>(&mut self, measurement: &M) -> Result<Pose> {
        self.calculate_weights(measurement)?;
        self.resample_particles()?;
        let n_random = self.random_particle_count();
        if n_random > 0 {
            self.randomize_n_particles(n_random)?;
        } else {
            self.state.randomized = 0;
        }
        self.state.iterations += 1;
        let estimate = self.estimate_location();
        debug!(
            "Cycle {}: estimate {}, n_eff = {:.1}",
            self.state.iterations, estimate, self.state.effective_sample_size
        );
        Ok(estimate)
    }
    /// Effective number of particles, `1 / Σ w²` over the normalized weights
    pub fn effective_sample_size(&self) -> f64 {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        if !(sum > 0.0 && sum.is_finite()) {
            return 0.0;
        }
        let sum_of_squares: f64 = self
            .particles
            .iter()
            .map(|p| (p.weight / sum) * (p.weight / sum))
            .sum();
        if sum_of_squares > 0.0 {
            1.0 / sum_of_squares
        } else {
            0.0
        }
    }
    /// Verify the invariants the filter promises to its readers: population size, finite
    /// non-negative weights with a positive sum, and every pose inside the world.
    pub fn check_health(&self) -> Result<()> {
        if self.particles.len() != self.config.num_particles {
            return Err(MclError::PopulationMismatch {
                expected: self.config.num_particles,
                actual: self.particles.len(),
            });
        }
        validate_weights(self.particles.len(), &self.weights())
            .map_err(|e| MclError::Unhealthy(e.to_string()))?;
        if let Some((i, p)) = self
            .particles
            .iter()
            .enumerate()
            .find(|(_, p)| !self.config.world.contains(&p.pose))
        {
            return Err(MclError::Unhealthy(format!(
                "particle {i} has an invalid pose {}",
                p.pose
            )));
        }
        Ok(())
    }
}

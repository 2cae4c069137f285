//! Landmark-based Monte Carlo localization toolbox
//!
//! This crate estimates the pose (position and heading) of a mobile agent moving in a bounded,
//! toroidal 2D world. The agent issues noisy motion commands (forward distance, turn angle) and
//! observes noisy ranges to a fixed set of landmarks. A sequential Monte Carlo filter (particle
//! filter) maintains a population of weighted pose hypotheses that is propagated through the
//! motion model, re-weighted against the range likelihood, and resampled so that hypotheses
//! consistent with the observations dominate.
//!
//! This crate is primarily built off of two groups of dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): landmark points, distances and measurement vectors.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): random
//!   number generation for motion noise, sensing noise, resampling and recovery.
//!
//! ## Crate overview
//!
//! - [error]: the error type shared by every fallible operation.
//! - [measurements]: the range-to-landmark measurement model and its Gaussian likelihood.
//! - [particle]: the particle type, the resampling and estimation strategies, and the filter itself.
//! - [sim]: a headless simulation driver (ground truth, scripted commands, kidnapping) and its configuration.
//!
//! ## Coordinate and state definitions
//!
//! A pose is the triple $(x, y, \theta)$. Positions are expressed in world units inside
//! $[0, w) \times [0, h)$ where $w$ and $h$ are the world width and height. The world is a torus: motion
//! past an edge re-enters from the opposite edge. Headings are expressed in radians and are kept in
//! $[0, 2\pi)$ after every motion update.
//!
//! ## Motion model
//!
//! Given a command $(d, \delta)$ with $d \geq 0$, the heading is first rotated (only when $\delta \neq 0$):
//!
//! $$
//! \theta^+ = (\theta + \delta + \epsilon_\delta) \bmod 2\pi, \quad \epsilon_\delta \sim \mathcal{N}(0, \sigma_{turn})
//! $$
//!
//! and the agent then travels $d^+ = d + \epsilon_d$, $\epsilon_d \sim \mathcal{N}(0, \sigma_{forward})$ (zero when $d = 0$)
//! along the new heading, wrapping both coordinates by the world extent.
//!
//! ## Sensor model
//!
//! The ground truth reports $z_i = \lVert p - l_i \rVert + \mathcal{N}(0, \sigma_{sense})$ for each landmark $l_i$.
//! A particle at $p$ is scored by the product of the Gaussian densities of each $z_i$ centered on its own
//! noiseless range. See [measurements] for the numerical treatment.
pub mod error;
pub mod measurements;
pub mod particle;
pub mod sim;

use std::f64::consts::TAU;
use std::fmt::{self, Display};
use std::ops::{Add, Sub};

use nalgebra::{DVector, Point2};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

pub use error::{MclError, Result};

/// Wrap a value into the half-open range `[0, extent)`.
///
/// Uses the Euclidean remainder so that negative values re-enter from the top of the range. The
/// result is guaranteed to be strictly smaller than `extent`, even when floating point rounding of
/// a tiny negative value would otherwise land exactly on it.
///
/// # Example
/// ```rust
/// use mcl::wrap_to_extent;
/// assert_eq!(wrap_to_extent(85.0, 80.0), 5.0);
/// assert_eq!(wrap_to_extent(-5.0, 80.0), 75.0);
/// ```
pub fn wrap_to_extent(value: f64, extent: f64) -> f64 {
    let wrapped = value.rem_euclid(extent);
    if wrapped >= extent { 0.0 } else { wrapped }
}
/// Wrap an angle to the range 0 to $2\pi$ radians
///
/// # Example
/// ```rust
/// use mcl::wrap_to_2pi;
/// use std::f64::consts::PI;
/// let wrapped = wrap_to_2pi(-PI / 2.0);
/// assert!((wrapped - 3.0 * PI / 2.0).abs() < 1e-12);
/// ```
pub fn wrap_to_2pi(angle: f64) -> f64 {
    wrap_to_extent(angle, TAU)
}
/// Draw a zero-mean Gaussian sample with the given standard deviation.
///
/// A zero standard deviation is exact: no sample is drawn and `0.0` is returned. Negative or
/// non-finite deviations are rejected with [`MclError::InvalidConfig`].
pub fn gaussian_noise<R: Rng + ?Sized>(std_dev: f64, rng: &mut R) -> Result<f64> {
    if !(std_dev.is_finite() && std_dev >= 0.0) {
        return Err(MclError::InvalidConfig(format!(
            "standard deviation must be finite and >= 0, got {std_dev}"
        )));
    }
    if std_dev == 0.0 {
        return Ok(0.0);
    }
    let normal = Normal::new(0.0, std_dev).map_err(|e| {
        MclError::InvalidConfig(format!("invalid standard deviation {std_dev}: {e}"))
    })?;
    Ok(normal.sample(rng))
}

/// Basic structure for holding a planar pose.
///
/// `Pose` is a plain `Copy` value: every particle owns its own pose and assigning one particle's pose
/// to another copies it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position along the world x axis (world units)
    pub x: f64,
    /// Position along the world y axis (world units)
    pub y: f64,
    /// Heading in radians, measured counter-clockwise from the x axis
    pub theta: f64,
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose {{ x: {:.3}, y: {:.3}, theta: {:.4} rad }}",
            self.x, self.y, self.theta
        )
    }
}
impl Add for Pose {
    type Output = Pose;
    fn add(self, other: Pose) -> Pose {
        Pose::new(self.x + other.x, self.y + other.y, self.theta + other.theta)
    }
}
impl Sub for Pose {
    type Output = Pose;
    fn sub(self, other: Pose) -> Pose {
        Pose::new(self.x - other.x, self.y - other.y, self.theta - other.theta)
    }
}
impl From<(f64, f64, f64)> for Pose {
    fn from(tuple: (f64, f64, f64)) -> Self {
        Pose::new(tuple.0, tuple.1, tuple.2)
    }
}
impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Pose {
        Pose { x, y, theta }
    }
    /// Position component of the pose
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
    /// Euclidean (non-wrapping) distance from the pose position to a point
    pub fn distance_to(&self, point: &Point2<f64>) -> f64 {
        nalgebra::distance(&self.position(), point)
    }
    /// Heading reduced to `[0, 2π)`
    pub fn normalized_heading(&self) -> f64 {
        wrap_to_2pi(self.theta)
    }
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }
}

/// Standard deviations of the three independent Gaussian noise sources of an agent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseModel {
    /// Standard deviation of the distance actually travelled on a forward command
    pub forward_noise: f64,
    /// Standard deviation of the angle actually turned on a turn command (radians)
    pub turn_noise: f64,
    /// Standard deviation of each landmark range reading
    pub sense_noise: f64,
}
impl Default for NoiseModel {
    fn default() -> Self {
        NoiseModel {
            forward_noise: 0.2,
            turn_noise: 0.05,
            sense_noise: 2.0,
        }
    }
}
impl Display for NoiseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NoiseModel(forward: {}, turn: {}, sense: {})",
            self.forward_noise, self.turn_noise, self.sense_noise
        )
    }
}
impl NoiseModel {
    pub fn new(forward_noise: f64, turn_noise: f64, sense_noise: f64) -> Result<NoiseModel> {
        let noise = NoiseModel {
            forward_noise,
            turn_noise,
            sense_noise,
        };
        noise.validate()?;
        Ok(noise)
    }
    /// A model with no motion or sensing noise at all
    pub fn noiseless() -> NoiseModel {
        NoiseModel {
            forward_noise: 0.0,
            turn_noise: 0.0,
            sense_noise: 0.0,
        }
    }
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("forward_noise", self.forward_noise),
            ("turn_noise", self.turn_noise),
            ("sense_noise", self.sense_noise),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(MclError::InvalidConfig(format!(
                    "{name} must be a finite, non-negative standard deviation (got {value})"
                )));
            }
        }
        Ok(())
    }
}

/// Extent of the toroidal world.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct World {
    pub width: f64,
    pub height: f64,
}
impl Default for World {
    fn default() -> Self {
        World {
            width: 80.0,
            height: 80.0,
        }
    }
}
impl World {
    pub fn new(width: f64, height: f64) -> Result<World> {
        let world = World { width, height };
        world.validate()?;
        Ok(world)
    }
    pub fn validate(&self) -> Result<()> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(MclError::InvalidConfig(format!(
                "world width must be positive (got {})",
                self.width
            )));
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(MclError::InvalidConfig(format!(
                "world height must be positive (got {})",
                self.height
            )));
        }
        Ok(())
    }
    /// Wrap a position onto the torus
    pub fn wrap_position(&self, x: f64, y: f64) -> (f64, f64) {
        (wrap_to_extent(x, self.width), wrap_to_extent(y, self.height))
    }
    /// True when the pose lies inside the world and its heading is already reduced to `[0, 2π)`
    pub fn contains(&self, pose: &Pose) -> bool {
        (0.0..self.width).contains(&pose.x)
            && (0.0..self.height).contains(&pose.y)
            && (0.0..TAU).contains(&pose.theta)
    }
    /// Draw a pose uniformly over the whole world extent and every heading
    pub fn random_pose<R: Rng + ?Sized>(&self, rng: &mut R) -> Pose {
        Pose::new(
            wrap_to_extent(rng.random::<f64>() * self.width, self.width),
            wrap_to_extent(rng.random::<f64>() * self.height, self.height),
            wrap_to_2pi(rng.random::<f64>() * TAU),
        )
    }
    /// Shortest planar distance between two poses on the torus
    pub fn toroidal_distance(&self, a: &Pose, b: &Pose) -> f64 {
        let dx = wrap_to_extent(a.x - b.x, self.width);
        let dy = wrap_to_extent(a.y - b.y, self.height);
        let dx = dx.min(self.width - dx);
        let dy = dy.min(self.height - dy);
        dx.hypot(dy)
    }
}

/// Ordered, immutable set of landmark positions.
///
/// The map is built once and shared read-only (behind an `Rc`) by the ground-truth agent, the
/// measurements it produces and the particle filter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkMap {
    landmarks: Vec<Point2<f64>>,
}
impl From<Vec<Point2<f64>>> for LandmarkMap {
    fn from(landmarks: Vec<Point2<f64>>) -> Self {
        LandmarkMap { landmarks }
    }
}
impl From<&[[f64; 2]]> for LandmarkMap {
    fn from(points: &[[f64; 2]]) -> Self {
        LandmarkMap {
            landmarks: points.iter().map(|p| Point2::new(p[0], p[1])).collect(),
        }
    }
}
impl LandmarkMap {
    pub fn new(landmarks: Vec<Point2<f64>>) -> LandmarkMap {
        LandmarkMap { landmarks }
    }
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Point2<f64>> {
        self.landmarks.iter()
    }
    pub fn as_slice(&self) -> &[Point2<f64>] {
        &self.landmarks
    }
    /// Noiseless ranges from a pose to every landmark, in landmark order
    pub fn ranges_from(&self, pose: &Pose) -> DVector<f64> {
        DVector::from_iterator(
            self.landmarks.len(),
            self.landmarks.iter().map(|l| pose.distance_to(l)),
        )
    }
}

//! Measurement-related code for landmark localization.
//!
//! This module defines the generic measurement model trait used by the particle filter and its
//! one concrete implementation: a vector of ranges from an agent to every landmark of a
//! [`LandmarkMap`]. The measurement is generated by the ground-truth agent (noiseless ranges plus
//! Gaussian sensing noise) and then evaluated by every particle against that particle's own
//! noiseless ranges.
//!
//! Each range is treated as conditionally independent given the pose, so the likelihood of a
//! measurement vector is the product of one-dimensional Gaussian densities. The product is
//! accumulated in log space; callers exponentiate and floor the result at [`LIKELIHOOD_FLOOR`] so
//! that no particle ever receives an exact zero weight.

use std::f64::consts::PI;
use std::fmt::{self, Display};
use std::rc::Rc;

use nalgebra::DVector;
use rand::Rng;

use crate::{LandmarkMap, MclError, Pose, Result, gaussian_noise};

/// Smallest likelihood a particle can be assigned by a weighting pass.
pub const LIKELIHOOD_FLOOR: f64 = 1e-300;

/// Generic measurement model trait
pub trait MeasurementModel {
    /// Get the dimension of the measurement vector
    fn get_dimension(&self) -> usize;
    /// Get the observed measurement vector
    fn get_vector(&self) -> &DVector<f64>;
    /// Get the noiseless measurement an agent at `pose` would observe. Measurement model function
    /// that maps the pose to measurement space.
    fn get_expected_measurement(&self, pose: &Pose) -> DVector<f64>;
}

/// Noisy ranges from an agent to every landmark of a map, in landmark order.
#[derive(Clone, Debug)]
pub struct RangeMeasurement {
    ranges: DVector<f64>,
    landmarks: Rc<LandmarkMap>,
}
impl Display for RangeMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RangeMeasurement(")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{range:.3}")?;
        }
        write!(f, ")")
    }
}
impl MeasurementModel for RangeMeasurement {
    fn get_dimension(&self) -> usize {
        self.ranges.len()
    }
    fn get_vector(&self) -> &DVector<f64> {
        &self.ranges
    }
    fn get_expected_measurement(&self, pose: &Pose) -> DVector<f64> {
        self.landmarks.ranges_from(pose)
    }
}
impl RangeMeasurement {
    /// Wrap an observed range vector. Fails when the vector length does not match the landmark
    /// count or when any range is NaN or infinite.
    pub fn new(ranges: DVector<f64>, landmarks: Rc<LandmarkMap>) -> Result<RangeMeasurement> {
        if ranges.len() != landmarks.len() {
            return Err(MclError::MeasurementMismatch {
                expected: landmarks.len(),
                actual: ranges.len(),
            });
        }
        check_finite(&ranges)?;
        Ok(RangeMeasurement { ranges, landmarks })
    }
    /// Generate a measurement as seen from `pose`: the noiseless range to each landmark plus an
    /// independent `N(0, sense_noise)` draw.
    pub fn sample<R: Rng + ?Sized>(
        pose: &Pose,
        sense_noise: f64,
        landmarks: Rc<LandmarkMap>,
        rng: &mut R,
    ) -> Result<RangeMeasurement> {
        let mut ranges = landmarks.ranges_from(pose);
        for range in ranges.iter_mut() {
            *range += gaussian_noise(sense_noise, rng)?;
        }
        Ok(RangeMeasurement { ranges, landmarks })
    }
    pub fn landmarks(&self) -> &LandmarkMap {
        &self.landmarks
    }
}

/// Fail on the first NaN or infinite entry of a measurement vector.
pub fn check_finite(vector: &DVector<f64>) -> Result<()> {
    match vector.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(MclError::InvalidMeasurement {
            index,
            value: vector[index],
        }),
        None => Ok(()),
    }
}

/// Natural log of the Gaussian density of `x` under `N(mean, std_dev)`.
///
/// A zero standard deviation is the limit of a vanishing Gaussian: `0.0` when `x == mean`,
/// `-inf` otherwise. A negative standard deviation has no density and yields NaN.
pub fn gaussian_log_pdf(x: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev < 0.0 {
        return f64::NAN;
    }
    if std_dev == 0.0 {
        return if x == mean { 0.0 } else { f64::NEG_INFINITY };
    }
    let normalized = (x - mean) / std_dev;
    -0.5 * normalized * normalized - std_dev.ln() - 0.5 * (2.0 * PI).ln()
}

/// Log-likelihood of a measurement for an agent at `pose` with range noise `sense_noise`.
///
/// # Errors
/// [`MclError::InvalidConfig`] when `sense_noise` is negative or not finite.
pub fn log_likelihood<M: MeasurementModel + ?Sized>(
    measurement: &M,
    pose: &Pose,
    sense_noise: f64,
) -> Result<f64> {
    if !(sense_noise.is_finite() && sense_noise >= 0.0) {
        return Err(MclError::InvalidConfig(format!(
            "sense_noise must be finite and >= 0, got {sense_noise}"
        )));
    }
    let expected = measurement.get_expected_measurement(pose);
    Ok(measurement
        .get_vector()
        .iter()
        .zip(expected.iter())
        .map(|(&observed, &mean)| gaussian_log_pdf(observed, mean, sense_noise))
        .sum())
}

/// Likelihood of a measurement, floored at [`LIKELIHOOD_FLOOR`].
pub fn likelihood<M: MeasurementModel + ?Sized>(
    measurement: &M,
    pose: &Pose,
    sense_noise: f64,
) -> Result<f64> {
    Ok(floor_likelihood(
        log_likelihood(measurement, pose, sense_noise)?.exp(),
    ))
}

/// Clamp a likelihood into `[LIKELIHOOD_FLOOR, f64::MAX]`; non-finite garbage maps onto the floor.
pub fn floor_likelihood(value: f64) -> f64 {
    if value.is_nan() {
        LIKELIHOOD_FLOOR
    } else {
        value.clamp(LIKELIHOOD_FLOOR, f64::MAX)
    }
}

//! Error types for the localization core

/// Result type alias
pub type Result<T> = std::result::Result<T, MclError>;

/// Localization error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MclError {
    /// Motion command the motion model cannot execute (backwards or non-finite)
    #[error("Invalid motion command: forward {forward}, turn {turn} (forward must be finite and >= 0)")]
    InvalidMotion {
        /// Requested forward distance
        forward: f64,
        /// Requested turn angle
        turn: f64,
    },

    /// Weight vector that cannot drive resampling
    #[error("Degenerate weight vector: {0}")]
    DegenerateWeights(String),

    /// Population whose size differs from what the filter was built with
    #[error("Population size mismatch: expected {expected}, got {actual}")]
    PopulationMismatch {
        /// Expected number of particles
        expected: usize,
        /// Actual number of particles
        actual: usize,
    },

    /// Range vector whose length differs from the landmark count
    #[error("Measurement dimension mismatch: expected {expected} ranges, got {actual}")]
    MeasurementMismatch {
        /// Number of landmarks
        expected: usize,
        /// Number of ranges supplied
        actual: usize,
    },

    /// Range that is NaN or infinite
    #[error("Invalid measurement: range {index} is {value}")]
    InvalidMeasurement {
        /// Position of the offending entry in the range vector
        index: usize,
        /// Offending value
        value: f64,
    },

    /// Recovery request larger than the population
    #[error("Cannot randomize {requested} particles out of a population of {available}")]
    TooManyRandomParticles {
        /// Number of particles requested
        requested: usize,
        /// Population size
        available: usize,
    },

    /// Configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Population that violates a filter invariant
    #[error("Unhealthy particle population: {0}")]
    Unhealthy(String),
}

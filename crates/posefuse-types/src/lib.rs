//! `posefuse-types` – shared value types for the pose-fusion workspace.
//!
//! - [`geometry`] – [`Point2D`] and [`Pose`] with the 2-D pose algebra used by
//!   odometry bookkeeping.
//! - [`Stamped`] – a value tagged with its millisecond timestamp.
//! - [`FusionQuality`] / [`StepFeedback`] – what the filter reports about
//!   itself.
//! - [`Event`] – envelope routed over the middleware bus.
//! - [`FusionError`] – the workspace-wide error type.

pub mod geometry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use geometry::{Point2D, Pose};

/// A value tagged with the time it was sampled, in integer milliseconds.
///
/// Produced by sensor drivers and immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub time_ms: i64,
    pub value: T,
}

impl<T> Stamped<T> {
    pub const fn new(time_ms: i64, value: T) -> Self {
        Self { time_ms, value }
    }

    /// Map the inner value while preserving the timestamp.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Stamped<U> {
        Stamped {
            time_ms: self.time_ms,
            value: f(self.value),
        }
    }
}

/// Identifies one of the two input streams of the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stream {
    /// High-rate relative pose stream (odometry).
    Master,
    /// Low-rate absolute position stream (beacon).
    Helper,
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stream::Master => write!(f, "master"),
            Stream::Helper => write!(f, "helper"),
        }
    }
}

/// Normalised scores describing how well the particle population agrees.
///
/// Each score is intended to lie in `[0, 1]`; `age` can go negative because
/// particle ages are decremented without a floor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionQuality {
    /// Mean particle age relative to the maximum age.
    pub age: f64,
    /// Positional consensus of the population.
    pub location: f64,
    /// Directional consensus: length of the mean heading vector.
    pub direction: f64,
}

impl FusionQuality {
    pub const fn zero() -> Self {
        Self {
            age: 0.0,
            location: 0.0,
            direction: 0.0,
        }
    }
}

impl std::fmt::Display for FusionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "age={:.3} location={:.3} direction={:.3}",
            self.age, self.location, self.direction
        )
    }
}

/// Per-update diagnostics emitted after every fully weighted filter step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepFeedback {
    /// Weight granted to the beacon measurement itself.
    pub measure_weight: f64,
    /// Sum of all particle weights.
    pub particle_weight: f64,
    /// Quality recomputed at the end of the step.
    pub quality: FusionQuality,
    /// The beacon fix.
    pub measure: Point2D,
    /// Odometry pose interpolated at the beacon timestamp.
    pub state: Pose,
    /// Expected pose of the beacon mount point.
    pub beacon_expectation: Pose,
    /// Expected pose of the robot.
    pub robot_expectation: Pose,
}

/// Unified event wrapper for the middleware bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "posefuse-runtime::fusion"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current wall-clock time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Corrected robot pose, produced at odometry rate.
    FusedPose(Stamped<Pose>),
    /// Diagnostics of one weighted filter step.
    Step(StepFeedback),
    /// The convergence gate changed state.
    ConvergenceChanged {
        convergent: bool,
        quality: Stamped<FusionQuality>,
    },
}

/// Global error type for the fusion workspace.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FusionError {
    #[error("Non-monotonic {stream} sample: {got_ms} ms after {last_ms} ms")]
    NonMonotonic {
        stream: Stream,
        last_ms: i64,
        got_ms: i64,
    },

    #[error("Invalid filter configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Channel Error: {0}")]
    Channel(String),
}

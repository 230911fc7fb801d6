use std::time::Duration;

use thiserror::Error;

use crate::{
    math::Tolerances,
    pool::{MAX_WORKERS, PoolConfig},
};

/// Specifies how a navigation mesh is generated. Usually built using [`GeneratorConfigBuilder`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GeneratorConfig {
    /// Tolerances of the geometric predicates.
    pub tolerances: Tolerances,

    /// Settings of the worker pool the groups are processed on.
    pub pool: PoolConfig,

    /// Whether the output is sorted by group index.
    ///
    /// Without this, navigation meshes are returned in the order their groups finish.
    pub deterministic_order: bool,
}

impl GeneratorConfig {
    /// A builder with reference values.
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder::default()
    }
}

/// A builder for [`GeneratorConfig`].
/// The default values are the reference tolerances for scenes modelled in meters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct GeneratorConfigBuilder {
    /// Relative tolerance for containment and parallelism tests. `[Limit: > 0, < 1]`
    ///
    /// Scaled by the area or side length of whatever is being tested.
    pub geometric_tolerance: f32,
    /// Distance below which intersection points are merged. `[Limit: > 0] [Units: wu]`
    ///
    /// It must be large enough to merge duplicate hits caused by floating point noise, but
    /// smaller than the distance between genuinely distinct crossings.
    pub snap_tolerance: f32,
    /// Number of worker threads. `[Limit: 1..=8]`
    pub workers: usize,
    /// How long a group may wait for a free worker before it is skipped.
    pub admission_timeout: Duration,
    /// How long to sleep between checks for a free worker.
    pub poll_interval: Duration,
    /// Whether the output is sorted by group index.
    pub deterministic_order: bool,
}

impl Default for GeneratorConfigBuilder {
    fn default() -> Self {
        let tolerances = Tolerances::default();
        let pool = PoolConfig::default();
        Self {
            geometric_tolerance: tolerances.geometric,
            snap_tolerance: tolerances.snap,
            workers: pool.workers,
            admission_timeout: pool.admission_timeout,
            poll_interval: pool.poll_interval,
            deterministic_order: true,
        }
    }
}

impl GeneratorConfigBuilder {
    /// Sets the number of worker threads.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the snap tolerance.
    pub fn snap_tolerance(mut self, snap_tolerance: f32) -> Self {
        self.snap_tolerance = snap_tolerance;
        self
    }

    /// Sets whether the output is sorted by group index.
    pub fn deterministic_order(mut self, deterministic_order: bool) -> Self {
        self.deterministic_order = deterministic_order;
        self
    }

    /// Builds a [`GeneratorConfig`] from the current configuration.
    pub fn build(self) -> Result<GeneratorConfig, ConfigError> {
        if !(self.geometric_tolerance > 0.0 && self.geometric_tolerance < 1.0) {
            return Err(ConfigError::GeometricTolerance {
                value: self.geometric_tolerance,
            });
        }
        if !(self.snap_tolerance > 0.0 && self.snap_tolerance.is_finite()) {
            return Err(ConfigError::SnapTolerance {
                value: self.snap_tolerance,
            });
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::Workers {
                workers: self.workers,
            });
        }
        if self.poll_interval.is_zero() || self.poll_interval > self.admission_timeout {
            return Err(ConfigError::PollInterval {
                poll_interval: self.poll_interval,
                admission_timeout: self.admission_timeout,
            });
        }
        Ok(GeneratorConfig {
            tolerances: Tolerances {
                geometric: self.geometric_tolerance,
                snap: self.snap_tolerance,
            },
            pool: PoolConfig {
                workers: self.workers,
                admission_timeout: self.admission_timeout,
                poll_interval: self.poll_interval,
            },
            deterministic_order: self.deterministic_order,
        })
    }
}

/// Errors that can occur when building a [`GeneratorConfig`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The geometric tolerance is not in `(0, 1)`.
    #[error("geometric tolerance must be in (0, 1), got {value}")]
    GeometricTolerance {
        /// The rejected value
        value: f32,
    },
    /// The snap tolerance is not a positive distance.
    #[error("snap tolerance must be positive, got {value}")]
    SnapTolerance {
        /// The rejected value
        value: f32,
    },
    /// The worker count is out of range.
    #[error("worker count must be between 1 and {MAX_WORKERS}, got {workers}")]
    Workers {
        /// The rejected value
        workers: usize,
    },
    /// The poll interval is zero or longer than the admission timeout.
    #[error("poll interval {poll_interval:?} must be non-zero and at most the admission timeout {admission_timeout:?}")]
    PollInterval {
        /// The rejected interval
        poll_interval: Duration,
        /// The admission timeout it was compared against
        admission_timeout: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_reference_values() {
        let config = GeneratorConfig::builder().build().unwrap();
        assert_eq!(config.tolerances, Tolerances::default());
        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.pool.admission_timeout, Duration::from_secs(200));
        assert_eq!(config.pool.poll_interval, Duration::from_millis(10));
        assert!(config.deterministic_order);
    }

    #[test]
    fn worker_limits() {
        assert!(GeneratorConfig::builder().workers(8).build().is_ok());
        assert_eq!(
            GeneratorConfig::builder().workers(9).build(),
            Err(ConfigError::Workers { workers: 9 })
        );
        assert_eq!(
            GeneratorConfig::builder().workers(0).build(),
            Err(ConfigError::Workers { workers: 0 })
        );
    }

    #[test]
    fn tolerances_are_validated() {
        assert!(matches!(
            GeneratorConfig::builder().snap_tolerance(0.0).build(),
            Err(ConfigError::SnapTolerance { .. })
        ));
        let builder = GeneratorConfigBuilder {
            geometric_tolerance: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            builder.build(),
            Err(ConfigError::GeometricTolerance { .. })
        ));
    }

    #[test]
    fn poll_interval_must_fit_timeout() {
        let builder = GeneratorConfigBuilder {
            admission_timeout: Duration::from_millis(5),
            ..Default::default()
        };
        assert!(matches!(
            builder.build(),
            Err(ConfigError::PollInterval { .. })
        ));
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn partial_json_uses_defaults() {
        let builder: GeneratorConfigBuilder =
            serde_json::from_str(r#"{ "workers": 2, "deterministic_order": false }"#).unwrap();
        let config = builder.build().unwrap();
        assert_eq!(config.pool.workers, 2);
        assert!(!config.deterministic_order);
        assert_eq!(config.tolerances, Tolerances::default());
    }
}

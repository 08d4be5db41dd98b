//! Sweep parameters and set-point generation.

use crate::error::SweepError;
use std::time::Duration;

/// A bias set-point in millivolts.
pub type SweepPoint = f64;

/// Upper bound on the number of points a single sweep may generate.
pub const MAX_SWEEP_POINTS: usize = 1_000_000;

/// Immutable parameters of one sweep run.
///
/// Built through [`SweepConfig::builder`], which normalises and validates the values:
/// after `build()`, `min <= max`, `step > 0` and `load_cycle >= 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    min: f64,
    max: f64,
    step: f64,
    reverse: bool,
    load_cycle: usize,
    settle_time: Duration,
    t_hot: f64,
    t_cold: f64,
    park_bias: Option<f64>,
}

impl SweepConfig {
    /// Start building a sweep from `min` to `max` in steps of `step` (mV).
    pub fn builder(min: f64, max: f64, step: f64) -> SweepConfigBuilder {
        SweepConfigBuilder {
            min,
            max,
            step,
            reverse: false,
            load_cycle: 1,
            settle_time: Duration::ZERO,
            t_hot: 295.0,
            t_cold: 77.0,
            bias_limits: None,
            park_bias: None,
        }
    }

    /// Lowest bias (mV)
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Highest bias (mV)
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Bias increment (mV)
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Sweep from max down to min
    pub fn reverse(&self) -> bool {
        self.reverse
    }

    /// Points measured per cold/hot load cycle
    pub fn load_cycle(&self) -> usize {
        self.load_cycle
    }

    /// Wait after each load move
    pub fn settle_time(&self) -> Duration {
        self.settle_time
    }

    /// Hot load temperature (K)
    pub fn t_hot(&self) -> f64 {
        self.t_hot
    }

    /// Cold load temperature (K)
    pub fn t_cold(&self) -> f64 {
        self.t_cold
    }

    /// Bias applied after a successful run, if any (mV)
    pub fn park_bias(&self) -> Option<f64> {
        self.park_bias
    }

    /// Number of points [`generate_sweep_points`] produces for this config.
    pub fn point_count(&self) -> usize {
        ((self.max - self.min) / self.step + 0.5).floor() as usize + 1
    }
}

/// Builder for [`SweepConfig`].
#[derive(Debug, Clone)]
pub struct SweepConfigBuilder {
    min: f64,
    max: f64,
    step: f64,
    reverse: bool,
    load_cycle: usize,
    settle_time: Duration,
    t_hot: f64,
    t_cold: f64,
    bias_limits: Option<(f64, f64)>,
    park_bias: Option<f64>,
}

impl SweepConfigBuilder {
    /// Emit points from max to min.
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Points per cold/hot load cycle.
    pub fn load_cycle(mut self, load_cycle: usize) -> Self {
        self.load_cycle = load_cycle;
        self
    }

    /// Wait after each load move.
    pub fn settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }

    /// Hot and cold load temperatures (K).
    pub fn load_temperatures(mut self, t_hot: f64, t_cold: f64) -> Self {
        self.t_hot = t_hot;
        self.t_cold = t_cold;
        self
    }

    /// Hardware bias limits (mV); the requested range is cropped into them.
    pub fn bias_limits(mut self, low: f64, high: f64) -> Self {
        self.bias_limits = Some((low, high));
        self
    }

    /// Bias to apply once the sweep has finished (mV).
    pub fn park_bias(mut self, park_bias: Option<f64>) -> Self {
        self.park_bias = park_bias;
        self
    }

    /// Normalise and validate.
    ///
    /// # Errors
    ///
    /// [`SweepError::Configuration`] for non-finite values, a non-positive step, a zero
    /// load cycle, inverted bias limits, a park bias outside the limits or a sweep longer
    /// than [`MAX_SWEEP_POINTS`]. The park bias is rejected rather than cropped.
    pub fn build(self) -> Result<SweepConfig, SweepError> {
        let finite = [self.min, self.max, self.step, self.t_hot, self.t_cold];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(SweepError::Configuration(
                "sweep bounds, step and load temperatures must be finite".into(),
            ));
        }
        if self.step <= 0.0 {
            return Err(SweepError::Configuration(format!(
                "step must be positive, got {}",
                self.step
            )));
        }
        if self.load_cycle == 0 {
            return Err(SweepError::Configuration(
                "load_cycle must be at least 1".into(),
            ));
        }
        if let Some(park) = self.park_bias {
            if !park.is_finite() {
                return Err(SweepError::Configuration(
                    "park bias must be finite".into(),
                ));
            }
        }

        let (mut min, mut max) = if self.min > self.max {
            (self.max, self.min)
        } else {
            (self.min, self.max)
        };

        if let Some((low, high)) = self.bias_limits {
            if !(low.is_finite() && high.is_finite()) || low > high {
                return Err(SweepError::Configuration(format!(
                    "invalid bias limits [{}, {}]",
                    low, high
                )));
            }
            min = min.clamp(low, high);
            max = max.clamp(low, high);

            if let Some(park) = self.park_bias {
                if !(low..=high).contains(&park) {
                    return Err(SweepError::Configuration(format!(
                        "park bias {} outside bias limits [{}, {}]",
                        park, low, high
                    )));
                }
            }
        }

        let config = SweepConfig {
            min,
            max,
            step: self.step,
            reverse: self.reverse,
            load_cycle: self.load_cycle,
            settle_time: self.settle_time,
            t_hot: self.t_hot,
            t_cold: self.t_cold,
            park_bias: self.park_bias,
        };

        if (config.max - config.min) / config.step >= MAX_SWEEP_POINTS as f64 {
            return Err(SweepError::Configuration(format!(
                "sweep of [{}, {}] in steps of {} exceeds {} points",
                min, max, config.step, MAX_SWEEP_POINTS
            )));
        }

        Ok(config)
    }
}

/// Arithmetic bias sequence for `config`.
///
/// Produces `min, min + step, ...` up to the last point `<= max + step / 2`, so `max`
/// itself is included when the range is a whole number of steps. With `reverse` the same
/// values are emitted from the top down. Points are computed as `min + i * step` so
/// rounding errors do not accumulate along the sweep.
pub fn generate_sweep_points(config: &SweepConfig) -> Vec<SweepPoint> {
    let mut points: Vec<SweepPoint> = (0..config.point_count())
        .map(|i| config.min + i as f64 * config.step)
        .collect();
    if config.reverse {
        points.reverse();
    }
    points
}

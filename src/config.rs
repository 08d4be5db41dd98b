//! Configuration using Figment
//!
//! Settings are loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `YSWEEP_`, nested keys separated by `__`
//!
//! Every section has defaults, so an empty or missing file yields a usable simulated
//! bench.
//!
//! # Example
//! ```no_run
//! use yfactor_sweep::config::Settings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load_from("config/ysweep.toml")?;
//! settings.validate()?;
//! let sweep = settings.sweep_config()?;
//! println!("{} points", sweep.point_count());
//! # Ok(())
//! # }
//! ```
//!
//! Override from the shell: `YSWEEP_SWEEP__LOAD_CYCLE=20 YSWEEP_LOADS__T_COLD=20.5`.

use crate::error::{AppError, AppResult};
use crate::error_recovery::RetryPolicy;
use crate::hardware::{BiasCalibration, DaqChannels};
use crate::sweep::SweepConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "YSWEEP_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationSettings,
    /// Sweep range and pacing
    pub sweep: SweepSettings,
    /// Nominal load temperatures
    pub loads: LoadSettings,
    /// Hardware bias limits
    pub bias: BiasLimits,
    /// DAQ bias box calibration
    pub calibration: BiasCalibration,
    /// DAQ channel wiring and averaging
    pub daq: DaqSettings,
    /// Digital load mover
    pub load_mover: LoadMoverSettings,
    /// Retry policy for hardware calls
    pub retry: RetrySettings,
    /// Result file
    pub output: OutputSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "Y-factor sweep".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Sweep range, direction and load duty cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    /// Lowest bias (mV)
    pub min: f64,
    /// Highest bias (mV)
    pub max: f64,
    /// Bias increment (mV)
    pub step: f64,
    /// Sweep from `max` down to `min`
    pub reverse: bool,
    /// Points measured per load position change
    pub load_cycle: usize,
    /// Wait after each load move
    #[serde(with = "humantime_serde")]
    pub settle_time: Duration,
    /// Bias applied after a completed sweep (mV)
    pub park_bias: Option<f64>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 5.0,
            step: 0.05,
            reverse: false,
            load_cycle: 10,
            settle_time: Duration::from_millis(500),
            park_bias: None,
        }
    }
}

/// Load temperatures in kelvin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
    /// Hot (ambient) load
    pub t_hot: f64,
    /// Cold (LN2) load
    pub t_cold: f64,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            t_hot: 295.0,
            t_cold: 77.0,
        }
    }
}

/// Bias range the hardware accepts (mV)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasLimits {
    /// Lowest allowed bias
    pub limit_min: f64,
    /// Highest allowed bias
    pub limit_max: f64,
}

impl Default for BiasLimits {
    fn default() -> Self {
        Self {
            limit_min: -25.0,
            limit_max: 25.0,
        }
    }
}

/// DAQ board wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaqSettings {
    /// DAC channel driving the bias
    pub output_channel: u8,
    /// ADC channel on the voltage monitor
    pub voltage_channel: u8,
    /// ADC channel on the current monitor
    pub current_channel: u8,
    /// Conversions averaged per sample
    pub n_avg: u32,
    /// Wait after each bias change
    #[serde(with = "humantime_serde")]
    pub bias_settle_time: Duration,
}

impl Default for DaqSettings {
    fn default() -> Self {
        let channels = DaqChannels::default();
        Self {
            output_channel: channels.output,
            voltage_channel: channels.voltage,
            current_channel: channels.current,
            n_avg: 10,
            bias_settle_time: Duration::from_millis(10),
        }
    }
}

impl DaqSettings {
    /// Channel assignment for the bias box.
    pub fn channels(&self) -> DaqChannels {
        DaqChannels {
            output: self.output_channel,
            voltage: self.voltage_channel,
            current: self.current_channel,
        }
    }
}

/// Load mover on a digital line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadMoverSettings {
    /// Whether a load mover is fitted
    pub enabled: bool,
    /// Digital output bit
    pub control_bit: u8,
    /// Level that puts the load in the beam
    pub load_in_state: bool,
    /// Time the mechanism needs to move
    #[serde(with = "humantime_serde")]
    pub switch_time: Duration,
}

impl Default for LoadMoverSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            control_bit: 0,
            load_in_state: true,
            switch_time: Duration::from_millis(200),
        }
    }
}

/// Retry policy for transient hardware errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay between attempts
    #[serde(with = "humantime_serde")]
    pub backoff_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            backoff_delay: policy.backoff_delay,
        }
    }
}

/// Result file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// CSV path
    pub path: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/yfactor_sweep.csv"),
        }
    }
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Settings {
    /// Load configuration from a TOML file and `YSWEEP_` environment variables.
    ///
    /// A missing file is not an error; the defaults apply.
    /// Example: `YSWEEP_APPLICATION__LOG_LEVEL=debug`
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::figment(path).extract().map_err(AppError::from)
    }

    /// The provider stack behind [`Settings::load_from`], for callers that merge more.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(AppError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let sweep = &self.sweep;
        if !(sweep.min.is_finite() && sweep.max.is_finite()) {
            return Err(AppError::Configuration(
                "sweep.min and sweep.max must be finite".into(),
            ));
        }
        if !(sweep.step.is_finite() && sweep.step > 0.0) {
            return Err(AppError::Configuration(format!(
                "Invalid sweep.step {}. Must be positive",
                sweep.step
            )));
        }
        if sweep.load_cycle == 0 {
            return Err(AppError::Configuration(
                "sweep.load_cycle must be at least 1".into(),
            ));
        }

        if !(self.loads.t_hot.is_finite() && self.loads.t_cold.is_finite()) {
            return Err(AppError::Configuration(
                "loads.t_hot and loads.t_cold must be finite".into(),
            ));
        }

        if !(self.bias.limit_min.is_finite() && self.bias.limit_max.is_finite())
            || self.bias.limit_min > self.bias.limit_max
        {
            return Err(AppError::Configuration(format!(
                "Invalid bias limits [{}, {}]",
                self.bias.limit_min, self.bias.limit_max
            )));
        }
        if let Some(park) = sweep.park_bias {
            if !(self.bias.limit_min..=self.bias.limit_max).contains(&park) {
                return Err(AppError::Configuration(format!(
                    "sweep.park_bias {} outside bias limits [{}, {}]",
                    park, self.bias.limit_min, self.bias.limit_max
                )));
            }
        }

        let cal = &self.calibration;
        for (name, gain) in [
            ("voltage_gain", cal.voltage_gain),
            ("current_gain", cal.current_gain),
        ] {
            if !(gain.is_finite() && gain > 0.0) {
                return Err(AppError::Configuration(format!(
                    "Invalid calibration.{} {}. Must be positive",
                    name, gain
                )));
            }
        }

        let daq = &self.daq;
        if daq.voltage_channel == daq.current_channel {
            return Err(AppError::Configuration(format!(
                "daq.voltage_channel and daq.current_channel are both {}",
                daq.voltage_channel
            )));
        }

        Ok(())
    }

    /// Immutable sweep parameters described by these settings.
    pub fn sweep_config(&self) -> AppResult<SweepConfig> {
        SweepConfig::builder(self.sweep.min, self.sweep.max, self.sweep.step)
            .reverse(self.sweep.reverse)
            .load_cycle(self.sweep.load_cycle)
            .settle_time(self.sweep.settle_time)
            .load_temperatures(self.loads.t_hot, self.loads.t_cold)
            .bias_limits(self.bias.limit_min, self.bias.limit_max)
            .park_bias(self.sweep.park_bias)
            .build()
            .map_err(|e| AppError::Configuration(e.to_string()))
    }

    /// Retry policy for hardware calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            backoff_delay: self.retry.backoff_delay,
        }
    }
}

//! Bench capability traits
//!
//! Fine-grained capability traits consumed by the sweep controller. Instead of one
//! monolithic instrument trait, each device implements only what it supports:
//!
//! - A bias box implements: `BiasSource + Sampler`
//! - A load mover implements: `LoadActuator`
//! - A power meter or a thermometer implements: `Readable`
//!
//! Lower down, DAQ boards expose `AnalogOutput`, `AnalogInput` and `DigitalOutput`,
//! which [`crate::hardware::daq::DaqBias`] and
//! [`crate::hardware::load_mover::DigitalLoadMover`] build the sweep capabilities on.
//!
//! # Conventions
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Returns [`HardwareError`] so callers can tell transient faults from bad replies
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! async fn bias_and_read<D>(device: &D, mv: f64) -> HardwareResult<Sample>
//! where
//!     D: BiasSource + Sampler,
//! {
//!     device.set_bias(mv).await?;
//!     device.sample().await
//! }
//! ```

use crate::error::HardwareError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result alias used by every capability.
pub type HardwareResult<T> = Result<T, HardwareError>;

/// Capability: Bias Control
///
/// Devices that apply a bias set-point to the device under test.
///
/// # Contract
/// - Values are in millivolts
/// - `set_bias` returns once the new bias has settled and can be sampled
#[async_trait]
pub trait BiasSource: Send + Sync {
    /// Apply a bias set-point.
    ///
    /// # Returns
    /// - Ok(()) once the bias is applied
    /// - Err on transport fault
    async fn set_bias(&self, millivolts: f64) -> HardwareResult<()>;

    /// Last applied bias set-point in millivolts.
    async fn bias(&self) -> HardwareResult<f64>;
}

/// One calibrated reading of the device under test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Measured junction voltage (mV)
    pub voltage: f64,
    /// Measured junction current (mA)
    pub current: f64,
    /// IF power (W), `None` when no power meter is fitted
    pub power: Option<f64>,
}

/// Capability: Calibrated Sampling
///
/// Devices that read voltage, current and (optionally) IF power at the present bias.
///
/// # Contract
/// - Communication and timeout errors may be retried by the caller
/// - Protocol errors mean the reply could not be interpreted
#[async_trait]
pub trait Sampler: Send + Sync {
    /// Take one calibrated sample.
    async fn sample(&self) -> HardwareResult<Sample>;
}

/// Position of the calibration load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// Load in the beam (hot measurement)
    In,
    /// Load out of the beam (cold measurement)
    Out,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadState::In => write!(f, "in"),
            LoadState::Out => write!(f, "out"),
        }
    }
}

/// Capability: Calibration Load Switching
///
/// Devices that move a calibration load in and out of the signal path.
///
/// # Contract
/// - `set_state` blocks until the actuator's own switch time has elapsed
#[async_trait]
pub trait LoadActuator: Send + Sync {
    /// Move the load to `state`.
    async fn set_state(&self, state: LoadState) -> HardwareResult<()>;
}

/// Capability: Scalar Readout
///
/// Devices that produce single scalar values (power meters, temperature sensors).
///
/// # Contract
/// - `read()` performs measurement and returns value
/// - Units are device-specific (document in implementation)
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read current value
    async fn read(&self) -> HardwareResult<f64>;
}

/// Capability: DAC Output
///
/// DAQ boards with analog output channels.
#[async_trait]
pub trait AnalogOutput: Send + Sync {
    /// Set the output voltage of `channel` (volts).
    async fn write_analog(&self, channel: u8, volts: f64) -> HardwareResult<()>;
}

/// Capability: ADC Scan
///
/// DAQ boards with analog input channels.
///
/// # Contract
/// - Returns one value per requested channel, in request order
/// - Each value is the mean of `n_avg` conversions
#[async_trait]
pub trait AnalogInput: Send + Sync {
    /// Scan `channels`, averaging `n_avg` conversions per channel (volts).
    async fn scan(&self, channels: &[u8], n_avg: u32) -> HardwareResult<Vec<f64>>;
}

/// Capability: Digital Output
///
/// DAQ boards with digital output lines.
#[async_trait]
pub trait DigitalOutput: Send + Sync {
    /// Drive digital line `bit` high (`true`) or low.
    async fn write_bit(&self, bit: u8, state: bool) -> HardwareResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // Mock implementations for testing

    struct MockBiasBox {
        bias: std::sync::Mutex<f64>,
    }

    #[async_trait]
    impl BiasSource for MockBiasBox {
        async fn set_bias(&self, millivolts: f64) -> HardwareResult<()> {
            *self.bias.lock().unwrap() = millivolts;
            Ok(())
        }

        async fn bias(&self) -> HardwareResult<f64> {
            Ok(*self.bias.lock().unwrap())
        }
    }

    #[async_trait]
    impl Sampler for MockBiasBox {
        async fn sample(&self) -> HardwareResult<Sample> {
            let v = *self.bias.lock().unwrap();
            Ok(Sample {
                voltage: v,
                current: v / 20.0,
                power: None,
            })
        }
    }

    #[tokio::test]
    async fn test_bias_source_and_sampler_through_trait_objects() {
        let device = Arc::new(MockBiasBox {
            bias: std::sync::Mutex::new(0.0),
        });
        let bias: Arc<dyn BiasSource> = device.clone();
        let sampler: Arc<dyn Sampler> = device;

        bias.set_bias(2.0).await.unwrap();
        assert_eq!(bias.bias().await.unwrap(), 2.0);

        let sample = sampler.sample().await.unwrap();
        assert_eq!(sample.voltage, 2.0);
        assert_eq!(sample.current, 0.1);
        assert!(sample.power.is_none());
    }

    struct MockPowerMeter;

    #[async_trait]
    impl Readable for MockPowerMeter {
        async fn read(&self) -> HardwareResult<f64> {
            Ok(1.5e-9)
        }
    }

    #[tokio::test]
    async fn test_readable_trait() {
        let meter = MockPowerMeter;
        assert_eq!(meter.read().await.unwrap(), 1.5e-9);
    }

    #[test]
    fn test_load_state_display() {
        assert_eq!(LoadState::In.to_string(), "in");
        assert_eq!(LoadState::Out.to_string(), "out");
    }
}

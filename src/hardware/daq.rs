//! DAQ-board bias box.
//!
//! An SIS bias supply driven from a multifunction DAQ board: one DAC channel sets the
//! bias through a voltage divider, two ADC channels monitor the junction voltage and the
//! current-sense amplifier. [`BiasCalibration`] holds the amplifier gains and the offset
//! that lets a unipolar DAC produce negative bias.
//!
//! [`DaqBias`] turns such a board into the [`BiasSource`] and [`Sampler`] capabilities,
//! optionally pairing it with an IF power meter.

use crate::error::HardwareError;
use crate::hardware::capabilities::{
    AnalogInput, AnalogOutput, BiasSource, HardwareResult, Readable, Sample, Sampler,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::trace;

/// Conversion between DAQ volts and junction bias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasCalibration {
    /// Voltage monitor gain (V at the ADC per V at the junction)
    pub voltage_gain: f64,
    /// Current monitor gain (V at the ADC per mA through the junction)
    pub current_gain: f64,
    /// DAQ voltage corresponding to zero bias (V)
    pub voltage_offset: f64,
}

impl Default for BiasCalibration {
    fn default() -> Self {
        Self {
            voltage_gain: 100.0,
            current_gain: 10.0,
            voltage_offset: 2.5,
        }
    }
}

impl BiasCalibration {
    /// DAC output voltage for a bias in millivolts.
    pub fn dac_volts(&self, bias_mv: f64) -> f64 {
        bias_mv * self.voltage_gain / 1000.0 + self.voltage_offset
    }

    /// Junction voltage in millivolts for a voltage-monitor ADC reading.
    pub fn bias_mv(&self, adc_volts: f64) -> f64 {
        (adc_volts - self.voltage_offset) * 1000.0 / self.voltage_gain
    }

    /// Junction current in milliamps for a current-monitor ADC reading.
    pub fn current_ma(&self, adc_volts: f64) -> f64 {
        (adc_volts - self.voltage_offset) / self.current_gain
    }
}

/// Channel assignment on the DAQ board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaqChannels {
    /// DAC channel driving the bias
    pub output: u8,
    /// ADC channel on the voltage monitor
    pub voltage: u8,
    /// ADC channel on the current monitor
    pub current: u8,
}

impl Default for DaqChannels {
    fn default() -> Self {
        Self {
            output: 0,
            voltage: 0,
            current: 1,
        }
    }
}

/// Bias supply built on a DAQ board.
///
/// # Example
///
/// ```rust,ignore
/// let bias = DaqBias::new(board, DaqChannels::default(), BiasCalibration::default())
///     .with_averaging(20)
///     .with_settle_time(Duration::from_millis(50))
///     .with_power_meter(meter);
/// bias.set_bias(2.2).await?;
/// let sample = bias.sample().await?;
/// ```
pub struct DaqBias<B> {
    board: Arc<B>,
    channels: DaqChannels,
    calibration: BiasCalibration,
    n_avg: u32,
    settle_time: Duration,
    power_meter: Option<Arc<dyn Readable>>,
    bias_mv: RwLock<f64>,
}

impl<B> DaqBias<B>
where
    B: AnalogOutput + AnalogInput,
{
    /// Create a bias supply on `board` with single-conversion reads and no settle delay.
    pub fn new(board: Arc<B>, channels: DaqChannels, calibration: BiasCalibration) -> Self {
        Self {
            board,
            channels,
            calibration,
            n_avg: 1,
            settle_time: Duration::ZERO,
            power_meter: None,
            bias_mv: RwLock::new(0.0),
        }
    }

    /// Number of ADC conversions averaged per sample (minimum 1).
    pub fn with_averaging(mut self, n_avg: u32) -> Self {
        self.n_avg = n_avg.max(1);
        self
    }

    /// Delay after each DAC write before the bias is considered settled.
    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }

    /// Attach an IF power meter; samples then carry `power`.
    pub fn with_power_meter(mut self, meter: Arc<dyn Readable>) -> Self {
        self.power_meter = Some(meter);
        self
    }

    /// Calibration in use.
    pub fn calibration(&self) -> &BiasCalibration {
        &self.calibration
    }
}

#[async_trait]
impl<B> BiasSource for DaqBias<B>
where
    B: AnalogOutput + AnalogInput,
{
    async fn set_bias(&self, millivolts: f64) -> HardwareResult<()> {
        let volts = self.calibration.dac_volts(millivolts);
        trace!(bias_mv = millivolts, dac_volts = volts, "Setting bias");
        self.board.write_analog(self.channels.output, volts).await?;
        sleep(self.settle_time).await;
        *self.bias_mv.write().await = millivolts;
        Ok(())
    }

    async fn bias(&self) -> HardwareResult<f64> {
        Ok(*self.bias_mv.read().await)
    }
}

#[async_trait]
impl<B> Sampler for DaqBias<B>
where
    B: AnalogOutput + AnalogInput,
{
    async fn sample(&self) -> HardwareResult<Sample> {
        let channels = [self.channels.voltage, self.channels.current];
        let readings = self.board.scan(&channels, self.n_avg).await?;
        let [v_adc, i_adc] = readings[..] else {
            return Err(HardwareError::protocol(
                "daq",
                format!("expected 2 channel readings, got {}", readings.len()),
            ));
        };

        let power = match &self.power_meter {
            Some(meter) => Some(meter.read().await?),
            None => None,
        };

        Ok(Sample {
            voltage: self.calibration.bias_mv(v_adc),
            current: self.calibration.current_ma(i_adc),
            power,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{SimulatedDaqBoard, SimulatedPowerMeter};

    #[test]
    fn test_calibration_round_trip() {
        let cal = BiasCalibration::default();
        assert_eq!(cal.dac_volts(0.0), 2.5);
        assert!((cal.dac_volts(15.0) - 4.0).abs() < 1e-12);
        assert!((cal.dac_volts(-15.0) - 1.0).abs() < 1e-12);
        assert!((cal.bias_mv(cal.dac_volts(2.2)) - 2.2).abs() < 1e-12);
        assert!((cal.current_ma(3.5) - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_set_bias_drives_dac_output() {
        let cal = BiasCalibration::default();
        let board = Arc::new(SimulatedDaqBoard::new(DaqChannels::default(), cal));
        let bias = DaqBias::new(board.clone(), DaqChannels::default(), cal);

        bias.set_bias(3.0).await.unwrap();

        assert_eq!(bias.bias().await.unwrap(), 3.0);
        assert!((board.junction_bias_mv().await - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sample_reads_calibrated_voltage_and_current() {
        let cal = BiasCalibration::default();
        let board = Arc::new(SimulatedDaqBoard::new(DaqChannels::default(), cal));
        let bias = DaqBias::new(board.clone(), DaqChannels::default(), cal).with_averaging(4);

        bias.set_bias(5.0).await.unwrap();
        let sample = bias.sample().await.unwrap();

        assert!((sample.voltage - 5.0).abs() < 1e-9);
        let expected = board.junction().current_ma(5.0);
        assert!((sample.current - expected).abs() < 1e-9);
        assert!(sample.power.is_none());
    }

    #[tokio::test]
    async fn test_sample_includes_power_when_meter_attached() {
        let cal = BiasCalibration::default();
        let board = Arc::new(SimulatedDaqBoard::new(DaqChannels::default(), cal));
        let meter = Arc::new(SimulatedPowerMeter::new(board.clone()));
        let bias = DaqBias::new(board, DaqChannels::default(), cal).with_power_meter(meter);

        bias.set_bias(2.0).await.unwrap();
        let sample = bias.sample().await.unwrap();

        assert!(sample.power.is_some_and(|p| p > 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_bias_waits_settle_time() {
        let cal = BiasCalibration::default();
        let board = Arc::new(SimulatedDaqBoard::new(DaqChannels::default(), cal));
        let bias = DaqBias::new(board, DaqChannels::default(), cal)
            .with_settle_time(Duration::from_millis(100));

        let start = tokio::time::Instant::now();
        bias.set_bias(1.0).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}

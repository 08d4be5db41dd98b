//! Duty-cycled hot/cold sweep executor.
//!
//! The sweep points are measured in groups of `load_cycle` so the load actuator and
//! its settle time are paid once per group rather than once per point:
//!
//! ```text
//! for each group:
//!     load OUT, settle          -> bias + sample every point (V, I, cold power)
//!     load IN,  settle          -> bias + sample every point again (hot power, Y, Tsys)
//!     hand the group's rows to the sink
//! ```
//!
//! Everything runs on one task, strictly in sequence: the bias source, sampler and load
//! actuator are one physical bench. A stop request is honoured only between groups, so
//! no point is left half measured. Rows of a group that fails part way are discarded.

use super::points::{SweepConfig, SweepPoint};
use super::{SampleRow, SweepResult};
use crate::data::RowSink;
use crate::error::{HardwareError, SweepError};
use crate::error_recovery::{retry_with_policy, RetryPolicy};
use crate::hardware::{BiasSource, LoadActuator, LoadState, Readable, Sample, Sampler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// The bench a sweep runs on.
///
/// Only the bias source and sampler are required. Without a load actuator each point is
/// measured once and the hot-side fields hold sentinels. Temperature sensors, when
/// fitted, replace the configured load temperatures.
#[derive(Clone)]
pub struct Instruments {
    /// Bias supply
    pub bias: Arc<dyn BiasSource>,
    /// Voltage/current/power sampler
    pub sampler: Arc<dyn Sampler>,
    /// Calibration load mover
    pub load: Option<Arc<dyn LoadActuator>>,
    /// Hot load thermometer (K)
    pub hot_sensor: Option<Arc<dyn Readable>>,
    /// Cold load thermometer (K)
    pub cold_sensor: Option<Arc<dyn Readable>>,
}

impl Instruments {
    /// Bench with a bias source and sampler only.
    pub fn new(bias: Arc<dyn BiasSource>, sampler: Arc<dyn Sampler>) -> Self {
        Self {
            bias,
            sampler,
            load: None,
            hot_sensor: None,
            cold_sensor: None,
        }
    }

    /// Add a load actuator.
    pub fn with_load_actuator(mut self, load: Arc<dyn LoadActuator>) -> Self {
        self.load = Some(load);
        self
    }

    /// Add a hot load thermometer.
    pub fn with_hot_sensor(mut self, sensor: Arc<dyn Readable>) -> Self {
        self.hot_sensor = Some(sensor);
        self
    }

    /// Add a cold load thermometer.
    pub fn with_cold_sensor(mut self, sensor: Arc<dyn Readable>) -> Self {
        self.cold_sensor = Some(sensor);
        self
    }
}

/// Shared flag asking a running sweep to stop at the next group boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    /// Create a handle with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the sweep to stop before its next group.
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Clear a previous request.
    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

/// Failure inside a group: the point index and the unresolved error.
type GroupFailure = (usize, HardwareError);

/// Executes hot/cold sweeps.
///
/// # Example
///
/// ```rust,ignore
/// let config = SweepConfig::builder(0.0, 5.0, 0.05)
///     .reverse(true)
///     .load_cycle(10)
///     .build()?;
/// let points = generate_sweep_points(&config);
///
/// let controller = SweepController::new();
/// let result = controller.run_sweep(&points, &config, &instruments, &mut sink).await?;
/// println!("best Tsys: {:?}", result.best_tsys());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SweepController {
    retry: RetryPolicy,
    stop: StopHandle,
}

impl SweepController {
    /// Controller with the default retry policy (two retries).
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the retry policy for hardware calls.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use an existing stop handle.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Handle that stops this controller's runs between groups.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run a sweep over `points`.
    ///
    /// Rows are handed to `sink` group by group, in point order, and returned as a
    /// [`SweepResult`] of the same length and order as `points`. The sink is finished
    /// before returning whether or not the run completed; a failed finish turns an
    /// otherwise successful run into [`SweepError::Sink`] and is only logged when the
    /// run already failed.
    ///
    /// A pending stop request is honoured before the first group and cleared when the
    /// run returns, so the next run starts afresh.
    ///
    /// # Errors
    ///
    /// - [`SweepError::Configuration`] if `points` is empty (no hardware is touched)
    /// - [`SweepError::Aborted`] when a hardware error survives the retry policy
    /// - [`SweepError::Stopped`] when a stop was requested
    /// - [`SweepError::Sink`] when the sink rejects a row or fails to finish
    pub async fn run_sweep(
        &self,
        points: &[SweepPoint],
        config: &SweepConfig,
        instruments: &Instruments,
        sink: &mut dyn RowSink,
    ) -> Result<SweepResult, SweepError> {
        if points.is_empty() {
            return Err(SweepError::Configuration("no sweep points".into()));
        }

        let span = info_span!(
            "sweep",
            points = points.len(),
            load_cycle = config.load_cycle(),
            load_switching = instruments.load.is_some()
        );

        async move {
            info!("Sweep started");
            let mut outcome = self.run_groups(points, config, instruments, sink).await;
            // A stop request is consumed by the run that sees it
            self.stop.reset();

            if let Err(source) = sink.finish().await {
                match outcome {
                    Ok(result) => {
                        outcome = Err(SweepError::Sink {
                            index: result.len(),
                            partial: result,
                            source,
                        });
                    }
                    Err(_) => warn!(error = %source, "Failed to finish row sink"),
                }
            }

            match &outcome {
                Ok(result) => {
                    self.park(config, instruments).await;
                    info!(rows = result.len(), "Sweep complete");
                }
                Err(e) => error!(error = %e, "Sweep ended early"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_groups(
        &self,
        points: &[SweepPoint],
        config: &SweepConfig,
        instruments: &Instruments,
        sink: &mut dyn RowSink,
    ) -> Result<SweepResult, SweepError> {
        let mut result = SweepResult::with_capacity(points.len());

        for (group_index, group) in points.chunks(config.load_cycle()).enumerate() {
            let start = group_index * config.load_cycle();

            if self.stop.is_stop_requested() {
                warn!(next_index = start, "Stop requested, ending sweep");
                return Err(SweepError::Stopped {
                    next_index: start,
                    partial: result,
                });
            }

            let rows = self
                .run_group(start, group, config, instruments)
                .instrument(tracing::debug_span!("group", index = group_index, start))
                .await;

            let rows = match rows {
                Ok(rows) => rows,
                Err((index, source)) => {
                    return Err(SweepError::Aborted {
                        index,
                        partial: result,
                        source,
                    });
                }
            };

            for row in &rows {
                info!(
                    bias_mv = row.bias,
                    voltage_mv = row.voltage,
                    current_ma = row.current,
                    cold_power_w = row.cold_power,
                    hot_power_w = row.hot_power,
                    y_factor = row.y_factor,
                    tsys_k = row.tsys,
                    "Point measured"
                );
                result.push(*row);
            }

            for (offset, row) in rows.iter().enumerate() {
                if let Err(source) = sink.append_row(row).await {
                    return Err(SweepError::Sink {
                        index: start + offset,
                        partial: result,
                        source,
                    });
                }
            }
        }

        Ok(result)
    }

    async fn run_group(
        &self,
        start: usize,
        group: &[SweepPoint],
        config: &SweepConfig,
        instruments: &Instruments,
    ) -> Result<Vec<SampleRow>, GroupFailure> {
        let Some(load) = &instruments.load else {
            let mut rows = Vec::with_capacity(group.len());
            for (offset, &bias) in group.iter().enumerate() {
                let sample = self
                    .measure(bias, instruments)
                    .await
                    .map_err(|e| (start + offset, e))?;
                rows.push(SampleRow::without_load(
                    bias,
                    &sample,
                    config.t_hot(),
                    config.t_cold(),
                ));
            }
            return Ok(rows);
        };

        // Cold pass
        self.move_load(load.as_ref(), LoadState::Out, config)
            .await
            .map_err(|e| (start, e))?;
        let t_cold = self
            .load_temperature(instruments.cold_sensor.as_deref(), config.t_cold())
            .await
            .map_err(|e| (start, e))?;

        let mut rows = Vec::with_capacity(group.len());
        for (offset, &bias) in group.iter().enumerate() {
            let sample = self
                .measure(bias, instruments)
                .await
                .map_err(|e| (start + offset, e))?;
            rows.push(SampleRow::from_cold(bias, &sample, t_cold));
        }

        // Hot pass: bias is re-applied, it is not assumed to persist across the move
        self.move_load(load.as_ref(), LoadState::In, config)
            .await
            .map_err(|e| (start, e))?;
        let t_hot = self
            .load_temperature(instruments.hot_sensor.as_deref(), config.t_hot())
            .await
            .map_err(|e| (start, e))?;

        for (offset, row) in rows.iter_mut().enumerate() {
            let sample = self
                .measure(row.bias, instruments)
                .await
                .map_err(|e| (start + offset, e))?;
            row.record_hot(sample.power, t_hot);
        }

        Ok(rows)
    }

    async fn measure(&self, bias: f64, instruments: &Instruments) -> Result<Sample, HardwareError> {
        retry_with_policy("set_bias", &self.retry, || instruments.bias.set_bias(bias)).await?;
        retry_with_policy("sample", &self.retry, || instruments.sampler.sample()).await
    }

    async fn move_load(
        &self,
        load: &dyn LoadActuator,
        state: LoadState,
        config: &SweepConfig,
    ) -> Result<(), HardwareError> {
        debug!(load = %state, "Moving load");
        retry_with_policy("set_load", &self.retry, || load.set_state(state)).await?;
        sleep(config.settle_time()).await;
        Ok(())
    }

    async fn load_temperature(
        &self,
        sensor: Option<&dyn Readable>,
        nominal: f64,
    ) -> Result<f64, HardwareError> {
        match sensor {
            Some(sensor) => {
                let kelvin = retry_with_policy("read_temperature", &self.retry, || sensor.read()).await?;
                debug!(kelvin, "Load temperature read");
                Ok(kelvin)
            }
            None => Ok(nominal),
        }
    }

    async fn park(&self, config: &SweepConfig, instruments: &Instruments) {
        let Some(park) = config.park_bias() else {
            return;
        };
        match retry_with_policy("set_bias", &self.retry, || instruments.bias.set_bias(park)).await {
            Ok(()) => info!(bias_mv = park, "Bias parked"),
            Err(e) => warn!(bias_mv = park, error = %e, "Failed to park bias"),
        }
    }
}

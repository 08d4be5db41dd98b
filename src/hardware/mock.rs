//! Simulated DAQ bench
//!
//! Simulated devices for running sweeps without a cryostat. All mocks use async-safe
//! locking and never block the runtime.
//!
//! # Available Mocks
//!
//! - `SimulatedDaqBoard` - DAQ board wired to a simulated SIS junction and load mover
//! - `SimulatedPowerMeter` - IF power meter reading the board's receiver model
//! - `FixedThermometer` - temperature sensor returning a constant
//!
//! # Receiver Model
//!
//! The junction follows a smoothed step IV curve (normal-state resistance above the gap,
//! subgap leakage below it). IF output power is `gain * (T_load + T_rx(bias))`, with the
//! receiver noise temperature `T_rx` a parabola centred on the first photon step, so a
//! hot/cold sweep recovers `T_rx` as its Tsys.

use crate::error::{HardwareError, HardwareErrorKind};
use crate::hardware::capabilities::{
    AnalogInput, AnalogOutput, DigitalOutput, HardwareResult, LoadState, Readable,
};
use crate::hardware::daq::{BiasCalibration, DaqChannels};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

// =============================================================================
// Junction and IF models
// =============================================================================

/// Simulated SIS junction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SisJunction {
    /// Gap voltage (mV)
    pub gap_mv: f64,
    /// Width of the current onset at the gap (mV)
    pub transition_width_mv: f64,
    /// Normal-state resistance (ohm)
    pub normal_resistance_ohm: f64,
    /// Subgap leakage resistance (ohm)
    pub subgap_resistance_ohm: f64,
}

impl Default for SisJunction {
    fn default() -> Self {
        Self {
            gap_mv: 2.8,
            transition_width_mv: 0.05,
            normal_resistance_ohm: 20.0,
            subgap_resistance_ohm: 400.0,
        }
    }
}

impl SisJunction {
    /// Junction current (mA) at `bias_mv`. mV / ohm gives mA directly.
    pub fn current_ma(&self, bias_mv: f64) -> f64 {
        let onset =
            1.0 / (1.0 + (-(bias_mv.abs() - self.gap_mv) / self.transition_width_mv).exp());
        bias_mv / self.normal_resistance_ohm * onset
            + bias_mv / self.subgap_resistance_ohm * (1.0 - onset)
    }
}

/// Simulated receiver IF chain and calibration loads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfModel {
    /// Physical temperature of the hot load (K)
    pub hot_load_k: f64,
    /// Physical temperature of the cold load (K)
    pub cold_load_k: f64,
    /// IF chain gain times bandwidth times Boltzmann's constant (W/K)
    pub gain_w_per_k: f64,
    /// Minimum receiver noise temperature (K)
    pub min_receiver_k: f64,
    /// Bias of the receiver noise minimum (mV)
    pub optimum_bias_mv: f64,
    /// Curvature of the receiver noise around the optimum (K/mV^2)
    pub curvature_k_per_mv2: f64,
}

impl Default for IfModel {
    fn default() -> Self {
        Self {
            hot_load_k: 295.0,
            cold_load_k: 77.0,
            gain_w_per_k: 1.0e-9,
            min_receiver_k: 35.0,
            optimum_bias_mv: 2.2,
            curvature_k_per_mv2: 25.0,
        }
    }
}

impl IfModel {
    /// Receiver noise temperature (K) at `bias_mv`.
    pub fn receiver_temperature_k(&self, bias_mv: f64) -> f64 {
        let detune = bias_mv.abs() - self.optimum_bias_mv;
        self.min_receiver_k + self.curvature_k_per_mv2 * detune * detune
    }

    /// IF output power (W) at `bias_mv` looking at the given load.
    pub fn if_power_w(&self, bias_mv: f64, load: LoadState) -> f64 {
        let t_load = match load {
            LoadState::In => self.hot_load_k,
            LoadState::Out => self.cold_load_k,
        };
        self.gain_w_per_k * (t_load + self.receiver_temperature_k(bias_mv))
    }
}

// =============================================================================
// Fault injection
// =============================================================================

/// Board operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardOperation {
    /// `AnalogOutput::write_analog`
    WriteAnalog,
    /// `AnalogInput::scan`
    Scan,
    /// `DigitalOutput::write_bit`
    WriteBit,
}

/// Make a board operation fail on specific calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InjectedFault {
    /// Operation to fail
    pub operation: BoardOperation,
    /// First failing call, 1-based
    pub on_call: u32,
    /// Number of consecutive failing calls
    pub repeat: u32,
    /// Error returned
    pub kind: HardwareErrorKind,
}

impl InjectedFault {
    /// Fail only the `on_call`-th call of `operation`.
    pub fn once(operation: BoardOperation, on_call: u32, kind: HardwareErrorKind) -> Self {
        Self {
            operation,
            on_call,
            repeat: 1,
            kind,
        }
    }

    /// Keep failing for `repeat` consecutive calls.
    pub fn repeated(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    fn triggers(&self, operation: BoardOperation, call: u32) -> bool {
        self.operation == operation
            && call >= self.on_call
            && call < self.on_call.saturating_add(self.repeat)
    }
}

// =============================================================================
// SimulatedDaqBoard
// =============================================================================

#[derive(Default)]
struct BoardState {
    dac: HashMap<u8, f64>,
    bits: HashMap<u8, bool>,
    calls: HashMap<BoardOperation, u32>,
    rng: Option<StdRng>,
}

/// DAQ board wired to a simulated SIS mixer bench.
///
/// The bias DAC channel drives the junction through `calibration`; the voltage and
/// current monitor channels read it back. The load mover sits on digital line
/// `load_bit`, with `load_in_state` putting the hot load in the beam.
///
/// # Example
///
/// ```rust,ignore
/// let board = Arc::new(
///     SimulatedDaqBoard::new(DaqChannels::default(), BiasCalibration::default())
///         .with_noise(1e-4, 42)
///         .with_faults(vec![InjectedFault::once(
///             BoardOperation::Scan,
///             3,
///             HardwareErrorKind::Timeout,
///         )]),
/// );
/// ```
pub struct SimulatedDaqBoard {
    channels: DaqChannels,
    calibration: BiasCalibration,
    junction: SisJunction,
    if_model: IfModel,
    load_bit: u8,
    load_in_state: bool,
    noise_volts: f64,
    faults: Vec<InjectedFault>,
    state: Mutex<BoardState>,
}

impl SimulatedDaqBoard {
    /// Create a noiseless board with default junction and IF models.
    pub fn new(channels: DaqChannels, calibration: BiasCalibration) -> Self {
        Self {
            channels,
            calibration,
            junction: SisJunction::default(),
            if_model: IfModel::default(),
            load_bit: 0,
            load_in_state: true,
            noise_volts: 0.0,
            faults: Vec::new(),
            state: Mutex::new(BoardState::default()),
        }
    }

    /// Replace the junction model.
    pub fn with_junction(mut self, junction: SisJunction) -> Self {
        self.junction = junction;
        self
    }

    /// Replace the IF model.
    pub fn with_if_model(mut self, if_model: IfModel) -> Self {
        self.if_model = if_model;
        self
    }

    /// Digital line of the load mover and the level that puts the load in.
    pub fn with_load_bit(mut self, bit: u8, load_in_state: bool) -> Self {
        self.load_bit = bit;
        self.load_in_state = load_in_state;
        self
    }

    /// Add uniform ADC noise of +/- `volts`, seeded for reproducibility.
    pub fn with_noise(mut self, volts: f64, seed: u64) -> Self {
        self.noise_volts = volts.abs();
        self.state.get_mut().rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    /// Inject failures.
    pub fn with_faults(mut self, faults: Vec<InjectedFault>) -> Self {
        self.faults = faults;
        self
    }

    /// Junction model in use.
    pub fn junction(&self) -> &SisJunction {
        &self.junction
    }

    /// IF model in use.
    pub fn if_model(&self) -> &IfModel {
        &self.if_model
    }

    /// Bias currently applied to the junction (mV).
    pub async fn junction_bias_mv(&self) -> f64 {
        let state = self.state.lock().await;
        self.bias_from(&state)
    }

    /// Position of the load according to the load mover line.
    pub async fn load_state(&self) -> LoadState {
        let state = self.state.lock().await;
        self.load_from(&state)
    }

    /// IF power (W) at the present bias and load position.
    pub async fn if_power_w(&self) -> f64 {
        let state = self.state.lock().await;
        self.if_model
            .if_power_w(self.bias_from(&state), self.load_from(&state))
    }

    /// Number of calls made to `operation`, failed ones included.
    pub async fn call_count(&self, operation: BoardOperation) -> u32 {
        self.state
            .lock()
            .await
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    fn bias_from(&self, state: &BoardState) -> f64 {
        let dac = state
            .dac
            .get(&self.channels.output)
            .copied()
            .unwrap_or(self.calibration.voltage_offset);
        self.calibration.bias_mv(dac)
    }

    fn load_from(&self, state: &BoardState) -> LoadState {
        match state.bits.get(&self.load_bit) {
            Some(level) if *level == self.load_in_state => LoadState::In,
            _ => LoadState::Out,
        }
    }

    fn record_call(
        &self,
        state: &mut BoardState,
        operation: BoardOperation,
    ) -> HardwareResult<()> {
        let call = state.calls.entry(operation).or_insert(0);
        *call += 1;
        let call = *call;

        match self.faults.iter().find(|f| f.triggers(operation, call)) {
            Some(fault) => Err(HardwareError::new(
                "simulated_daq",
                fault.kind,
                format!("injected failure on {:?} call {}", operation, call),
            )),
            None => Ok(()),
        }
    }

    fn averaged_noise(&self, state: &mut BoardState, n_avg: u32) -> f64 {
        let Some(rng) = state.rng.as_mut() else {
            return 0.0;
        };
        if self.noise_volts == 0.0 {
            return 0.0;
        }
        let n = n_avg.max(1);
        let total: f64 = (0..n)
            .map(|_| rng.gen_range(-self.noise_volts..=self.noise_volts))
            .sum();
        total / f64::from(n)
    }
}

#[async_trait]
impl AnalogOutput for SimulatedDaqBoard {
    async fn write_analog(&self, channel: u8, volts: f64) -> HardwareResult<()> {
        let mut state = self.state.lock().await;
        self.record_call(&mut state, BoardOperation::WriteAnalog)?;
        state.dac.insert(channel, volts);
        Ok(())
    }
}

#[async_trait]
impl AnalogInput for SimulatedDaqBoard {
    async fn scan(&self, channels: &[u8], n_avg: u32) -> HardwareResult<Vec<f64>> {
        let mut state = self.state.lock().await;
        self.record_call(&mut state, BoardOperation::Scan)?;

        let bias = self.bias_from(&state);
        let mut readings = Vec::with_capacity(channels.len());
        for &channel in channels {
            let clean = if channel == self.channels.voltage {
                self.calibration.dac_volts(bias)
            } else if channel == self.channels.current {
                self.junction.current_ma(bias) * self.calibration.current_gain
                    + self.calibration.voltage_offset
            } else {
                return Err(HardwareError::protocol(
                    "simulated_daq",
                    format!("analog input {} is not wired", channel),
                ));
            };
            readings.push(clean + self.averaged_noise(&mut state, n_avg));
        }
        Ok(readings)
    }
}

#[async_trait]
impl DigitalOutput for SimulatedDaqBoard {
    async fn write_bit(&self, bit: u8, level: bool) -> HardwareResult<()> {
        let mut state = self.state.lock().await;
        self.record_call(&mut state, BoardOperation::WriteBit)?;
        state.bits.insert(bit, level);
        Ok(())
    }
}

// =============================================================================
// Readouts
// =============================================================================

/// IF power meter reading a [`SimulatedDaqBoard`]'s receiver model (watts).
pub struct SimulatedPowerMeter {
    board: Arc<SimulatedDaqBoard>,
}

impl SimulatedPowerMeter {
    /// Create a power meter on `board`'s IF output.
    pub fn new(board: Arc<SimulatedDaqBoard>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Readable for SimulatedPowerMeter {
    async fn read(&self) -> HardwareResult<f64> {
        Ok(self.board.if_power_w().await)
    }
}

/// Temperature sensor with a constant reading (kelvin).
pub struct FixedThermometer {
    kelvin: f64,
}

impl FixedThermometer {
    /// Create a sensor that always reads `kelvin`.
    pub fn new(kelvin: f64) -> Self {
        Self { kelvin }
    }
}

#[async_trait]
impl Readable for FixedThermometer {
    async fn read(&self) -> HardwareResult<f64> {
        Ok(self.kelvin)
    }
}

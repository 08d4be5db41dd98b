//! Hot/cold load bias sweeps.
//!
//! - `points`: sweep parameters and set-point generation
//! - `yfactor`: Y-factor and noise temperature with sentinel handling
//! - `controller`: the duty-cycled sweep executor
//!
//! A run takes an immutable [`SweepConfig`] and produces a fresh [`SweepResult`]; nothing
//! is carried over between runs.

pub mod controller;
pub mod points;
pub mod yfactor;

pub use controller::{Instruments, StopHandle, SweepController};
pub use points::{generate_sweep_points, SweepConfig, SweepConfigBuilder, SweepPoint};
pub use yfactor::{tsys, y_factor, TSYS_UNDEFINED, Y_FACTOR_UNDEFINED};

use crate::hardware::Sample;
use serde::{Deserialize, Serialize};

/// Measurements and derived quantities for one sweep point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    /// Requested bias (mV)
    #[serde(rename = "bias_mv")]
    pub bias: f64,
    /// Measured voltage during the cold pass (mV)
    #[serde(rename = "voltage_mv")]
    pub voltage: f64,
    /// Measured current during the cold pass (mA)
    #[serde(rename = "current_ma")]
    pub current: f64,
    /// IF power with the load out (W)
    #[serde(rename = "cold_power_w")]
    pub cold_power: f64,
    /// IF power with the load in (W)
    #[serde(rename = "hot_power_w")]
    pub hot_power: f64,
    /// `hot_power / cold_power`, or the sentinel
    pub y_factor: f64,
    /// System noise temperature (K), or the sentinel
    #[serde(rename = "tsys_k")]
    pub tsys: f64,
    /// Hot load temperature used for `tsys` (K)
    #[serde(rename = "t_hot_k")]
    pub t_hot: f64,
    /// Cold load temperature used for `tsys` (K)
    #[serde(rename = "t_cold_k")]
    pub t_cold: f64,
}

impl SampleRow {
    /// Row filled from the cold (load out) pass. Hot quantities hold sentinels until
    /// [`SampleRow::record_hot`] is called.
    pub fn from_cold(bias: f64, sample: &Sample, t_cold: f64) -> Self {
        Self {
            bias,
            voltage: sample.voltage,
            current: sample.current,
            cold_power: sample.power.unwrap_or(0.0),
            hot_power: 0.0,
            y_factor: Y_FACTOR_UNDEFINED,
            tsys: TSYS_UNDEFINED,
            t_hot: f64::NAN,
            t_cold,
        }
    }

    /// Complete the row with the hot (load in) pass power and derive Y and Tsys.
    ///
    /// A missing power reading counts as zero, which leaves both derived values at their
    /// sentinels.
    pub fn record_hot(&mut self, hot_power: Option<f64>, t_hot: f64) {
        self.hot_power = hot_power.unwrap_or(0.0);
        self.t_hot = t_hot;
        self.y_factor = y_factor(self.cold_power, self.hot_power);
        self.tsys = tsys(self.y_factor, self.t_hot, self.t_cold);
    }

    /// Row for a bench without a load actuator: a single pass, no hot measurement.
    pub fn without_load(bias: f64, sample: &Sample, t_hot: f64, t_cold: f64) -> Self {
        Self {
            t_hot,
            ..Self::from_cold(bias, sample, t_cold)
        }
    }

    /// Whether this row carries a usable noise temperature.
    pub fn has_tsys(&self) -> bool {
        yfactor::is_defined(self.tsys)
    }
}

/// Rows of one sweep run, in sweep point order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepResult {
    rows: Vec<SampleRow>,
}

impl SweepResult {
    /// Empty result with room for `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, row: SampleRow) {
        self.rows.push(row);
    }

    /// Completed rows.
    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }

    /// Number of completed rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` if no row was completed.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over completed rows.
    pub fn iter(&self) -> std::slice::Iter<'_, SampleRow> {
        self.rows.iter()
    }

    /// Take ownership of the rows.
    pub fn into_rows(self) -> Vec<SampleRow> {
        self.rows
    }

    /// Row with the lowest defined noise temperature.
    pub fn best_tsys(&self) -> Option<&SampleRow> {
        self.rows
            .iter()
            .filter(|row| row.has_tsys())
            .min_by(|a, b| a.tsys.total_cmp(&b.tsys))
    }
}

impl<'a> IntoIterator for &'a SweepResult {
    type Item = &'a SampleRow;
    type IntoIter = std::slice::Iter<'a, SampleRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

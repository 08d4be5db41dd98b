//! Result persistence.
//!
//! The sweep controller hands every completed [`SampleRow`] to a [`RowSink`]. The file
//! format belongs to the sink, not the controller.

pub mod csv_sink;

pub use csv_sink::CsvSink;

use crate::error::SinkError;
use crate::sweep::{SampleRow, SweepConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Destination for completed sweep rows.
#[async_trait]
pub trait RowSink: Send {
    /// Persist one completed row. Rows arrive in sweep point order.
    async fn append_row(&mut self, row: &SampleRow) -> Result<(), SinkError>;

    /// Flush anything buffered. Called once after the run, successful or not.
    async fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Vec<SampleRow>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows received so far.
    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }
}

#[async_trait]
impl RowSink for MemorySink {
    async fn append_row(&mut self, row: &SampleRow) -> Result<(), SinkError> {
        self.rows.push(*row);
        Ok(())
    }
}

/// Run description written ahead of the data.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Lowest bias (mV)
    pub min_mv: f64,
    /// Highest bias (mV)
    pub max_mv: f64,
    /// Bias step (mV)
    pub step_mv: f64,
    /// Sweep direction
    pub reverse: bool,
    /// Points per load cycle
    pub load_cycle: usize,
    /// Settle time after load moves (ms)
    pub settle_time_ms: u128,
    /// Nominal hot load temperature (K)
    pub t_hot_k: f64,
    /// Nominal cold load temperature (K)
    pub t_cold_k: f64,
}

impl RunMetadata {
    /// Describe a run of `config` starting now.
    pub fn from_config(config: &SweepConfig) -> Self {
        Self {
            started_at: Utc::now(),
            min_mv: config.min(),
            max_mv: config.max(),
            step_mv: config.step(),
            reverse: config.reverse(),
            load_cycle: config.load_cycle(),
            settle_time_ms: config.settle_time().as_millis(),
            t_hot_k: config.t_hot(),
            t_cold_k: config.t_cold(),
        }
    }
}

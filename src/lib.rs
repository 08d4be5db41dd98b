//! # Y-factor sweep
//!
//! Hot/cold load bias sweeps for superconducting mixer test benches. The junction bias is
//! stepped through a range; at each point the IF output power is measured with an
//! ambient (hot) and a cryogenic (cold) load in front of the receiver, and the Y-factor
//! and receiver noise temperature are derived.
//!
//! ## Crate Structure
//!
//! - **`sweep`**: sweep parameters, set-point generation, Y-factor/Tsys arithmetic and the
//!   `SweepController` that duty-cycles the load mover.
//! - **`hardware`**: capability traits (`BiasSource`, `Sampler`, `LoadActuator`,
//!   `Readable`), the DAQ-board bias box and load mover built on them, and simulated
//!   hardware for tests and dry runs.
//! - **`data`**: the `RowSink` trait and the CSV writer.
//! - **`config`**: Figment settings loaded from TOML and `YSWEEP_` environment variables.
//! - **`error`**: hardware, sink, sweep and application errors.
//! - **`error_recovery`**: the retry policy applied to transient hardware errors.
//! - **`logging`**: `tracing-subscriber` initialisation.

pub mod config;
pub mod data;
pub mod error;
pub mod error_recovery;
pub mod hardware;
pub mod logging;
pub mod sweep;

pub use error::{AppError, AppResult, HardwareError, HardwareErrorKind, SinkError, SweepError};
pub use sweep::{
    generate_sweep_points, Instruments, SampleRow, StopHandle, SweepConfig, SweepController,
    SweepResult,
};

//! Hardware capabilities and their implementations.
//!
//! - `capabilities`: the traits the sweep controller consumes
//! - `daq`: bias supply on a DAQ board (`BiasSource` + `Sampler`)
//! - `load_mover`: load actuator on a DAQ digital line
//! - `mock`: simulated board, power meter and thermometer

pub mod capabilities;
pub mod daq;
pub mod load_mover;
pub mod mock;

pub use capabilities::{
    AnalogInput, AnalogOutput, BiasSource, DigitalOutput, HardwareResult, LoadActuator,
    LoadState, Readable, Sample, Sampler,
};
pub use daq::{BiasCalibration, DaqBias, DaqChannels};
pub use load_mover::DigitalLoadMover;

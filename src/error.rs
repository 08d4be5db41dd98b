//! Error types for the sweep library and the application shell.
//!
//! Errors are split by where they originate:
//!
//! - **`HardwareError`**: raised by capability implementations (bias source, sampler,
//!   load actuator, readouts). Its `kind` decides whether the sweep retries the call.
//! - **`SinkError`**: raised while persisting result rows.
//! - **`SweepError`**: what a sweep run returns when it cannot finish. Every variant that
//!   happens mid-run carries the rows completed so far, so the caller can decide whether
//!   to resume or discard.
//! - **`AppError`**: configuration loading and validation, plus wrappers around the
//!   others for the command-line front end.
//!
//! Degenerate numeric conditions (zero cold power, unity Y-factor) are not errors; they
//! are represented by sentinel values in [`crate::sweep::yfactor`].

use crate::sweep::SweepResult;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Classification of a hardware failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareErrorKind {
    /// Transient transport fault (bus error, dropped link). Retryable.
    Communication,
    /// The instrument did not answer in time. Retryable.
    Timeout,
    /// Malformed or unexpected response. Not retryable.
    Protocol,
}

impl std::fmt::Display for HardwareErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HardwareErrorKind::Communication => "communication",
            HardwareErrorKind::Timeout => "timeout",
            HardwareErrorKind::Protocol => "protocol",
        };
        write!(f, "{}", label)
    }
}

/// Error reported by a hardware capability.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Device '{device}' {kind} error: {message}")]
pub struct HardwareError {
    /// Name of the device that failed
    pub device: String,
    /// Failure classification
    pub kind: HardwareErrorKind,
    /// Human readable detail
    pub message: String,
}

impl HardwareError {
    /// Create a new hardware error.
    pub fn new(
        device: impl Into<String>,
        kind: HardwareErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a [`HardwareErrorKind::Communication`] error.
    pub fn communication(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(device, HardwareErrorKind::Communication, message)
    }

    /// Shorthand for a [`HardwareErrorKind::Timeout`] error.
    pub fn timeout(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(device, HardwareErrorKind::Timeout, message)
    }

    /// Shorthand for a [`HardwareErrorKind::Protocol`] error.
    pub fn protocol(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(device, HardwareErrorKind::Protocol, message)
    }

    /// Whether re-issuing the failed call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            HardwareErrorKind::Communication | HardwareErrorKind::Timeout
        )
    }
}

/// Error raised by a [`crate::data::RowSink`].
#[derive(Error, Debug)]
pub enum SinkError {
    /// File system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Metadata encoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reasons a sweep run ends without a complete result.
#[derive(Error, Debug)]
pub enum SweepError {
    /// Invalid sweep parameters. Raised before any hardware is touched.
    #[error("Sweep configuration error: {0}")]
    Configuration(String),

    /// A hardware error survived the retry policy.
    #[error("Sweep aborted at point {index}: {source}")]
    Aborted {
        /// 0-based index of the sweep point being measured
        index: usize,
        /// Rows completed before the failure
        partial: SweepResult,
        /// The unresolved hardware error
        source: HardwareError,
    },

    /// A stop was requested; the run ended on a group boundary.
    #[error("Sweep stopped before point {next_index}")]
    Stopped {
        /// Index of the first point that was not measured
        next_index: usize,
        /// Rows completed before the stop
        partial: SweepResult,
    },

    /// The row sink rejected a completed row or failed to finish.
    #[error("Failed to record row {index}: {source}")]
    Sink {
        /// Index of the row that could not be written; the row count when the final
        /// flush failed
        index: usize,
        /// Every fully measured row, including those of the failing group that the sink
        /// never received
        partial: SweepResult,
        /// Underlying sink error
        source: SinkError,
    },
}

impl SweepError {
    /// Rows completed before the run ended, if the run got that far.
    pub fn partial(&self) -> Option<&SweepResult> {
        match self {
            SweepError::Configuration(_) => None,
            SweepError::Aborted { partial, .. }
            | SweepError::Stopped { partial, .. }
            | SweepError::Sink { partial, .. } => Some(partial),
        }
    }

    /// Index of the point at which the run ended.
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            SweepError::Configuration(_) => None,
            SweepError::Aborted { index, .. } | SweepError::Sink { index, .. } => Some(*index),
            SweepError::Stopped { next_index, .. } => Some(*next_index),
        }
    }
}

/// Application level error.
#[derive(Error, Debug)]
pub enum AppError {
    /// Settings could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Settings loaded but invalid
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Result file failure
    #[error("Output error: {0}")]
    Sink(#[from] SinkError),

    /// Sweep ended early
    #[error(transparent)]
    Sweep(#[from] SweepError),
}

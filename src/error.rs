//! Custom error types for the toolkit.
//!
//! `CalError` consolidates the error sources of the crate: configuration
//! parsing and validation, serial and I/O failures, and operational errors
//! from the calibration state machine. Malformed wire data is deliberately
//! *not* an error — the codec and decoder treat it as control flow and
//! resynchronize, because line noise is an expected condition on the bench.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, CalError>;

/// The primary error type for the crate.
#[derive(Error, Debug)]
pub enum CalError {
    /// Error from the `config` crate while loading configuration files.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Semantic error in configuration values that parsed fine.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the serial port layer.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// General device communication failure.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// The serial port reported end of stream while streaming.
    #[error("Unexpected EOF from serial port")]
    SerialUnexpectedEof,

    /// `start` was called on a session that is already streaming.
    #[error("Session is already streaming")]
    SessionBusy,

    /// A point fixation was attempted with an empty calibration plan.
    #[error("Calibration plan is empty")]
    PlanEmpty,

    /// A point fixation was attempted after every plan slot was fixed.
    #[error("All calibration plan setpoints are already fixed")]
    PlanExhausted,
}

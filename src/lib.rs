//! Calibration and monitoring toolkit for the STMP-960 pressure calibrator.
//!
//! The STMP-960 streams binary measurement frames over a serial link. This
//! crate provides the pieces needed to talk to one:
//!
//! - [`protocol`] — the wire codec (frame extraction with resynchronization)
//!   and the measurement payload decoder.
//! - [`session`] — an async device session that performs the start handshake,
//!   owns the serial port, and delivers decoded measurements over a channel.
//! - [`calibration`] — setpoint planning and the point-fixing state machine
//!   with per-point and overall pass/fail verdicts.
//! - [`monitor`] — a bounded rolling buffer of live samples with running
//!   min/max statistics.
//! - [`sim`] — a simulated calibrator for development and tests, emitting
//!   real wire frames through the same codec path.

pub mod calibration;
pub mod config;
pub mod error;
pub mod monitor;
pub mod protocol;
pub mod session;
pub mod sim;

pub use error::{AppResult, CalError};

//! Simulated calibrator for development and tests.
//!
//! The simulator plays the role of a bench instrument with an ideal 4-20 mA
//! transmitter attached: pressure sweeps slowly over the configured span and
//! the current tracks it exactly. Every sample is encoded into a real wire
//! frame and pushed back through the frame codec and payload decoder, so the
//! whole protocol path is exercised, not just the event plumbing.

use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::protocol::frame::{self, STATION_ADDR};
use crate::protocol::measurement::{
    decode_payload, PressureUnit, SignalUnit, HEADER_CURRENT, MEASUREMENT_PAYLOAD_LEN,
};
use crate::session::SessionEvent;

/// Tuning knobs for the simulated calibrator.
#[derive(Clone, Debug)]
pub struct SimOptions {
    /// Samples per second.
    pub sample_rate_hz: f64,
    /// Lower bound of the swept pressure span.
    pub low: f64,
    /// Upper bound of the swept pressure span.
    pub high: f64,
    /// Event channel capacity.
    pub channel_capacity: usize,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            sample_rate_hz: 5.0,
            low: 0.0,
            high: 10.0,
            channel_capacity: 256,
        }
    }
}

/// Spawns the simulator task and returns its event receiver.
///
/// The task runs until the receiver is dropped.
pub fn spawn(options: SimOptions) -> mpsc::Receiver<SessionEvent> {
    let (tx, rx) = mpsc::channel(options.channel_capacity);
    let rate = sanitize_rate(options.sample_rate_hz);
    info!(
        rate,
        low = options.low,
        high = options.high,
        "simulated calibrator started"
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs_f64(1.0 / rate));
        let mut acc = BytesMut::new();
        let mut phase: f64 = 0.0;
        let span = match options.high - options.low {
            s if s == 0.0 => 1.0,
            s => s,
        };

        loop {
            ticker.tick().await;
            phase += 0.05;

            let pressure = options.low + (phase.sin() * 0.5 + 0.5) * span;
            // Ideal transmitter: 4 mA at the low end, 20 mA at the high end.
            let signal = 4.0 + (pressure - options.low) / span * 16.0;

            let payload = current_loop_payload(pressure as f32, signal as f32);
            acc.extend_from_slice(&frame::encode_frame(STATION_ADDR, &payload));

            while let Some(extracted) = frame::try_extract_frame(&mut acc) {
                if let Some(measurement) = decode_payload(&extracted) {
                    if tx
                        .send(SessionEvent::Measurement(measurement))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    });
    rx
}

/// Clamps the sample rate to a range the interval timer can represent; a
/// non-finite, zero, or negative rate falls back to the default.
fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate.clamp(0.01, 10_000.0)
    } else {
        warn!(rate, "invalid sample rate, using default");
        SimOptions::default().sample_rate_hz
    }
}

fn current_loop_payload(pressure: f32, signal: f32) -> [u8; MEASUREMENT_PAYLOAD_LEN] {
    let mut payload = [0u8; MEASUREMENT_PAYLOAD_LEN];
    payload[0..3].copy_from_slice(&HEADER_CURRENT);
    payload[3..7].copy_from_slice(&pressure.to_be_bytes());
    payload[7] = PressureUnit::Kilopascal.code();
    payload[8..12].copy_from_slice(&signal.to_be_bytes());
    payload[12] = SignalUnit::MilliAmp.code();
    payload
}

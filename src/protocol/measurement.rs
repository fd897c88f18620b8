//! Measurement payload decoding.
//!
//! A measurement payload is exactly 13 bytes: a 3-byte header selecting the
//! instrument mode, a big-endian `f32` pressure with a unit byte, and either
//! a big-endian `f32` electrical signal with a unit byte (analog modes) or a
//! relay contact code. Unknown unit and relay codes are preserved rather than
//! rejected, so newer firmware never silences the stream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a measurement payload in bytes.
pub const MEASUREMENT_PAYLOAD_LEN: usize = 13;

/// Header of a current-to-pressure (I/P) measurement.
pub const HEADER_CURRENT: [u8; 3] = [0x30, 0x15, 0x01];
/// Header of a voltage-to-pressure (V/P) measurement.
pub const HEADER_VOLTAGE: [u8; 3] = [0x30, 0x16, 0x01];
/// Header of a relay-test measurement.
pub const HEADER_RELAY: [u8; 3] = [0x30, 0x17, 0x01];

const RELAY_CLOSED: u8 = 0x03;
const RELAY_OPEN: u8 = 0x04;

/// Operating mode of the calibrator, taken from the payload header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// 4–20 mA current loop against pressure.
    CurrentToPressure,
    /// 0–10 V signal against pressure.
    VoltageToPressure,
    /// Pressure switch contact test.
    Relay,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::CurrentToPressure => write!(f, "I/P"),
            Mode::VoltageToPressure => write!(f, "V/P"),
            Mode::Relay => write!(f, "relay"),
        }
    }
}

/// Pressure unit reported by the instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureUnit {
    /// Millimetres of water column.
    MmWater,
    /// Millimetres of mercury.
    MmMercury,
    /// Millibar.
    Millibar,
    /// Bar.
    Bar,
    /// Pounds per square inch.
    Psi,
    /// Pascal.
    Pascal,
    /// Megapascal.
    Megapascal,
    /// Kilopascal.
    Kilopascal,
    /// Inches of mercury.
    InchMercury,
    /// Inches of water column.
    InchWater,
    /// Kilogram-force per square centimetre.
    KgfPerCm2,
    /// A unit code outside the known table, preserved as received.
    Unrecognized(u8),
}

impl PressureUnit {
    /// Maps a wire unit code to a pressure unit.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => PressureUnit::MmWater,
            0x01 => PressureUnit::MmMercury,
            0x02 => PressureUnit::Millibar,
            0x03 => PressureUnit::Bar,
            0x04 => PressureUnit::Psi,
            0x05 => PressureUnit::Pascal,
            0x06 => PressureUnit::Megapascal,
            0x07 => PressureUnit::Kilopascal,
            0x0A => PressureUnit::InchMercury,
            0x0B => PressureUnit::InchWater,
            0x0C => PressureUnit::KgfPerCm2,
            other => PressureUnit::Unrecognized(other),
        }
    }

    /// The wire code for this unit.
    pub fn code(&self) -> u8 {
        match self {
            PressureUnit::MmWater => 0x00,
            PressureUnit::MmMercury => 0x01,
            PressureUnit::Millibar => 0x02,
            PressureUnit::Bar => 0x03,
            PressureUnit::Psi => 0x04,
            PressureUnit::Pascal => 0x05,
            PressureUnit::Megapascal => 0x06,
            PressureUnit::Kilopascal => 0x07,
            PressureUnit::InchMercury => 0x0A,
            PressureUnit::InchWater => 0x0B,
            PressureUnit::KgfPerCm2 => 0x0C,
            PressureUnit::Unrecognized(code) => *code,
        }
    }
}

impl fmt::Display for PressureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PressureUnit::MmWater => write!(f, "mmH2O"),
            PressureUnit::MmMercury => write!(f, "mmHg"),
            PressureUnit::Millibar => write!(f, "mbar"),
            PressureUnit::Bar => write!(f, "bar"),
            PressureUnit::Psi => write!(f, "psi"),
            PressureUnit::Pascal => write!(f, "Pa"),
            PressureUnit::Megapascal => write!(f, "MPa"),
            PressureUnit::Kilopascal => write!(f, "kPa"),
            PressureUnit::InchMercury => write!(f, "inHg"),
            PressureUnit::InchWater => write!(f, "inH2O"),
            PressureUnit::KgfPerCm2 => write!(f, "kgf/cm2"),
            PressureUnit::Unrecognized(code) => write!(f, "unit 0x{code:02X}"),
        }
    }
}

/// Unit (or relay code) attached to the electrical half of a measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalUnit {
    /// Milliamps (current loop).
    MilliAmp,
    /// Volts.
    Volt,
    /// Relay contact reported closed.
    ContactClosed,
    /// Relay contact reported open.
    ContactOpen,
    /// An analog unit code outside the known table.
    Unrecognized(u8),
    /// A relay code outside the known table.
    UnrecognizedRelay(u8),
}

impl SignalUnit {
    fn from_analog_code(code: u8) -> Self {
        match code {
            0x08 => SignalUnit::MilliAmp,
            0x09 => SignalUnit::Volt,
            other => SignalUnit::Unrecognized(other),
        }
    }

    /// The wire code for this unit.
    pub fn code(&self) -> u8 {
        match self {
            SignalUnit::MilliAmp => 0x08,
            SignalUnit::Volt => 0x09,
            SignalUnit::ContactClosed => RELAY_CLOSED,
            SignalUnit::ContactOpen => RELAY_OPEN,
            SignalUnit::Unrecognized(code) | SignalUnit::UnrecognizedRelay(code) => *code,
        }
    }
}

impl fmt::Display for SignalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalUnit::MilliAmp => write!(f, "mA"),
            SignalUnit::Volt => write!(f, "V"),
            SignalUnit::ContactClosed => write!(f, "contact closed"),
            SignalUnit::ContactOpen => write!(f, "contact open"),
            SignalUnit::Unrecognized(code) => write!(f, "unit 0x{code:02X}"),
            SignalUnit::UnrecognizedRelay(code) => write!(f, "relay 0x{code:02X}"),
        }
    }
}

/// One decoded measurement from the instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Operating mode taken from the payload header.
    pub mode: Mode,
    /// Reference pressure reported by the internal sensor.
    pub pressure: f32,
    /// Unit of `pressure`.
    pub pressure_unit: PressureUnit,
    /// Electrical signal of the device under test. For relay measurements
    /// this is 1.0 (closed), 0.0 (open), or the raw code as a float when the
    /// code is unrecognized.
    pub signal: f32,
    /// Unit of `signal`.
    pub signal_unit: SignalUnit,
    /// Relay contact state; `None` for analog modes and unrecognized codes.
    pub relay_state: Option<bool>,
    /// The raw 13-byte payload, kept for diagnostics.
    pub raw: Vec<u8>,
}

/// Decodes a validated 13-byte payload into a [`Measurement`].
///
/// Returns `None` for unknown headers or a wrong payload length; the caller
/// simply moves on to the next frame.
pub fn decode_payload(payload: &[u8]) -> Option<Measurement> {
    if payload.len() != MEASUREMENT_PAYLOAD_LEN {
        return None;
    }

    let header: [u8; 3] = payload[0..3].try_into().ok()?;
    let mode = match header {
        HEADER_CURRENT => Mode::CurrentToPressure,
        HEADER_VOLTAGE => Mode::VoltageToPressure,
        HEADER_RELAY => Mode::Relay,
        _ => return None,
    };

    let pressure = f32::from_be_bytes(payload[3..7].try_into().ok()?);
    let pressure_unit = PressureUnit::from_code(payload[7]);

    let (signal, signal_unit, relay_state) = match mode {
        Mode::CurrentToPressure | Mode::VoltageToPressure => {
            let signal = f32::from_be_bytes(payload[8..12].try_into().ok()?);
            (signal, SignalUnit::from_analog_code(payload[12]), None)
        }
        Mode::Relay => match payload[12] {
            RELAY_CLOSED => (1.0, SignalUnit::ContactClosed, Some(true)),
            RELAY_OPEN => (0.0, SignalUnit::ContactOpen, Some(false)),
            code => (f32::from(code), SignalUnit::UnrecognizedRelay(code), None),
        },
    };

    Some(Measurement {
        mode,
        pressure,
        pressure_unit,
        signal,
        signal_unit,
        relay_state,
        raw: payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analog_payload(header: [u8; 3], pressure: f32, p_unit: u8, signal: f32, s_unit: u8) -> Vec<u8> {
        let mut payload = header.to_vec();
        payload.extend_from_slice(&pressure.to_be_bytes());
        payload.push(p_unit);
        payload.extend_from_slice(&signal.to_be_bytes());
        payload.push(s_unit);
        payload
    }

    fn relay_payload(pressure: f32, p_unit: u8, code: u8) -> Vec<u8> {
        let mut payload = HEADER_RELAY.to_vec();
        payload.extend_from_slice(&pressure.to_be_bytes());
        payload.push(p_unit);
        payload.extend_from_slice(&[0, 0, 0, 0]);
        payload.push(code);
        payload
    }

    #[test]
    fn decodes_current_loop_measurement() {
        let payload = analog_payload(HEADER_CURRENT, 5.0, 0x07, 12.0, 0x08);
        let m = decode_payload(&payload).unwrap();
        assert_eq!(m.mode, Mode::CurrentToPressure);
        assert_eq!(m.pressure, 5.0);
        assert_eq!(m.pressure_unit, PressureUnit::Kilopascal);
        assert_eq!(m.signal, 12.0);
        assert_eq!(m.signal_unit, SignalUnit::MilliAmp);
        assert_eq!(m.relay_state, None);
        assert_eq!(m.raw, payload);
    }

    #[test]
    fn decodes_voltage_measurement() {
        let payload = analog_payload(HEADER_VOLTAGE, 2.5, 0x03, 2.5, 0x09);
        let m = decode_payload(&payload).unwrap();
        assert_eq!(m.mode, Mode::VoltageToPressure);
        assert_eq!(m.pressure_unit, PressureUnit::Bar);
        assert_eq!(m.signal_unit, SignalUnit::Volt);
    }

    #[test]
    fn decodes_relay_contact_states() {
        let closed = decode_payload(&relay_payload(1.0, 0x07, 0x03)).unwrap();
        assert_eq!(closed.relay_state, Some(true));
        assert_eq!(closed.signal, 1.0);
        assert_eq!(closed.signal_unit, SignalUnit::ContactClosed);

        let open = decode_payload(&relay_payload(1.0, 0x07, 0x04)).unwrap();
        assert_eq!(open.relay_state, Some(false));
        assert_eq!(open.signal, 0.0);
        assert_eq!(open.signal_unit, SignalUnit::ContactOpen);
    }

    #[test]
    fn unrecognized_relay_code_is_preserved() {
        let m = decode_payload(&relay_payload(1.0, 0x07, 0x7F)).unwrap();
        assert_eq!(m.relay_state, None);
        assert_eq!(m.signal, 127.0);
        assert_eq!(m.signal_unit, SignalUnit::UnrecognizedRelay(0x7F));
    }

    #[test]
    fn unrecognized_units_fall_back_to_raw_codes() {
        let payload = analog_payload(HEADER_CURRENT, 5.0, 0x1F, 12.0, 0x2F);
        let m = decode_payload(&payload).unwrap();
        assert_eq!(m.pressure_unit, PressureUnit::Unrecognized(0x1F));
        assert_eq!(m.pressure_unit.code(), 0x1F);
        assert_eq!(m.signal_unit, SignalUnit::Unrecognized(0x2F));
    }

    #[test]
    fn unknown_header_is_rejected() {
        let payload = analog_payload([0x30, 0x18, 0x01], 5.0, 0x07, 12.0, 0x08);
        assert!(decode_payload(&payload).is_none());
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(decode_payload(&[0x30, 0x15, 0x01]).is_none());
        let mut long = analog_payload(HEADER_CURRENT, 5.0, 0x07, 12.0, 0x08);
        long.push(0x00);
        assert!(decode_payload(&long).is_none());
    }

    #[test]
    fn unit_labels_are_stable() {
        assert_eq!(PressureUnit::Kilopascal.to_string(), "kPa");
        assert_eq!(PressureUnit::Unrecognized(0x1F).to_string(), "unit 0x1F");
        assert_eq!(SignalUnit::MilliAmp.to_string(), "mA");
        assert_eq!(SignalUnit::UnrecognizedRelay(0x7F).to_string(), "relay 0x7F");
    }
}

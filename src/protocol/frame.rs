//! Frame transport layer.
//!
//! Frames on the wire look like:
//!
//! ```text
//! 55 55 | addr | len | payload (len bytes) | cs | AA AA
//! ```
//!
//! where `cs` is the XOR of `addr`, `len`, and every payload byte. The stream
//! is noisy in practice (partial reads, garbage between frames, frames cut by
//! a reconnect), so extraction never fails hard: on any mismatch the scanner
//! drops the bad preamble and rescans from the next candidate.

use bytes::{Buf, Bytes, BytesMut};

/// Station address of the calibrator. The instrument answers on a fixed
/// address; frames for any other address are skipped.
pub const STATION_ADDR: u8 = 0x01;

/// Two-byte frame preamble.
pub const PREAMBLE: [u8; 2] = [0x55, 0x55];

/// Two-byte frame trailer.
pub const TRAILER: [u8; 2] = [0xAA, 0xAA];

/// The fixed frame that kicks the instrument into streaming mode.
pub const START_FRAME: [u8; 10] = [0x55, 0x55, 0x01, 0x03, 0x20, 0x23, 0x00, 0x01, 0xAA, 0xAA];

/// Smallest amount of buffered data worth scanning. Measurement frames carry
/// a 13-byte payload, for 20 bytes on the wire.
pub const MIN_FRAME_LEN: usize = 20;

// preamble + addr + len.
const HEADER_LEN: usize = PREAMBLE.len() + 2;
// checksum + trailer.
const FOOTER_LEN: usize = 3;

/// XOR checksum over the address byte, the length byte, and the payload.
pub fn checksum(addr: u8, len: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(addr ^ len, |acc, b| acc ^ b)
}

/// Encodes `payload` into a complete wire frame addressed to `addr`.
///
/// Used by the simulator and by tests; the only frame the toolkit ever sends
/// to real hardware is [`START_FRAME`].
pub fn encode_frame(addr: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= u8::MAX as usize);
    let len = payload.len() as u8;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + FOOTER_LEN);
    frame.extend_from_slice(&PREAMBLE);
    frame.push(addr);
    frame.push(len);
    frame.extend_from_slice(payload);
    frame.push(checksum(addr, len, payload));
    frame.extend_from_slice(&TRAILER);
    frame
}

/// Extracts the next validated payload from `buf`, consuming the frame bytes.
///
/// Returns `None` when the buffer holds no complete valid frame yet; call
/// again after appending more data. Garbage before a frame, frames for other
/// station addresses, and frames with a bad checksum or trailer are consumed
/// (preamble by preamble) without aborting the scan, so a later valid frame
/// is always recovered.
pub fn try_extract_frame(buf: &mut BytesMut) -> Option<Bytes> {
    loop {
        if buf.len() < MIN_FRAME_LEN {
            return None;
        }

        // Align on the next preamble, dropping anything before it.
        match find_preamble(buf) {
            Some(0) => {}
            Some(pos) => {
                buf.advance(pos);
                continue;
            }
            None => {
                // Keep the final byte: it may be the first half of a
                // preamble split across reads.
                let drop = buf.len() - 1;
                buf.advance(drop);
                return None;
            }
        }

        let addr = buf[2];
        let len_byte = buf[3];
        if addr != STATION_ADDR {
            buf.advance(PREAMBLE.len());
            continue;
        }

        let payload_start = HEADER_LEN;
        let payload_end = payload_start + usize::from(len_byte);
        let total = payload_end + FOOTER_LEN;
        if buf.len() < total {
            return None;
        }

        if buf[payload_end + 1..total] != TRAILER {
            buf.advance(PREAMBLE.len());
            continue;
        }
        if buf[payload_end] != checksum(addr, len_byte, &buf[payload_start..payload_end]) {
            buf.advance(PREAMBLE.len());
            continue;
        }

        let frame = buf.split_to(total).freeze();
        return Some(frame.slice(payload_start..payload_end));
    }
}

fn find_preamble(buf: &[u8]) -> Option<usize> {
    buf.windows(PREAMBLE.len()).position(|w| w == PREAMBLE)
}

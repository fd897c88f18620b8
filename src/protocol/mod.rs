//! Wire protocol of the STMP-960.
//!
//! [`frame`] handles the transport layer (preamble, checksum, trailer,
//! resynchronization); [`measurement`] decodes validated payloads into typed
//! measurements. Both layers are pure functions over byte buffers and are
//! shared by the live session and the simulator.

pub mod frame;
pub mod measurement;

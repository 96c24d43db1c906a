//! # Byte Transport
//!
//! The only thing the bus master needs from the hardware: addressed writes
//! and addressed reads. Framing, retries and timeouts live above this.

use crate::error::TransportError;

/// Addressed, half-duplex byte transport.
///
/// ## Contract
/// - `write` with an empty slice is a presence probe: `Ok` means something
///   acknowledged the address.
/// - `read` returns whatever the target has ready, up to `max_len` bytes.
///   An empty vector means "no response yet"; the caller decides how long
///   to keep polling.
pub trait BusTransport: Send {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TransportError>;

    fn read(&mut self, address: u8, max_len: usize) -> Result<Vec<u8>, TransportError>;
}

//! # Wire Protocol
//!
//! Opcodes, ACK bytes and payload codecs. Pure functions over byte slices;
//! nothing here touches the transport.
//!
//! ## Frame Layout
//! ```text
//! Request:   [opcode] [payload ...]
//!
//! UPDATE_DISPLAY payload:
//!   ┌──────┬──────────────────────┬──────────┬──────────┐
//!   │ len  │ name (len bytes ≤20) │ stock lo │ stock hi │
//!   └──────┴──────────────────────┴──────────┴──────────┘
//!
//! WHOAMI response:     "PRD_MOD_01\0"   (≤31 bytes + NUL)
//! GET_STOCK response:  [lo] [hi]
//! ACK response:        [0x55] success  /  [0xEE] error
//! ```

use kiosk_core::validation::truncate_display_name;
use kiosk_core::MAX_UID_LEN;

// =============================================================================
// Commands
// =============================================================================

/// Commands understood by a dispensing module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Whoami,
    GetStock,
    UpdateDisplay,
    Dispense,
}

impl Command {
    pub const fn opcode(self) -> u8 {
        match self {
            Command::Whoami => 0x01,
            Command::GetStock => 0x02,
            Command::UpdateDisplay => 0x03,
            Command::Dispense => 0x10,
        }
    }

    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            0x01 => Some(Command::Whoami),
            0x02 => Some(Command::GetStock),
            0x03 => Some(Command::UpdateDisplay),
            0x10 => Some(Command::Dispense),
            _ => None,
        }
    }

    /// Largest response the master reads for this command.
    pub const fn response_len(self) -> usize {
        match self {
            Command::Whoami => MAX_UID_LEN + 1,
            Command::GetStock => 2,
            Command::UpdateDisplay | Command::Dispense => 1,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Whoami => write!(f, "WHOAMI"),
            Command::GetStock => write!(f, "GET_STOCK"),
            Command::UpdateDisplay => write!(f, "UPDATE_DISPLAY"),
            Command::Dispense => write!(f, "DISPENSE"),
        }
    }
}

// =============================================================================
// Acknowledgements
// =============================================================================

pub const ACK_SUCCESS: u8 = 0x55;
pub const ACK_ERROR: u8 = 0xEE;

/// Single-byte command acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Success,
    Error,
}

impl Ack {
    /// Parses the first response byte. Anything else is line noise.
    pub fn parse(bytes: &[u8]) -> Option<Ack> {
        match bytes.first() {
            Some(&ACK_SUCCESS) => Some(Ack::Success),
            Some(&ACK_ERROR) => Some(Ack::Error),
            _ => None,
        }
    }

    pub const fn byte(self) -> u8 {
        match self {
            Ack::Success => ACK_SUCCESS,
            Ack::Error => ACK_ERROR,
        }
    }
}

// =============================================================================
// Codecs
// =============================================================================

/// Builds a request frame with no payload.
pub fn encode_command(command: Command) -> Vec<u8> {
    vec![command.opcode()]
}

/// Builds an UPDATE_DISPLAY frame.
///
/// The name is cut to 20 bytes on a character boundary; stock above
/// `u16::MAX` is clamped, since the wire field is two bytes.
pub fn encode_update_display(name: &str, stock: u32) -> Vec<u8> {
    let name = truncate_display_name(name).as_bytes();
    let stock = u16::try_from(stock).unwrap_or(u16::MAX);

    let mut frame = Vec::with_capacity(4 + name.len());
    frame.push(Command::UpdateDisplay.opcode());
    frame.push(name.len() as u8);
    frame.extend_from_slice(name);
    frame.extend_from_slice(&stock.to_le_bytes());
    frame
}

/// Parses an UPDATE_DISPLAY payload (frame minus opcode) into name and stock.
pub fn decode_update_display(payload: &[u8]) -> Option<(String, u16)> {
    let (&len, rest) = payload.split_first()?;
    let len = usize::from(len);
    if rest.len() < len + 2 {
        return None;
    }

    let name = String::from_utf8_lossy(&rest[..len]).into_owned();
    let stock = u16::from_le_bytes([rest[len], rest[len + 1]]);
    Some((name, stock))
}

/// Extracts a UID from a WHOAMI response.
///
/// The UID ends at the first NUL or after 31 bytes, whichever comes first.
/// Surrounding whitespace is trimmed; an empty result means no UID.
pub fn decode_uid(bytes: &[u8]) -> Option<String> {
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(bytes.len())
        .min(MAX_UID_LEN);

    let uid = String::from_utf8_lossy(&bytes[..end]).trim().to_string();
    if uid.is_empty() {
        None
    } else {
        Some(uid)
    }
}

/// Encodes a UID the way a module answers WHOAMI.
pub fn encode_uid(uid: &str) -> Vec<u8> {
    let bytes = uid.as_bytes();
    let mut response = bytes[..bytes.len().min(MAX_UID_LEN)].to_vec();
    response.push(0);
    response
}

/// Parses a GET_STOCK response.
pub fn decode_stock(bytes: &[u8]) -> Option<u32> {
    match bytes {
        [lo, hi, ..] => Some(u32::from(u16::from_le_bytes([*lo, *hi]))),
        _ => None,
    }
}

/// Encodes a stock count the way a module answers GET_STOCK.
pub fn encode_stock(stock: u32) -> Vec<u8> {
    u16::try_from(stock).unwrap_or(u16::MAX).to_le_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcodes() {
        assert_eq!(Command::Whoami.opcode(), 0x01);
        assert_eq!(Command::GetStock.opcode(), 0x02);
        assert_eq!(Command::UpdateDisplay.opcode(), 0x03);
        assert_eq!(Command::Dispense.opcode(), 0x10);
        assert_eq!(Command::from_opcode(0x10), Some(Command::Dispense));
        assert_eq!(Command::from_opcode(0x04), None);
    }

    #[test]
    fn test_update_display_frame_layout() {
        let frame = encode_update_display("Soda", 260);
        assert_eq!(frame, vec![0x03, 4, b'S', b'o', b'd', b'a', 0x04, 0x01]);
    }

    #[test]
    fn test_update_display_truncates_and_clamps() {
        let frame = encode_update_display("Sparkling Mineral Water", 70_000);
        assert_eq!(frame[1], 20);
        assert_eq!(frame.len(), 2 + 20 + 2);
        assert_eq!(&frame[22..], &[0xFF, 0xFF]);

        let (name, stock) = decode_update_display(&frame[1..]).unwrap();
        assert_eq!(name, "Sparkling Mineral Wa");
        assert_eq!(stock, u16::MAX);
    }

    #[test]
    fn test_decode_update_display_rejects_short_payload() {
        assert_eq!(decode_update_display(&[5, b'a', b'b']), None);
        assert_eq!(decode_update_display(&[]), None);
    }

    #[test]
    fn test_decode_uid_stops_at_nul() {
        assert_eq!(decode_uid(b"PRD_MOD_01\0garbage"), Some("PRD_MOD_01".to_string()));
        assert_eq!(decode_uid(b"  PRD_MOD_02 "), Some("PRD_MOD_02".to_string()));
        assert_eq!(decode_uid(b"\0"), None);
        assert_eq!(decode_uid(b""), None);
    }

    #[test]
    fn test_decode_uid_caps_length() {
        let long = vec![b'X'; 40];
        assert_eq!(decode_uid(&long).unwrap().len(), MAX_UID_LEN);
    }

    #[test]
    fn test_stock_is_little_endian() {
        assert_eq!(decode_stock(&[0x2C, 0x01]), Some(300));
        assert_eq!(decode_stock(&[0x05]), None);
        assert_eq!(encode_stock(300), vec![0x2C, 0x01]);
    }

    #[test]
    fn test_ack_parse() {
        assert_eq!(Ack::parse(&[0x55]), Some(Ack::Success));
        assert_eq!(Ack::parse(&[0xEE]), Some(Ack::Error));
        assert_eq!(Ack::parse(&[0x00]), None);
        assert_eq!(Ack::parse(&[]), None);
    }
}

//! Delimiters and byte stuffing

use heapless::Vec;

use crate::frame::FrameError;

/// Start of a request (controller → node)
pub const SOH: u8 = 0x01;
/// Start of a reply (node → controller)
pub const STX: u8 = 0x02;
/// End of a reply
pub const ETX: u8 = 0x03;
/// End of a request
pub const EOT: u8 = 0x04;
/// Escape marker; the next byte is XORed with [`ESCAPE_XOR`]
pub const ESC: u8 = 0x1B;

/// Every byte below this value is escaped on the wire
pub const ESCAPE_BELOW: u8 = 0x20;
/// Mask applied to an escaped byte
pub const ESCAPE_XOR: u8 = 0x20;

/// Returns true if `byte` cannot appear unescaped on the wire
#[inline]
pub fn needs_escape(byte: u8) -> bool {
    byte < ESCAPE_BELOW
}

/// Number of wire bytes `input` occupies once escaped
pub fn encoded_len(input: &[u8]) -> usize {
    input
        .iter()
        .map(|&b| if needs_escape(b) { 2 } else { 1 })
        .sum()
}

/// Append the escaped form of `input` to `out`
///
/// Fails with [`FrameError::BufferTooSmall`] if `out` runs out of room; in
/// that case `out` holds a truncated encoding and should be discarded.
pub fn encode_bytes<const N: usize>(input: &[u8], out: &mut Vec<u8, N>) -> Result<(), FrameError> {
    for &byte in input {
        if needs_escape(byte) {
            out.push(ESC).map_err(|_| FrameError::BufferTooSmall)?;
            out.push(byte ^ ESCAPE_XOR)
                .map_err(|_| FrameError::BufferTooSmall)?;
        } else {
            out.push(byte).map_err(|_| FrameError::BufferTooSmall)?;
        }
    }
    Ok(())
}

//! Node-side request receiver
//!
//! Every node sees all traffic on the pair: requests for other nodes and
//! replies from other nodes included. The receiver filters on the address
//! byte and only hands out requests addressed to its own node.
//!
//! ```text
//!                 +-------+
//!                 |       | data (ignored)
//!                 v       |
//!            SkipReply ---+
//!             |    ^
//!         ETX |    | STX
//!             v    |
//!            Idle <--------------+<------------------+
//!             |                  |                   |
//!         SOH |              EOT |   data (store)    |
//!             v                  |   +----+          |
//!          Address --- own ---> Payload <-+          |
//!             |                                  EOT |
//!             +---- other ---> SkipPayload ----------+
//! ```
//!
//! SOH from any state restarts at `Address`; STX from any state skips a
//! reply; any control byte that is not a delimiter returns to `Idle`.

use heapless::Vec;

use crate::wire::{ESC, ESCAPE_BELOW, ESCAPE_XOR, EOT, ETX, SOH, STX};

/// Maximum request payload a node buffers
pub const MAX_REQUEST_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum ReqState {
    Idle,
    Address,
    Payload,
    SkipPayload,
    SkipReply,
}

/// Address-filtering request decoder
#[derive(Debug, Clone)]
pub struct RequestDecoder {
    address: u8,
    state: ReqState,
    escaped: bool,
    buffer: Vec<u8, MAX_REQUEST_SIZE>,
}

impl RequestDecoder {
    /// Create a receiver for the node at `address`
    pub fn new(address: u8) -> Self {
        Self {
            address,
            state: ReqState::Idle,
            escaped: false,
            buffer: Vec::new(),
        }
    }

    /// Address this receiver accepts
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Change the accepted address; takes effect with the next request
    pub fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    /// Feed one byte from the bus
    ///
    /// Returns the request payload when an EOT completes a request for
    /// this node.
    pub fn feed(&mut self, byte: u8) -> Option<Vec<u8, MAX_REQUEST_SIZE>> {
        match byte {
            SOH => {
                self.escaped = false;
                self.state = ReqState::Address;
            }
            EOT => {
                let complete = self.state == ReqState::Payload && !self.escaped;
                self.escaped = false;
                self.state = ReqState::Idle;
                if complete {
                    return Some(core::mem::take(&mut self.buffer));
                }
            }
            STX => {
                self.escaped = false;
                self.state = ReqState::SkipReply;
            }
            ETX => {
                self.escaped = false;
                self.state = ReqState::Idle;
            }
            ESC => self.escaped = true,
            _ if byte < ESCAPE_BELOW => {
                self.escaped = false;
                self.state = ReqState::Idle;
            }
            _ => {
                let c = if self.escaped { byte ^ ESCAPE_XOR } else { byte };
                self.escaped = false;

                match self.state {
                    ReqState::Address => {
                        if c == self.address {
                            self.buffer.clear();
                            self.state = ReqState::Payload;
                        } else {
                            self.state = ReqState::SkipPayload;
                        }
                    }
                    ReqState::Payload => {
                        if self.buffer.push(c).is_err() {
                            self.buffer.clear();
                            self.state = ReqState::Idle;
                        }
                    }
                    ReqState::SkipPayload | ReqState::SkipReply => {}
                    ReqState::Idle => {}
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_reply, encode_request};

    fn requests(decoder: &mut RequestDecoder, bytes: &[u8]) -> std::vec::Vec<std::vec::Vec<u8>> {
        bytes
            .iter()
            .filter_map(|&b| decoder.feed(b))
            .map(|r| r.to_vec())
            .collect()
    }

    #[test]
    fn test_accepts_own_address() {
        let mut rx = RequestDecoder::new(0x40);
        let wire = encode_request(0x40, b"Q").unwrap();
        assert_eq!(requests(&mut rx, &wire), [b"Q".to_vec()]);
    }

    #[test]
    fn test_ignores_other_nodes() {
        let mut rx = RequestDecoder::new(0x40);
        let wire = encode_request(0x41, b"Q").unwrap();
        assert!(requests(&mut rx, &wire).is_empty());
    }

    #[test]
    fn test_escaped_address_and_payload() {
        let mut rx = RequestDecoder::new(0x05);
        let wire = encode_request(0x05, &[b'P', 0x05, 0xFA, 0x1B]).unwrap();
        assert_eq!(requests(&mut rx, &wire), [vec_of(&[b'P', 0x05, 0xFA, 0x1B])]);
    }

    #[test]
    fn test_skips_replies_on_the_wire() {
        let mut rx = RequestDecoder::new(0x40);
        // A reply whose payload looks like an address + EOT must not count
        let mut bytes = std::vec::Vec::new();
        bytes.extend_from_slice(&encode_reply(&[0x40, b'C']).unwrap());
        bytes.extend_from_slice(&encode_request(0x40, b"E").unwrap());
        assert_eq!(requests(&mut rx, &bytes), [b"E".to_vec()]);
    }

    #[test]
    fn test_soh_restarts_request() {
        let mut rx = RequestDecoder::new(0x40);
        let mut bytes = std::vec::Vec::from([SOH, 0x40, b'S', b'x']);
        bytes.extend_from_slice(&encode_request(0x40, b"O").unwrap());
        assert_eq!(requests(&mut rx, &bytes), [b"O".to_vec()]);
    }

    #[test]
    fn test_oversized_request_dropped() {
        let mut rx = RequestDecoder::new(0x40);
        let payload = [b'a'; MAX_REQUEST_SIZE + 1];
        let wire = encode_request(0x40, &payload).unwrap();
        assert!(requests(&mut rx, &wire).is_empty());

        let wire = encode_request(0x40, &payload[..MAX_REQUEST_SIZE]).unwrap();
        assert_eq!(requests(&mut rx, &wire).len(), 1);
    }

    #[test]
    fn test_address_change() {
        let mut rx = RequestDecoder::new(0x40);
        rx.set_address(0x22);
        assert_eq!(rx.address(), 0x22);
        let wire = encode_request(0x22, b"C").unwrap();
        assert_eq!(requests(&mut rx, &wire).len(), 1);
    }

    fn vec_of(bytes: &[u8]) -> std::vec::Vec<u8> {
        bytes.to_vec()
    }
}

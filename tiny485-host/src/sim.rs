//! Simulated bus
//!
//! An in-memory transport with [`Node`]s attached. Whatever the controller
//! writes is fed to every node byte by byte; their replies are queued for
//! the controller to read back. Used by the tests and by `--simulate`.

use std::collections::VecDeque;
use std::io;
use std::thread::sleep;
use std::time::Duration;

use tiny485_hal::BusTransport;
use tiny485_node::{Node, NodeConfig, RamStorage};
use tracing::trace;

/// Default time a read blocks when nothing is queued
pub const DEFAULT_READ_DELAY: Duration = Duration::from_millis(1);

/// In-memory multidrop bus
#[derive(Debug)]
pub struct SimBus {
    nodes: Vec<Node<RamStorage>>,
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    read_delay: Duration,
    corrupt_next_reply: bool,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// Bus with no nodes attached
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            inbound: VecDeque::new(),
            written: Vec::new(),
            read_delay: DEFAULT_READ_DELAY,
            corrupt_next_reply: false,
        }
    }

    /// Attach a node
    pub fn with_node(mut self, node: Node<RamStorage>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Attach a freshly booted node at `address`
    pub fn with_node_at(self, address: u8, loopback: bool) -> Self {
        let node = Node::with_config(NodeConfig::with_address(address), RamStorage::new())
            .with_loopback(loopback);
        self.with_node(node)
    }

    /// Time a read waits when nothing is queued
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Node currently answering at `address`
    pub fn node(&self, address: u8) -> Option<&Node<RamStorage>> {
        self.nodes.iter().find(|n| n.address() == address)
    }

    /// Everything the controller has written so far
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Queue raw bytes as if another device had sent them
    pub fn inject(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    /// Flip one payload bit in the next reply put on the wire
    pub fn corrupt_next_reply(&mut self) {
        self.corrupt_next_reply = true;
    }

    fn queue_reply(&mut self, mut reply: Vec<u8>) {
        if self.corrupt_next_reply && reply.len() > 2 {
            // last byte before ETX is always >= 0x20, flipping 0x40 keeps it so
            let at = reply.len() - 2;
            reply[at] ^= 0x40;
            self.corrupt_next_reply = false;
        }
        trace!("sim reply {}", hex::encode(&reply));
        self.inbound.extend(reply);
    }
}

impl BusTransport for SimBus {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        for node in &mut self.nodes {
            node.tick();
        }

        if self.inbound.is_empty() {
            if !self.read_delay.is_zero() {
                sleep(self.read_delay);
            }
            return Ok(0);
        }

        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), io::Error> {
        self.written.extend_from_slice(data);

        let mut replies = Vec::new();
        for &byte in data {
            for node in &mut self.nodes {
                if let Some(reply) = node.receive(byte) {
                    replies.push(reply.to_vec());
                }
            }
        }
        for reply in replies {
            self.queue_reply(reply);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny485_protocol::wire::{ETX, STX};
    use tiny485_protocol::{encode_request, Command};

    #[test]
    fn test_empty_bus_reads_nothing() {
        let mut sim = SimBus::new().with_read_delay(Duration::ZERO);
        let mut buf = [0u8; 8];
        assert_eq!(sim.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_node_answers_ping() {
        let mut sim = SimBus::new().with_node_at(0x40, false).with_node_at(0x41, false);
        let payload = Command::Ping { node: 0x41 }.to_payload().unwrap();
        sim.write(&encode_request(0x41, &payload).unwrap()).unwrap();

        let mut buf = [0u8; 16];
        let n = sim.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[STX, b'P', 0x41, 0xBE, ETX]);
        assert_eq!(sim.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_reads_are_chunked() {
        let mut sim = SimBus::new();
        sim.inject(&[1, 2, 3, 4, 5]);
        let mut buf = [0u8; 2];
        assert_eq!(sim.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(sim.read(&mut buf).unwrap(), 2);
        assert_eq!(sim.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 5);
    }

    #[test]
    fn test_corrupt_next_reply() {
        let mut sim = SimBus::new().with_node_at(0x40, true);
        sim.corrupt_next_reply();
        sim.write(&encode_request(0x40, &[0x01, b'a']).unwrap()).unwrap();

        let mut buf = [0u8; 16];
        let n = sim.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[STX, 0x1B, 0x21, b'a' ^ 0x40, ETX]);
    }
}

//! Bus interface
//!
//! Composes a transport with the reply decoder. Sending frames a request;
//! receiving is driven entirely by the caller through [`Bus::poll`].

use std::collections::VecDeque;
use std::io;

use tiny485_hal::BusTransport;
use tiny485_protocol::{encode_request, Command, Frame, ReplyDecoder, Violation};
use tracing::{debug, trace, warn};

use crate::error::BusError;

/// Bytes requested from the transport per read
const RX_CHUNK_SIZE: usize = 64;

/// Receiver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    /// Completed frames handed out
    pub frames: u64,
    /// STX inside an open frame
    pub start_while_busy: u64,
    /// ETX outside a payload
    pub end_outside_payload: u64,
    /// ESC outside a payload
    pub escape_outside_payload: u64,
    /// Data bytes between frames
    pub unexpected_bytes: u64,
    /// Frames dropped for exceeding the payload limit
    pub overflows: u64,
}

impl RxStats {
    fn record(&mut self, violation: Violation) {
        match violation {
            Violation::StartWhileBusy => self.start_while_busy += 1,
            Violation::EndOutsidePayload => self.end_outside_payload += 1,
            Violation::EscapeOutsidePayload => self.escape_outside_payload += 1,
            Violation::UnexpectedByte(_) => self.unexpected_bytes += 1,
            Violation::Overflow => self.overflows += 1,
        }
    }

    /// Total protocol violations seen
    pub fn violations(&self) -> u64 {
        self.start_while_busy
            + self.end_outside_payload
            + self.escape_outside_payload
            + self.unexpected_bytes
            + self.overflows
    }
}

/// Controller end of the bus
#[derive(Debug)]
pub struct Bus<T> {
    transport: T,
    decoder: ReplyDecoder,
    /// Received bytes not yet fed to the decoder
    pending: VecDeque<u8>,
    stats: RxStats,
}

impl<T> Bus<T>
where
    T: BusTransport<Error = io::Error>,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            decoder: ReplyDecoder::new(),
            pending: VecDeque::new(),
            stats: RxStats::default(),
        }
    }

    /// Frame and write one request
    pub fn transmit(&mut self, node: u8, payload: &[u8]) -> Result<(), BusError> {
        let wire = encode_request(node, payload)?;
        trace!(node, len = payload.len(), "TX {}", hex::encode(payload));
        self.transport.write(&wire)?;
        self.transport.flush()?;
        Ok(())
    }

    /// Encode and transmit a command
    pub fn send(&mut self, node: u8, command: &Command) -> Result<(), BusError> {
        let payload = command.to_payload()?;
        debug!(node, ?command, "sending");
        self.transmit(node, &payload)
    }

    /// Write bytes without framing
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.transport.write(bytes)?;
        self.transport.flush()?;
        Ok(())
    }

    /// Return the next completed frame, if one is available
    ///
    /// Feeds buffered bytes to the decoder first and reads the transport at
    /// most once. Bytes after a completed frame stay buffered for the next
    /// call. With nothing to read, the decoder is left untouched.
    pub fn poll(&mut self) -> Result<Option<Frame>, BusError> {
        if let Some(frame) = self.drain_pending() {
            return Ok(Some(frame));
        }

        let mut chunk = [0u8; RX_CHUNK_SIZE];
        let n = self.transport.read(&mut chunk)?;
        if n == 0 {
            return Ok(None);
        }
        trace!("RX: {} bytes", n);
        self.pending.extend(&chunk[..n]);

        Ok(self.drain_pending())
    }

    fn drain_pending(&mut self) -> Option<Frame> {
        while let Some(byte) = self.pending.pop_front() {
            let step = self.decoder.feed(byte);
            if let Some(violation) = step.violation {
                self.stats.record(violation);
                match violation {
                    Violation::UnexpectedByte(b) => {
                        debug!("character {:#04x} unexpected", b)
                    }
                    v => warn!(violation = ?v, "{}", v.describe()),
                }
            }
            if let Some(frame) = step.frame {
                self.stats.frames += 1;
                trace!("frame {}", hex::encode(frame.as_bytes()));
                return Some(frame);
            }
        }
        None
    }

    pub fn stats(&self) -> &RxStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

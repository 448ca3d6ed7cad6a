//! Frame encoding and the controller-side receive state machine
//!
//! The receiver is split in two: [`transition`] is a pure function from
//! `(state, byte)` to the next state, a buffer action and an optional
//! protocol violation; [`ReplyDecoder`] owns the buffer and applies the
//! action. Malformed input never produces an error, only a [`Violation`]
//! and a resynchronized receiver.

use core::ops::Deref;

use heapless::Vec;

use crate::wire::{encode_bytes, ESC, EOT, ESCAPE_XOR, ETX, SOH, STX};

/// Maximum payload the controller accepts in one reply frame
pub const MAX_PAYLOAD_SIZE: usize = 64;

/// Worst-case wire size of a request (SOH + escaped address + escaped payload + EOT)
pub const MAX_REQUEST_WIRE_SIZE: usize = 2 + 2 * (1 + MAX_PAYLOAD_SIZE);

/// Worst-case wire size of a reply (STX + escaped payload + ETX)
pub const MAX_REPLY_WIRE_SIZE: usize = 2 + 2 * MAX_PAYLOAD_SIZE;

/// Errors that can occur while building frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds maximum allowed size
    PayloadTooLarge,
    /// Buffer too small for encoding
    BufferTooSmall,
}

/// One complete, unescaped payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl Frame {
    /// Create a frame holding a copy of `payload`
    pub fn new(payload: &[u8]) -> Result<Self, FrameError> {
        let payload = Vec::from_slice(payload).map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(Self { payload })
    }

    /// Payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.payload
    }
}

impl PartialEq<[u8]> for Frame {
    fn eq(&self, other: &[u8]) -> bool {
        self.payload[..] == *other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for Frame {
    fn eq(&self, other: &[u8; N]) -> bool {
        self.payload[..] == other[..]
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Frame {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Frame({=[u8]:x})", &self.payload[..])
    }
}

/// Build the wire form of a request addressed to `address`
pub fn encode_request(
    address: u8,
    payload: &[u8],
) -> Result<Vec<u8, MAX_REQUEST_WIRE_SIZE>, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge);
    }

    let mut out = Vec::new();
    out.push(SOH).map_err(|_| FrameError::BufferTooSmall)?;
    encode_bytes(&[address], &mut out)?;
    encode_bytes(payload, &mut out)?;
    out.push(EOT).map_err(|_| FrameError::BufferTooSmall)?;
    Ok(out)
}

/// Build the wire form of a reply
pub fn encode_reply(payload: &[u8]) -> Result<Vec<u8, MAX_REPLY_WIRE_SIZE>, FrameError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge);
    }

    let mut out = Vec::new();
    out.push(STX).map_err(|_| FrameError::BufferTooSmall)?;
    encode_bytes(payload, &mut out)?;
    out.push(ETX).map_err(|_| FrameError::BufferTooSmall)?;
    Ok(out)
}

/// Receiver states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// Between frames, waiting for STX
    #[default]
    Idle,
    /// Collecting payload bytes
    InPayload,
    /// ESC seen, next byte is unescaped
    Escaped,
}

/// Protocol violations observed by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Violation {
    /// STX while a frame was still open; the partial frame is dropped
    StartWhileBusy,
    /// ETX outside a payload
    EndOutsidePayload,
    /// ESC outside a payload
    EscapeOutsidePayload,
    /// Data byte between frames
    UnexpectedByte(u8),
    /// Frame longer than [`MAX_PAYLOAD_SIZE`]; the partial frame is dropped
    Overflow,
}

impl Violation {
    /// Short human-readable description
    pub fn describe(&self) -> &'static str {
        match self {
            Violation::StartWhileBusy => "STX received while not idle",
            Violation::EndOutsidePayload => "ETX received while not waiting for payload",
            Violation::EscapeOutsidePayload => "ESC received while not waiting for payload",
            Violation::UnexpectedByte(_) => "unexpected character between frames",
            Violation::Overflow => "frame exceeds maximum payload size",
        }
    }
}

/// What the decoder does with its buffer on a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxAction {
    /// Leave the buffer alone
    None,
    /// Start a new frame
    Clear,
    /// Append a payload byte
    Push(u8),
    /// Hand the buffer out as a completed frame
    Emit,
}

/// Result of the pure transition function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    pub next: RxState,
    pub action: RxAction,
    pub violation: Option<Violation>,
}

impl Transition {
    const fn ok(next: RxState, action: RxAction) -> Self {
        Self {
            next,
            action,
            violation: None,
        }
    }

    const fn violated(next: RxState, action: RxAction, violation: Violation) -> Self {
        Self {
            next,
            action,
            violation: Some(violation),
        }
    }
}

/// Receive transition function
///
/// ```text
///            STX                  data
///   Idle ──────────► InPayload ◄────────┐
///    ▲                 │   │  ▲         │
///    │       ETX(emit) │   │  │ data    │
///    └─────────────────┘   │  │ (^0x20) │
///                      ESC │  │         │
///                          ▼  │         │
///                        Escaped ───────┘
/// ```
///
/// Off-diagram bytes still transition: STX always restarts a frame, ETX
/// always emits, ESC always escapes the next byte.
pub fn transition(state: RxState, byte: u8) -> Transition {
    use RxState::*;

    match byte {
        STX => {
            if state == Idle {
                Transition::ok(InPayload, RxAction::Clear)
            } else {
                Transition::violated(InPayload, RxAction::Clear, Violation::StartWhileBusy)
            }
        }
        ETX => {
            if state == InPayload {
                Transition::ok(Idle, RxAction::Emit)
            } else {
                Transition::violated(Idle, RxAction::Emit, Violation::EndOutsidePayload)
            }
        }
        ESC => {
            if state == InPayload {
                Transition::ok(Escaped, RxAction::None)
            } else {
                Transition::violated(Escaped, RxAction::None, Violation::EscapeOutsidePayload)
            }
        }
        _ => match state {
            Escaped => Transition::ok(InPayload, RxAction::Push(byte ^ ESCAPE_XOR)),
            InPayload => Transition::ok(InPayload, RxAction::Push(byte)),
            Idle => Transition::violated(Idle, RxAction::None, Violation::UnexpectedByte(byte)),
        },
    }
}

/// Outcome of feeding one byte
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    /// Completed frame, if this byte closed one
    pub frame: Option<Frame>,
    /// Violation observed on this byte
    pub violation: Option<Violation>,
}

/// Streaming reply decoder
#[derive(Debug, Clone, Default)]
pub struct ReplyDecoder {
    state: RxState,
    buffer: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl ReplyDecoder {
    /// Create a decoder waiting for the first STX
    pub fn new() -> Self {
        Self::default()
    }

    /// Current receiver state
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Bytes collected for the frame in progress
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop any partial frame and wait for the next STX
    pub fn reset(&mut self) {
        self.state = RxState::Idle;
        self.buffer.clear();
    }

    /// Feed a single byte
    pub fn feed(&mut self, byte: u8) -> Step {
        let t = transition(self.state, byte);
        self.state = t.next;

        let mut step = Step {
            frame: None,
            violation: t.violation,
        };

        match t.action {
            RxAction::None => {}
            RxAction::Clear => self.buffer.clear(),
            RxAction::Push(b) => {
                if self.buffer.push(b).is_err() {
                    self.reset();
                    step.violation = Some(Violation::Overflow);
                }
            }
            RxAction::Emit => {
                step.frame = Some(Frame {
                    payload: core::mem::take(&mut self.buffer),
                });
            }
        }

        step
    }
}

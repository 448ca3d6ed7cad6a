//! tiny485 Bus Protocol
//!
//! This crate defines the link layer and the command set spoken between a
//! controller and the servo/stepper nodes sharing one RS-485 pair.
//!
//! # Wire Format
//!
//! Requests travel from the controller to one addressed node:
//! ```text
//! ┌─────┬──────┬─────────────────────┬─────┐
//! │ SOH │ ADDR │ OPCODE + FIELDS     │ EOT │
//! │ 01  │ 1-2B │ escaped payload     │ 04  │
//! └─────┴──────┴─────────────────────┴─────┘
//! ```
//!
//! Replies travel back from the node:
//! ```text
//! ┌─────┬─────────────────────┬─────┐
//! │ STX │ escaped payload     │ ETX │
//! │ 02  │                     │ 03  │
//! └─────┴─────────────────────┴─────┘
//! ```
//!
//! Every byte below 0x20 inside the address or payload is sent as
//! `ESC (0x1B)` followed by `byte ^ 0x20`, so delimiters never appear in
//! data. Multi-byte fields are little-endian.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod frame;
pub mod messages;
pub mod request;
pub mod wire;

pub use frame::{
    encode_reply, encode_request, transition, Frame, FrameError, ReplyDecoder, RxAction, RxState,
    Step, Transition, Violation, MAX_PAYLOAD_SIZE,
};
pub use messages::{
    opcode, validate_ping_reply, Command, CommandError, Reply, ReplyError, ReplyKind,
    ServoReport, ServoSettings, StepperReport,
};
pub use request::{RequestDecoder, MAX_REQUEST_SIZE};
pub use wire::encode_bytes;

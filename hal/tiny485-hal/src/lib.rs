//! tiny485 Hardware Abstraction Layer
//!
//! Traits shared by the controller and the node model. The controller
//! talks to the bus through a [`BusTransport`]; a node persists its
//! configuration image through a [`ConfigStorage`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  tiny485-host (controller, simulator)    │
//! └──────────────────────────────────────────┘
//!            │                      │
//!            ▼                      ▼
//! ┌──────────────────┐   ┌──────────────────┐
//! │  BusTransport    │   │  ConfigStorage   │
//! │  (serial, sim)   │   │  (eeprom, ram)   │
//! └──────────────────┘   └──────────────────┘
//! ```

#![no_std]
#![deny(unsafe_code)]

pub mod storage;
pub mod uart;

pub use storage::{ConfigStorage, StorageError};
pub use uart::{BusTransport, DataBits, LineConfig, Parity, StopBits};

//! Controller side of the tiny485 bus
//!
//! This crate drives a multidrop RS-485 pair from a host computer:
//!
//! - [`bus::Bus`] frames requests and decodes replies over any
//!   [`tiny485_hal::BusTransport`]
//! - [`client`] issues typed commands and waits for their replies
//! - [`scan`] sweeps the address space for live nodes
//! - [`torture`] stresses the link with random traffic and noise
//! - [`serial`] and [`sim`] provide a real and a simulated transport
//!
//! Everything runs in one thread by cooperative polling. Each wait is
//! bounded by a [`deadline::Deadline`].

pub mod bus;
pub mod client;
pub mod config;
pub mod deadline;
pub mod error;
pub mod scan;
pub mod serial;
pub mod sim;
pub mod torture;

pub use bus::{Bus, RxStats};
pub use client::{request, NodeClient};
pub use config::HostConfig;
pub use deadline::Deadline;
pub use error::{BusError, ClientError, ConfigError};
pub use scan::{scan, ScanConfig};
pub use serial::SerialTransport;
pub use sim::SimBus;
pub use torture::{Harness, HarnessConfig, LinkStats};

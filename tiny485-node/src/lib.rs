//! Board-agnostic node logic
//!
//! Everything a servo/stepper node does that does not depend on the AVR
//! it runs on:
//!
//! - Persistent configuration (address, servo outputs, stepper limits)
//! - Stepper motion with acceleration ramp
//! - Request dispatch and reply framing
//!
//! The controller's simulated bus runs these nodes as its test fixture.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod node;
pub mod stepper;
pub mod storage;

pub use config::{ConfigError, NodeConfig, ServoConfig, StepperConfig, DEFAULT_NODE_ADDRESS};
pub use node::Node;
pub use stepper::{Stepper, StepperState};
pub use storage::RamStorage;

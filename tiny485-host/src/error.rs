//! Error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tiny485_protocol::{CommandError, FrameError};

/// Errors from the bus interface
#[derive(Debug, Error)]
pub enum BusError {
    #[error("transport I/O failed: {0}")]
    Transport(#[from] io::Error),

    #[error("cannot frame request: {0:?}")]
    Frame(FrameError),
}

impl From<FrameError> for BusError {
    fn from(e: FrameError) -> Self {
        BusError::Frame(e)
    }
}

/// Errors from a command round trip
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("node {node:#04x} did not answer '{}' within {timeout_ms} ms", opcode_char(.opcode))]
    Timeout {
        node: u8,
        opcode: u8,
        timeout_ms: u128,
    },

    #[error("invalid command: {0:?}")]
    InvalidCommand(CommandError),

    #[error("node {node:#04x} sent a reply of the wrong kind")]
    UnexpectedReply { node: u8 },
}

fn opcode_char(opcode: &u8) -> char {
    char::from(*opcode)
}

impl From<CommandError> for ClientError {
    fn from(e: CommandError) -> Self {
        ClientError::InvalidCommand(e)
    }
}

impl ClientError {
    /// Returns true if the node simply did not answer in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}

/// Errors loading the host configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

//! Node discovery
//!
//! Pings every address in a range, one at a time, and collects the nodes
//! that answer with a valid echo.

use std::io;
use std::ops::RangeInclusive;
use std::time::Duration;

use tiny485_hal::BusTransport;
use tiny485_protocol::Command;
use tracing::{debug, info};

use crate::bus::Bus;
use crate::client::request;
use crate::error::ClientError;

/// Per-address answer window
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_millis(20);

/// Scan parameters
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Addresses to query, in order
    pub range: RangeInclusive<u8>,
    /// How long each address gets to answer
    pub timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            range: 0..=254,
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

/// Sweep `config.range` and return the responding addresses in order
///
/// A valid answer moves on to the next address immediately; silence moves
/// on once the window expires. Invalid answers are logged and ignored.
pub fn scan<T>(bus: &mut Bus<T>, config: &ScanConfig) -> Result<Vec<u8>, ClientError>
where
    T: BusTransport<Error = io::Error>,
{
    let mut found = Vec::new();

    for node in config.range.clone() {
        debug!("querying node {:03}", node);
        match request(bus, node, &Command::Ping { node }, config.timeout) {
            Ok(_) => {
                info!("good reply received from node {}", node);
                found.push(node);
            }
            Err(e) if e.is_timeout() => {}
            Err(e) => return Err(e),
        }
    }

    Ok(found)
}

//! Host configuration
//!
//! Loaded from an optional TOML file. Every field has a default, so an
//! empty file (or no file) yields a working setup for a single node at
//! 0x40 on `/dev/ttyUSB0`. Command-line flags override the file.
//!
//! ```toml
//! node = 0x40
//!
//! [serial]
//! device = "/dev/ttyUSB0"
//! baud = 57600
//!
//! [scan]
//! first = 0
//! last = 254
//! timeout_ms = 20
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tiny485_hal::LineConfig;
use tiny485_node::DEFAULT_NODE_ADDRESS;

use crate::error::ConfigError;
use crate::scan::ScanConfig;
use crate::torture::HarnessConfig;

/// Complete host configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Default target node
    pub node: u8,
    /// Answer window for single commands
    pub command_timeout_ms: u64,
    pub serial: SerialSection,
    pub scan: ScanSection,
    pub torture: TortureSection,
    pub simulate: SimulateSection,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            node: DEFAULT_NODE_ADDRESS,
            command_timeout_ms: 500,
            serial: SerialSection::default(),
            scan: ScanSection::default(),
            torture: TortureSection::default(),
            simulate: SimulateSection::default(),
        }
    }
}

/// Serial device settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialSection {
    pub device: String,
    pub baud: u32,
    pub read_timeout_ms: u64,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".into(),
            baud: 57_600,
            read_timeout_ms: 50,
        }
    }
}

/// Scan settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSection {
    pub first: u8,
    pub last: u8,
    pub timeout_ms: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            first: 0,
            last: 254,
            timeout_ms: 20,
        }
    }
}

/// Torture test settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TortureSection {
    pub tx_interval_ms: u64,
    pub report_interval_ms: u64,
    pub first_node: u8,
    pub last_node: u8,
    pub self_node: u8,
    /// Noise probability is 1 in this many ticks; 0 disables noise
    pub noise_one_in: u32,
    pub max_noise_len: usize,
    pub max_payload_len: usize,
}

impl Default for TortureSection {
    fn default() -> Self {
        Self {
            tx_interval_ms: 100,
            report_interval_ms: 5_000,
            first_node: 0x40,
            last_node: 0x42,
            self_node: 0x40,
            noise_one_in: 11,
            max_noise_len: 15,
            max_payload_len: 15,
        }
    }
}

/// Nodes attached to the in-memory bus used by `--simulate`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulateSection {
    pub nodes: Vec<u8>,
    /// Nodes echo unknown payloads (torture test fixture)
    pub loopback: bool,
}

impl Default for SimulateSection {
    fn default() -> Self {
        Self {
            nodes: vec![DEFAULT_NODE_ADDRESS],
            loopback: true,
        }
    }
}

impl HostConfig {
    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: HostConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud == 0 {
            return Err(ConfigError::Invalid("serial.baud must be non-zero".into()));
        }
        if self.scan.first > self.scan.last {
            return Err(ConfigError::Invalid(format!(
                "scan range {}..={} is empty",
                self.scan.first, self.scan.last
            )));
        }
        if self.scan.timeout_ms == 0 {
            return Err(ConfigError::Invalid("scan.timeout_ms must be non-zero".into()));
        }
        let t = &self.torture;
        if t.first_node > t.last_node {
            return Err(ConfigError::Invalid(format!(
                "torture node range {}..={} is empty",
                t.first_node, t.last_node
            )));
        }
        if !(t.first_node..=t.last_node).contains(&t.self_node) {
            return Err(ConfigError::Invalid(format!(
                "torture.self_node {} is outside {}..={}",
                t.self_node, t.first_node, t.last_node
            )));
        }
        if t.tx_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "torture.tx_interval_ms must be non-zero".into(),
            ));
        }
        if t.report_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "torture.report_interval_ms must be non-zero".into(),
            ));
        }
        if t.max_payload_len >= tiny485_protocol::MAX_REQUEST_SIZE {
            return Err(ConfigError::Invalid(format!(
                "torture.max_payload_len must be below {}",
                tiny485_protocol::MAX_REQUEST_SIZE
            )));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn line_config(&self) -> LineConfig {
        LineConfig {
            read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
            ..LineConfig::with_baudrate(self.serial.baud)
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            range: self.scan.first..=self.scan.last,
            timeout: Duration::from_millis(self.scan.timeout_ms),
        }
    }

    pub fn harness_config(&self) -> HarnessConfig {
        let t = &self.torture;
        HarnessConfig {
            tx_interval: Duration::from_millis(t.tx_interval_ms),
            report_interval: Duration::from_millis(t.report_interval_ms),
            nodes: t.first_node..=t.last_node,
            self_node: t.self_node,
            noise_one_in: t.noise_one_in,
            max_noise_len: t.max_noise_len,
            max_payload_len: t.max_payload_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = HostConfig::from_toml_str("").unwrap();
        assert_eq!(config.node, 0x40);
        assert_eq!(config.serial.device, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud, 57_600);
        assert_eq!(config.scan_config().range, 0..=254);
        assert_eq!(config.scan_config().timeout, Duration::from_millis(20));
        assert_eq!(config.command_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_file() {
        let config = HostConfig::from_toml_str(
            r#"
            node = 7

            [serial]
            device = "/dev/ttyS1"
            baud = 9600

            [torture]
            noise_one_in = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.node, 7);
        assert_eq!(config.serial.device, "/dev/ttyS1");
        assert_eq!(config.serial.read_timeout_ms, 50);
        assert_eq!(config.line_config().baudrate, 9600);
        assert_eq!(config.harness_config().noise_one_in, 0);
        assert_eq!(config.harness_config().nodes, 0x40..=0x42);
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(matches!(
            HostConfig::from_toml_str("bogus = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_empty_ranges() {
        let err = HostConfig::from_toml_str("[scan]\nfirst = 10\nlast = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = HostConfig::from_toml_str("[torture]\nfirst_node = 5\nlast_node = 4\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_self_node_outside_range() {
        let err = HostConfig::from_toml_str("[torture]\nself_node = 0x50\nnoise_one_in = 0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = HostConfig::from_toml_str(
            "[torture]\nfirst_node = 0x10\nlast_node = 0x12\nself_node = 0x12\n",
        )
        .unwrap();
        let harness = config.harness_config();
        assert!(harness.nodes.contains(&harness.self_node));
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let err = HostConfig::from_toml_str("[torture]\nreport_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = HostConfig::from_toml_str("[scan]\ntimeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_oversized_torture_payload() {
        let err = HostConfig::from_toml_str("[torture]\nmax_payload_len = 16\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = HostConfig::load(Path::new("/nonexistent/tiny485.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

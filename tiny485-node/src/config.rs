//! Node configuration
//!
//! The configuration is kept in RAM and written to non-volatile storage
//! only on an explicit save. The stored image is a version byte followed
//! by the postcard encoding of [`NodeConfig`].

use heapless::Vec;
use serde::{Deserialize, Serialize};
use tiny485_hal::{ConfigStorage, StorageError};

/// Address of a node that has never been configured
pub const DEFAULT_NODE_ADDRESS: u8 = 0x40;

/// Stored image layout version
pub const CONFIG_VERSION: u8 = 1;

/// Maximum stored image size
pub const MAX_IMAGE_SIZE: usize = 32;

/// Configuration persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Storage operation failed
    Storage(StorageError),
    /// Serialization failed
    Serialize,
    /// Deserialization failed
    Deserialize,
    /// Image written by an incompatible layout
    VersionMismatch,
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        ConfigError::Storage(e)
    }
}

/// Servo output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoConfig {
    /// Output 1 pulse width (µs)
    pub pwm1: u16,
    /// Output 2 pulse width (µs)
    pub pwm2: u16,
    /// PWM period minus one (µs)
    pub period_minus_one: u16,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            pwm1: 1500,
            pwm2: 1500,
            period_minus_one: 19_999,
        }
    }
}

/// Stepper travel limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepperConfig {
    /// Position the stepper settles at after zeroing
    pub minpos: u16,
    /// Highest reachable position
    pub maxpos: u16,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            minpos: 0,
            maxpos: 2000,
        }
    }
}

impl StepperConfig {
    /// Clamp a requested position into the travel limits
    pub fn clamp(&self, position: u16) -> u16 {
        position.min(self.maxpos).max(self.minpos)
    }
}

/// Complete node configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeConfig {
    /// Bus address
    pub node_addr: u8,
    pub servo: ServoConfig,
    pub stepper: StepperConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_addr: DEFAULT_NODE_ADDRESS,
            servo: ServoConfig::default(),
            stepper: StepperConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Default configuration answering at `node_addr`
    pub fn with_address(node_addr: u8) -> Self {
        Self {
            node_addr,
            ..Self::default()
        }
    }

    /// Serialize into a storage image
    pub fn to_image(&self) -> Result<Vec<u8, MAX_IMAGE_SIZE>, ConfigError> {
        let mut buf = [0u8; MAX_IMAGE_SIZE];
        buf[0] = CONFIG_VERSION;
        let used = postcard::to_slice(self, &mut buf[1..])
            .map_err(|_| ConfigError::Serialize)?
            .len();
        Vec::from_slice(&buf[..1 + used]).map_err(|_| ConfigError::Serialize)
    }

    /// Deserialize a storage image
    pub fn from_image(image: &[u8]) -> Result<Self, ConfigError> {
        let (&version, body) = image.split_first().ok_or(ConfigError::Deserialize)?;
        if version != CONFIG_VERSION {
            return Err(ConfigError::VersionMismatch);
        }
        postcard::from_bytes(body).map_err(|_| ConfigError::Deserialize)
    }

    /// Load the stored configuration
    pub fn load<S: ConfigStorage>(storage: &mut S) -> Result<Self, ConfigError> {
        let mut buf = [0u8; MAX_IMAGE_SIZE];
        let len = storage.load(&mut buf)?;
        Self::from_image(&buf[..len])
    }

    /// Load the stored configuration, falling back to defaults
    pub fn load_or_default<S: ConfigStorage>(storage: &mut S) -> Self {
        Self::load(storage).unwrap_or_default()
    }

    /// Write this configuration to storage
    pub fn save<S: ConfigStorage>(&self, storage: &mut S) -> Result<(), ConfigError> {
        let image = self.to_image()?;
        storage.store(&image)?;
        Ok(())
    }
}

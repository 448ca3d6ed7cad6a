//! In-memory configuration storage

use heapless::Vec;
use tiny485_hal::{ConfigStorage, StorageError};

use crate::config::MAX_IMAGE_SIZE;

/// RAM-backed stand-in for the node's EEPROM block
#[derive(Debug, Clone, Default)]
pub struct RamStorage {
    image: Option<Vec<u8, MAX_IMAGE_SIZE>>,
    writes: u32,
}

impl RamStorage {
    /// Empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Stored image, if any
    pub fn image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }
}

impl ConfigStorage for RamStorage {
    fn load(&mut self, buffer: &mut [u8]) -> Result<usize, StorageError> {
        let image = self.image.as_ref().ok_or(StorageError::NotFound)?;
        let dst = buffer
            .get_mut(..image.len())
            .ok_or(StorageError::BufferTooSmall)?;
        dst.copy_from_slice(image);
        Ok(image.len())
    }

    fn store(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.image = Some(Vec::from_slice(data).map_err(|_| StorageError::Full)?);
        self.writes += 1;
        Ok(())
    }
}

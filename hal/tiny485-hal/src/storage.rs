//! Persistent configuration storage
//!
//! A node keeps exactly one configuration image (EEPROM block on the real
//! hardware). The image format is owned by the caller.

/// Errors from storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// No image has been stored yet
    NotFound,
    /// Buffer too small for the stored image
    BufferTooSmall,
    /// Image does not fit the storage area
    Full,
}

/// Single-slot storage for a configuration image
pub trait ConfigStorage {
    /// Read the stored image into `buffer`
    ///
    /// Returns the number of bytes read.
    fn load(&mut self, buffer: &mut [u8]) -> Result<usize, StorageError>;

    /// Replace the stored image with `data`
    fn store(&mut self, data: &[u8]) -> Result<(), StorageError>;
}

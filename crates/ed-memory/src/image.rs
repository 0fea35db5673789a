//! Byte images backing main memory and scratchpad

use crate::constants::QUADWORD_SIZE;
use ed_core::error::MemoryError;
use parking_lot::RwLock;
use std::sync::Arc;

/// A flat, shareable byte image
///
/// Quadwords are stored little-endian: word 0 of a quadword is the low
/// 32 bits of the `u128`.
pub struct MemoryImage {
    /// Image name, used in diagnostics
    name: &'static str,
    /// Backing bytes
    data: RwLock<Box<[u8]>>,
}

impl MemoryImage {
    /// Create a zero-filled image.
    ///
    /// The size must be a non-zero multiple of a quadword.
    pub fn new(name: &'static str, size: usize) -> Result<Arc<Self>, MemoryError> {
        if size == 0 || size % QUADWORD_SIZE as usize != 0 {
            return Err(MemoryError::InvalidSize(size));
        }

        Ok(Arc::new(Self {
            name,
            data: RwLock::new(vec![0u8; size].into_boxed_slice()),
        }))
    }

    /// Image name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the image has no bytes (never true for a constructed image)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the quadword at `offset`, which must be in range and aligned
    #[inline]
    pub fn read128(&self, offset: usize) -> u128 {
        let data = self.data.read();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&data[offset..offset + 16]);
        u128::from_le_bytes(bytes)
    }

    /// Write the quadword at `offset`, which must be in range and aligned
    #[inline]
    pub fn write128(&self, offset: usize, value: u128) {
        let mut data = self.data.write();
        data[offset..offset + 16].copy_from_slice(&value.to_le_bytes());
    }

    /// Copy bytes out of the image
    pub fn read_bytes(&self, offset: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let data = self.data.read();
        let range = Self::checked_range(offset, buf.len(), data.len())?;
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    /// Copy bytes into the image
    pub fn write_bytes(&self, offset: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        let mut data = self.data.write();
        let range = Self::checked_range(offset, bytes.len(), data.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Read a full quadword with bounds checking
    pub fn load_quadword(&self, offset: u32) -> Result<u128, MemoryError> {
        let mut bytes = [0u8; 16];
        self.read_bytes(offset, &mut bytes)?;
        Ok(u128::from_le_bytes(bytes))
    }

    /// Write a full quadword with bounds checking
    pub fn store_quadword(&self, offset: u32, value: u128) -> Result<(), MemoryError> {
        self.write_bytes(offset, &value.to_le_bytes())
    }

    /// Zero the whole image
    pub fn clear(&self) {
        self.data.write().fill(0);
    }

    fn checked_range(
        offset: u32,
        len: usize,
        size: usize,
    ) -> Result<std::ops::Range<usize>, MemoryError> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= size => Ok(start..end),
            _ => Err(MemoryError::OutOfRange { offset, len, size }),
        }
    }
}

impl std::fmt::Debug for MemoryImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImage")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_creation() {
        let image = MemoryImage::new("test", 256).unwrap();
        assert_eq!(image.len(), 256);
        assert_eq!(image.name(), "test");
        assert_eq!(image.read128(0), 0);
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(MemoryImage::new("zero", 0), Err(MemoryError::InvalidSize(0))));
        assert!(matches!(MemoryImage::new("odd", 24), Err(MemoryError::InvalidSize(24))));
    }

    #[test]
    fn test_quadword_little_endian() {
        let image = MemoryImage::new("test", 64).unwrap();
        image.write128(16, 0x0011_2233_4455_6677_8899_AABB_CCDD_EEFF);

        let mut bytes = [0u8; 4];
        image.read_bytes(16, &mut bytes).unwrap();
        assert_eq!(bytes, [0xFF, 0xEE, 0xDD, 0xCC]);
        assert_eq!(image.load_quadword(16).unwrap(), 0x0011_2233_4455_6677_8899_AABB_CCDD_EEFF);
    }

    #[test]
    fn test_out_of_range_helpers() {
        let image = MemoryImage::new("test", 32).unwrap();
        assert!(image.store_quadword(16, 1).is_ok());
        assert!(matches!(
            image.store_quadword(32, 1),
            Err(MemoryError::OutOfRange { offset: 32, len: 16, size: 32 })
        ));
        assert!(image.load_quadword(u32::MAX).is_err());
    }

    #[test]
    fn test_clear() {
        let image = MemoryImage::new("test", 32).unwrap();
        image.write128(0, u128::MAX);
        image.clear();
        assert_eq!(image.read128(0), 0);
    }
}

//! Error types for the eedmac emulator
//!
//! Hardware anomalies (bad tags, unbacked addresses, FIFO starvation) are
//! modelled as controller states and never surface here. These errors only
//! come from host-facing surfaces: configuration, state restore and the
//! byte-level helpers on memory images.

use thiserror::Error;

/// Main error type for the emulator
#[derive(Error, Debug)]
pub enum DmacError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// Memory image errors
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Access out of range: offset 0x{offset:08x}, length {len} (image size 0x{size:x})")]
    OutOfRange { offset: u32, len: usize, size: usize },

    #[error("Invalid image size: {0} bytes")]
    InvalidSize(usize),
}

/// Save-state restore errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Expected {expected} channels, found {found}")]
    ChannelCount { expected: usize, found: usize },

    #[error("Invalid channel index: {0}")]
    InvalidChannel(usize),
}

/// Result type alias for emulator operations
pub type Result<T> = std::result::Result<T, DmacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MemoryError::OutOfRange {
            offset: 0x4000,
            len: 16,
            size: 0x4000,
        };
        assert_eq!(
            format!("{}", err),
            "Access out of range: offset 0x00004000, length 16 (image size 0x4000)"
        );

        let err = StateError::ChannelCount {
            expected: 15,
            found: 3,
        };
        assert_eq!(format!("{}", err), "Expected 15 channels, found 3");
    }

    #[test]
    fn test_error_conversion() {
        let state_err = StateError::InvalidChannel(20);
        let err: DmacError = state_err.into();
        assert!(matches!(err, DmacError::State(StateError::InvalidChannel(20))));

        let mem_err = MemoryError::InvalidSize(0);
        let err: DmacError = mem_err.into();
        assert!(matches!(err, DmacError::Memory(_)));
    }
}

//! Memory map constants

/// Size of one quadword in bytes
pub const QUADWORD_SIZE: u32 = 16;

/// Mask that clears the byte offset within a quadword
pub const QUADWORD_MASK: u32 = !(QUADWORD_SIZE - 1);

/// Main memory size (32 MB)
pub const MAIN_MEM_SIZE: u32 = 32 * 1024 * 1024;

/// Scratchpad size (16 KB)
pub const SCRATCHPAD_SIZE: u32 = 16 * 1024;

/// Mask applied to scratchpad offsets held in SADR
pub const SCRATCHPAD_OFFSET_MASK: u32 = (SCRATCHPAD_SIZE - 1) & QUADWORD_MASK;

/// Upper bound (exclusive) of the bus window backed by main memory and its mirrors
pub const MAIN_MEM_WINDOW_END: u32 = 0x1000_0000;

/// Address bit that routes a DMA access to scratchpad
pub const SPR_SELECT_BIT: u32 = 1 << 31;

/// Segment through which the CPU maps scratchpad
pub const SPR_SEGMENT: u32 = 0x7000_0000;

/// Mask selecting the segment nibble of an address
pub const SEGMENT_MASK: u32 = 0xF000_0000;

//! Memory access shim
//!
//! Resolves a DMA bus address to main memory or scratchpad and performs a
//! quadword access. Addresses are always truncated to a quadword boundary.

use crate::constants::*;
use crate::image::MemoryImage;
use std::sync::Arc;

/// Where a bus address lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Byte offset into main memory (mirrors already folded)
    Main(usize),
    /// Byte offset into scratchpad
    Scratchpad(usize),
    /// Nothing backs this address
    Unbacked,
}

/// Memory capability handed to the DMAC at construction or reset
///
/// Both images are shared with the rest of the emulator; cloning the
/// capability clones the handles, not the bytes.
#[derive(Debug, Clone)]
pub struct DmaMemory {
    main: Arc<MemoryImage>,
    scratchpad: Arc<MemoryImage>,
}

impl DmaMemory {
    /// Wrap existing images
    pub fn new(main: Arc<MemoryImage>, scratchpad: Arc<MemoryImage>) -> Self {
        Self { main, scratchpad }
    }

    /// Allocate fresh zeroed images of the given sizes
    pub fn with_sizes(main_size: usize, scratchpad_size: usize) -> Result<Self, ed_core::MemoryError> {
        Ok(Self {
            main: MemoryImage::new("main", main_size)?,
            scratchpad: MemoryImage::new("scratchpad", scratchpad_size)?,
        })
    }

    /// Main memory image
    pub fn main(&self) -> &Arc<MemoryImage> {
        &self.main
    }

    /// Scratchpad image
    pub fn scratchpad(&self) -> &Arc<MemoryImage> {
        &self.scratchpad
    }

    /// Decide which image backs `addr`.
    ///
    /// Bit 31 or the 0x7xxx_xxxx segment selects scratchpad. Anything below
    /// [`MAIN_MEM_WINDOW_END`] is main memory, with mirrors folded onto the
    /// image size. Everything else is unbacked.
    pub fn resolve(&self, addr: u32) -> Region {
        let aligned = (addr & QUADWORD_MASK) as usize;

        if addr & SPR_SELECT_BIT != 0 || addr & SEGMENT_MASK == SPR_SEGMENT {
            Region::Scratchpad(aligned % self.scratchpad.len())
        } else if addr < MAIN_MEM_WINDOW_END {
            Region::Main(aligned % self.main.len())
        } else {
            Region::Unbacked
        }
    }

    /// Read one quadword. Unbacked addresses read as zero.
    pub fn fetch128(&self, addr: u32) -> u128 {
        match self.resolve(addr) {
            Region::Main(offset) => self.main.read128(offset),
            Region::Scratchpad(offset) => self.scratchpad.read128(offset),
            Region::Unbacked => {
                tracing::warn!("DMA read from unbacked address 0x{:08x}", addr);
                0
            }
        }
    }

    /// Write one quadword. Writes to unbacked addresses are dropped.
    pub fn store128(&self, addr: u32, data: u128) {
        match self.resolve(addr) {
            Region::Main(offset) => self.main.write128(offset, data),
            Region::Scratchpad(offset) => self.scratchpad.write128(offset, data),
            Region::Unbacked => {
                tracing::warn!("DMA write to unbacked address 0x{:08x} ignored", addr);
            }
        }
    }

    /// Read a quadword at a scratchpad-relative offset (SADR)
    pub fn fetch_scratchpad(&self, offset: u32) -> u128 {
        let offset = (offset & QUADWORD_MASK) as usize % self.scratchpad.len();
        self.scratchpad.read128(offset)
    }

    /// Write a quadword at a scratchpad-relative offset (SADR)
    pub fn store_scratchpad(&self, offset: u32, data: u128) {
        let offset = (offset & QUADWORD_MASK) as usize % self.scratchpad.len();
        self.scratchpad.write128(offset, data);
    }
}

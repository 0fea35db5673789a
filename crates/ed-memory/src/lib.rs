//! Memory images for the eedmac DMA controller emulator
//!
//! The DMAC never owns memory. The emulator allocates the main memory and
//! scratchpad images and hands the controller a [`DmaMemory`] capability
//! that resolves bus addresses to one of the two.

pub mod constants;
pub mod image;
pub mod shim;

pub use constants::*;
pub use image::MemoryImage;
pub use shim::{DmaMemory, Region};

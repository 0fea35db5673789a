//! DMA tags and the chain processors
//!
//! A tag is the low 64 bits of a quadword:
//!
//! | bits  | field |
//! |-------|-------|
//! | 0-15  | QWC   |
//! | 26-27 | PCE   |
//! | 28-30 | ID    |
//! | 31    | IRQ   |
//! | 32-62 | ADDR  |
//! | 63    | SPR   |
//!
//! Source chains read tags from memory at TADR. Destination chains (SIF0,
//! SPR_FROM) receive them from the producer ahead of each block.

use crate::channel::{ChannelId, ChcrFlags, CHCR_TAG_MASK};
use crate::dmac::Dmac;
use crate::engine::Far;
use ed_memory::{QUADWORD_SIZE, SPR_SELECT_BIT};

/// Decoded tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaTag {
    /// Quadwords in the block this tag describes
    pub qwc: u32,
    /// Priority control field
    pub pce: u8,
    /// Raw 3-bit ID
    pub id: u8,
    /// Interrupt request
    pub irq: bool,
    /// Embedded address, quadword aligned
    pub addr: u32,
    /// Embedded address points into scratchpad
    pub spr: bool,
    /// Upper half of word 0, mirrored into CHCR
    pub upper: u32,
}

impl DmaTag {
    pub fn decode(raw: u128) -> Self {
        let word0 = raw as u32;
        let word1 = (raw >> 32) as u32;
        Self {
            qwc: word0 & 0xFFFF,
            pce: ((word0 >> 26) & 0x3) as u8,
            id: ((word0 >> 28) & 0x7) as u8,
            irq: word0 & (1 << 31) != 0,
            addr: word1 & 0x7FFF_FFF0,
            spr: word1 & (1 << 31) != 0,
            upper: word0 & CHCR_TAG_MASK,
        }
    }

    /// Embedded address with the scratchpad select bit applied
    pub fn bus_address(&self) -> u32 {
        if self.spr {
            self.addr | SPR_SELECT_BIT
        } else {
            self.addr
        }
    }
}

/// Source-chain tag IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTagId {
    /// Data at ADDR, then stop
    Refe = 0,
    /// Data follows the tag, next tag follows the data
    Cnt = 1,
    /// Data follows the tag, next tag at ADDR
    Next = 2,
    /// Data at ADDR, next tag follows this one
    Ref = 3,
    /// As `ref`, subject to the drain stall
    Refs = 4,
    /// Data follows the tag, save the continuation and jump to ADDR
    Call = 5,
    /// Data follows the tag, resume at the saved continuation
    Ret = 6,
    /// Data follows the tag, then stop
    End = 7,
}

impl SourceTagId {
    /// Every 3-bit value names a source tag
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x7 {
            0 => Self::Refe,
            1 => Self::Cnt,
            2 => Self::Next,
            3 => Self::Ref,
            4 => Self::Refs,
            5 => Self::Call,
            6 => Self::Ret,
            _ => Self::End,
        }
    }

    /// Data lives at the tag's ADDR rather than after the tag
    pub fn is_reference(self) -> bool {
        matches!(self, Self::Refe | Self::Ref | Self::Refs)
    }
}

/// Destination-chain tag IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestTagId {
    /// As `cnt`, and the block publishes its address to STADR
    Cnts = 0,
    Cnt = 1,
    End = 7,
}

impl DestTagId {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x7 {
            0 => Some(Self::Cnts),
            1 => Some(Self::Cnt),
            7 => Some(Self::End),
            _ => None,
        }
    }
}

impl Dmac {
    /// Fetch and apply the next source tag.
    ///
    /// Returns false when the chain cannot advance yet (MFIFO empty).
    pub(crate) fn handle_source_chain(&mut self, index: usize, far: Far) -> bool {
        if !self.mfifo_handler(index) {
            return false;
        }

        let tag_address = self.channels[index].tag_address;
        let raw = self.memory.fetch128(tag_address);
        let tag = DmaTag::decode(raw);
        let id = SourceTagId::from_bits(tag.id);

        tracing::trace!(
            "{} tag {:?} at 0x{:08x}: qwc={} addr=0x{:08x} irq={}",
            ChannelId::ALL[index],
            id,
            tag_address,
            tag.qwc,
            tag.bus_address(),
            tag.irq
        );

        if self.channels[index].flags().contains(ChcrFlags::TTE) {
            self.deliver_tag(index, far, raw);
        }

        let chan = &mut self.channels[index];
        chan.control = (chan.control & !CHCR_TAG_MASK) | tag.upper;
        chan.tag_id = tag.id;
        chan.quadword_count = tag.qwc;
        chan.can_stall_drain = id == SourceTagId::Refs;

        let after_tag = tag_address.wrapping_add(QUADWORD_SIZE);
        let after_data = after_tag.wrapping_add(tag.qwc * QUADWORD_SIZE);

        match id {
            SourceTagId::Refe => {
                chan.address = tag.bus_address();
                chan.tag_address = after_tag;
                chan.tag_end = true;
            }
            SourceTagId::Cnt => {
                chan.address = after_tag;
                chan.tag_address = after_data;
            }
            SourceTagId::Next => {
                chan.address = after_tag;
                chan.tag_address = tag.bus_address();
            }
            SourceTagId::Ref | SourceTagId::Refs => {
                chan.address = tag.bus_address();
                chan.tag_address = after_tag;
            }
            SourceTagId::Call => {
                // One frame: a nested call shifts the older frame out of reach
                chan.address = after_tag;
                chan.tag_save1 = chan.tag_save0;
                chan.tag_save0 = after_data;
                chan.set_asp(1);
                chan.tag_address = tag.bus_address();
            }
            SourceTagId::Ret => {
                chan.address = after_tag;
                if chan.asp() > 0 {
                    chan.tag_address = chan.tag_save0;
                    chan.set_asp(0);
                } else {
                    chan.tag_address = after_data;
                    chan.tag_end = true;
                }
            }
            SourceTagId::End => {
                chan.address = after_tag;
                chan.tag_address = after_data;
                chan.tag_end = true;
            }
        }

        chan.is_spr = chan.address & SPR_SELECT_BIT != 0;

        if tag.irq && chan.flags().contains(ChcrFlags::TIE) {
            chan.tag_end = true;
        }

        if self.control.mfifo_drain() == Some(ChannelId::ALL[index]) {
            let chan = &self.channels[index];
            let (address, tag_address) = (chan.address, chan.tag_address);
            let address = if id.is_reference() {
                address
            } else {
                self.ring_wrap(address)
            };
            let tag_address = self.ring_wrap(tag_address);
            let chan = &mut self.channels[index];
            chan.address = address;
            chan.tag_address = tag_address;
        }

        true
    }

    /// Apply a tag handed over by the producer of a destination chain
    pub(crate) fn handle_dest_chain(&mut self, index: usize, raw: u128) {
        let tag = DmaTag::decode(raw);
        let chan = &mut self.channels[index];

        chan.control = (chan.control & !CHCR_TAG_MASK) | tag.upper;
        chan.tag_id = tag.id;
        chan.quadword_count = tag.qwc;
        chan.address = tag.bus_address();
        chan.is_spr = tag.spr;

        match DestTagId::from_bits(tag.id) {
            Some(id) => {
                tracing::trace!(
                    "{} dest tag {:?}: qwc={} addr=0x{:08x}",
                    chan.id(),
                    id,
                    tag.qwc,
                    chan.address
                );
                if id == DestTagId::End {
                    chan.tag_end = true;
                }
            }
            None => {
                tracing::warn!(
                    "{}: malformed destination tag id {} (raw 0x{:016x}), ending chain",
                    chan.id(),
                    tag.id,
                    raw as u64
                );
                chan.quadword_count = 0;
                chan.tag_end = true;
                return;
            }
        }

        if tag.irq && chan.flags().contains(ChcrFlags::TIE) {
            chan.tag_end = true;
        }
    }
}

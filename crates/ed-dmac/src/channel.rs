//! DMA channel table
//!
//! Fifteen fixed slots. Ten are transfer endpoints, slot 10 stands in for
//! the CPU on the bus, and the rest only exist as D_STAT bit positions.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Number of channel slots
pub const NUM_CHANNELS: usize = 15;

/// Priority tier of the CPU while cycle stealing is on
pub const PRIORITY_CPU_STEALING: usize = 0;
/// Priority tier of the CPU while cycle stealing is off
pub const PRIORITY_CPU_BASELINE: usize = 4;
/// Tier shared by every channel without a dedicated one
pub const PRIORITY_DEFAULT: usize = 3;

/// Channel slot identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelId {
    /// Vector interface 0 (memory to VIF0)
    Vif0 = 0,
    /// Vector interface 1 (either direction)
    Vif1 = 1,
    /// Graphics interface, path 3
    Gif = 2,
    /// Image processing unit output (IPU to memory)
    IpuFrom = 3,
    /// Image processing unit input (memory to IPU)
    IpuTo = 4,
    /// Mailbox link from the I/O processor
    Sif0 = 5,
    /// Mailbox link to the I/O processor
    Sif1 = 6,
    /// Bidirectional mailbox link
    Sif2 = 7,
    /// Scratchpad to memory
    SprFrom = 8,
    /// Memory to scratchpad
    SprTo = 9,
    /// CPU bus slice used by cycle stealing
    EeReq = 10,
    Reserved11 = 11,
    Reserved12 = 12,
    /// D_STAT stall interrupt position
    Stall = 13,
    /// D_STAT MFIFO empty interrupt position
    MfifoEmpty = 14,
}

impl ChannelId {
    /// Every slot in index order
    pub const ALL: [ChannelId; NUM_CHANNELS] = [
        Self::Vif0,
        Self::Vif1,
        Self::Gif,
        Self::IpuFrom,
        Self::IpuTo,
        Self::Sif0,
        Self::Sif1,
        Self::Sif2,
        Self::SprFrom,
        Self::SprTo,
        Self::EeReq,
        Self::Reserved11,
        Self::Reserved12,
        Self::Stall,
        Self::MfifoEmpty,
    ];

    /// Slot index
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a slot by index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Short hardware name, for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Self::Vif0 => "VIF0",
            Self::Vif1 => "VIF1",
            Self::Gif => "GIF",
            Self::IpuFrom => "IPU_FROM",
            Self::IpuTo => "IPU_TO",
            Self::Sif0 => "SIF0",
            Self::Sif1 => "SIF1",
            Self::Sif2 => "SIF2",
            Self::SprFrom => "SPR_FROM",
            Self::SprTo => "SPR_TO",
            Self::EeReq => "EE_REQ",
            Self::Reserved11 => "RESERVED11",
            Self::Reserved12 => "RESERVED12",
            Self::Stall => "STALL",
            Self::MfifoEmpty => "MFIFO_EMPTY",
        }
    }

    /// Tier the channel queues on (cycle stealing off)
    pub fn base_priority(self) -> usize {
        match self {
            Self::Vif0 => 1,
            Self::Sif2 => 2,
            Self::EeReq => PRIORITY_CPU_BASELINE,
            _ => PRIORITY_DEFAULT,
        }
    }

    /// Whether the slot moves data at all
    pub fn is_transfer_channel(self) -> bool {
        self.index() <= Self::SprTo.index()
    }

    /// Whether the channel waits on a request line raised by its peer.
    /// Scratchpad transfers are always requested.
    pub fn needs_request_line(self) -> bool {
        !self.is_scratchpad()
    }

    /// Scratchpad channels, the only ones with an interleave mode
    pub fn is_scratchpad(self) -> bool {
        matches!(self, Self::SprFrom | Self::SprTo)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Execution routine bound to a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Routine {
    Vif0,
    Vif1,
    Gif,
    IpuFrom,
    IpuTo,
    Sif0,
    Sif1,
    Sif2,
    SprFrom,
    SprTo,
    /// Hands bus cycles back to the CPU
    CpuSlice,
    /// Slot never executes
    Idle,
}

/// Routine table, indexed by slot
pub const ROUTINES: [Routine; NUM_CHANNELS] = [
    Routine::Vif0,
    Routine::Vif1,
    Routine::Gif,
    Routine::IpuFrom,
    Routine::IpuTo,
    Routine::Sif0,
    Routine::Sif1,
    Routine::Sif2,
    Routine::SprFrom,
    Routine::SprTo,
    Routine::CpuSlice,
    Routine::Idle,
    Routine::Idle,
    Routine::Idle,
    Routine::Idle,
];

bitflags! {
    /// Single-bit fields of CHCR
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChcrFlags: u32 {
        /// Transfer direction: set means memory is the source
        const DIR = 1 << 0;
        /// Transfer the tag quadword along with the data
        const TTE = 1 << 6;
        /// Honour the IRQ bit of tags
        const TIE = 1 << 7;
        /// Channel running
        const STR = 1 << 8;
    }
}

/// CHCR mode field bit offset
pub const CHCR_MODE_SHIFT: u32 = 2;
/// CHCR address-stack-pointer field bit offset
pub const CHCR_ASP_SHIFT: u32 = 4;
/// CHCR bits that mirror the upper half of the last tag
pub const CHCR_TAG_MASK: u32 = 0xFFFF_0000;

/// CHCR MOD field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Move QWC quadwords and stop
    Normal,
    /// Follow tags
    Chain,
    /// Move/skip blocks per D_SQWC
    Interleave,
}

impl TransferMode {
    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Normal,
            2 => Self::Interleave,
            // 3 is undefined; the hardware decodes only bit 0 for chaining
            _ => Self::Chain,
        }
    }
}

/// One channel slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// CHCR
    pub control: u32,
    /// MADR (bit 31 selects scratchpad)
    pub address: u32,
    /// QWC
    pub quadword_count: u32,
    /// TADR
    pub tag_address: u32,
    /// ASR0
    pub tag_save0: u32,
    /// ASR1
    pub tag_save1: u32,
    /// SADR
    pub scratchpad_address: u32,

    /// No tags follow the current block
    pub tag_end: bool,
    /// Held by stall control or an empty MFIFO
    pub paused: bool,
    /// Quadwords left in the current interleave block
    pub interleaved_qwc: u8,
    /// ID of the last tag decoded
    pub tag_id: u8,

    /// Execution routine
    pub routine: Routine,

    /// STR was raised and the transfer has not ended
    pub started: bool,
    /// Current tag is `refs`, so the drain stall check applies
    pub can_stall_drain: bool,
    /// Request line from the peer
    pub dma_req: bool,
    /// MADR points into scratchpad
    pub is_spr: bool,

    /// Slot index
    pub index: usize,
    /// Priority tier
    pub priority: usize,
}

impl Channel {
    /// Power-on state for a slot
    pub fn new(id: ChannelId) -> Self {
        let index = id.index();
        Self {
            control: 0,
            address: 0,
            quadword_count: 0,
            tag_address: 0,
            tag_save0: 0,
            tag_save1: 0,
            scratchpad_address: 0,
            tag_end: false,
            paused: false,
            interleaved_qwc: 0,
            tag_id: 0,
            routine: ROUTINES[index],
            started: false,
            can_stall_drain: false,
            // The IPU raises its own lines once its FIFOs have room or data
            dma_req: !matches!(id, ChannelId::IpuFrom | ChannelId::IpuTo),
            is_spr: false,
            index,
            priority: id.base_priority(),
        }
    }

    /// Slot identifier
    pub fn id(&self) -> ChannelId {
        ChannelId::ALL[self.index]
    }

    /// CHCR single-bit flags
    #[inline]
    pub fn flags(&self) -> ChcrFlags {
        ChcrFlags::from_bits_truncate(self.control)
    }

    /// STR bit
    #[inline]
    pub fn is_running(&self) -> bool {
        self.flags().contains(ChcrFlags::STR)
    }

    /// DIR bit
    #[inline]
    pub fn from_memory(&self) -> bool {
        self.flags().contains(ChcrFlags::DIR)
    }

    /// MOD field
    #[inline]
    pub fn mode(&self) -> TransferMode {
        TransferMode::from_bits(self.control >> CHCR_MODE_SHIFT)
    }

    /// ASP field
    #[inline]
    pub fn asp(&self) -> u32 {
        (self.control >> CHCR_ASP_SHIFT) & 0x3
    }

    pub(crate) fn set_asp(&mut self, asp: u32) {
        self.control &= !(0x3 << CHCR_ASP_SHIFT);
        self.control |= (asp & 0x3) << CHCR_ASP_SHIFT;
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        let mut flags = self.flags();
        flags.set(ChcrFlags::STR, running);
        self.control = (self.control & !ChcrFlags::all().bits()) | flags.bits();
    }

    /// Whether the current block has been fully moved
    #[inline]
    pub fn block_done(&self) -> bool {
        self.quadword_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_ids_roundtrip() {
        for (i, id) in ChannelId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
            assert_eq!(ChannelId::from_index(i), Some(*id));
        }
        assert_eq!(ChannelId::from_index(NUM_CHANNELS), None);
    }

    #[test]
    fn test_priority_tiers() {
        assert_eq!(ChannelId::Vif0.base_priority(), 1);
        assert_eq!(ChannelId::Sif2.base_priority(), 2);
        assert_eq!(ChannelId::Gif.base_priority(), 3);
        assert_eq!(ChannelId::SprTo.base_priority(), 3);
        assert_eq!(ChannelId::EeReq.base_priority(), 4);
    }

    #[test]
    fn test_chcr_fields() {
        let mut chan = Channel::new(ChannelId::Gif);
        chan.control = 0x0000_01C5; // STR | TIE | TTE | chain | DIR
        assert!(chan.is_running());
        assert!(chan.from_memory());
        assert_eq!(chan.mode(), TransferMode::Chain);
        assert!(chan.flags().contains(ChcrFlags::TTE | ChcrFlags::TIE));

        chan.set_asp(1);
        assert_eq!(chan.asp(), 1);
        assert_eq!(chan.control & 0x30, 0x10);

        chan.set_running(false);
        assert!(!chan.is_running());
        assert_eq!(chan.control, 0x0000_00D5);
    }

    #[test]
    fn test_power_on_request_lines() {
        assert!(Channel::new(ChannelId::Sif0).dma_req);
        assert!(Channel::new(ChannelId::Gif).dma_req);
        assert!(!Channel::new(ChannelId::IpuFrom).dma_req);
        assert!(!Channel::new(ChannelId::IpuTo).dma_req);
    }

    #[test]
    fn test_routine_binding() {
        assert_eq!(Channel::new(ChannelId::SprFrom).routine, Routine::SprFrom);
        assert_eq!(Channel::new(ChannelId::EeReq).routine, Routine::CpuSlice);
        assert_eq!(Channel::new(ChannelId::Stall).routine, Routine::Idle);
    }

    #[test]
    fn test_interleave_mode() {
        let mut chan = Channel::new(ChannelId::SprTo);
        chan.control = 2 << CHCR_MODE_SHIFT;
        assert_eq!(chan.mode(), TransferMode::Interleave);
    }
}

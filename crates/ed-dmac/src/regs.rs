//! Controller-wide registers and the register address map

use crate::channel::{ChannelId, NUM_CHANNELS};
use serde::{Deserialize, Serialize};

/// Register addresses
pub mod addr {
    /// Per-channel register block bases, indexed by slot
    pub const CHANNEL_BASES: [(u32, super::ChannelId); 10] = [
        (0x1000_8000, super::ChannelId::Vif0),
        (0x1000_9000, super::ChannelId::Vif1),
        (0x1000_A000, super::ChannelId::Gif),
        (0x1000_B000, super::ChannelId::IpuFrom),
        (0x1000_B400, super::ChannelId::IpuTo),
        (0x1000_C000, super::ChannelId::Sif0),
        (0x1000_C400, super::ChannelId::Sif1),
        (0x1000_C800, super::ChannelId::Sif2),
        (0x1000_D000, super::ChannelId::SprFrom),
        (0x1000_D400, super::ChannelId::SprTo),
    ];

    /// Size of one channel register block
    pub const CHANNEL_BLOCK_SIZE: u32 = 0x400;

    pub const CHCR: u32 = 0x00;
    pub const MADR: u32 = 0x10;
    pub const QWC: u32 = 0x20;
    pub const TADR: u32 = 0x30;
    pub const ASR0: u32 = 0x40;
    pub const ASR1: u32 = 0x50;
    pub const SADR: u32 = 0x80;

    pub const D_CTRL: u32 = 0x1000_E000;
    pub const D_STAT: u32 = 0x1000_E010;
    pub const D_PCR: u32 = 0x1000_E020;
    pub const D_SQWC: u32 = 0x1000_E030;
    pub const D_RBSR: u32 = 0x1000_E040;
    pub const D_RBOR: u32 = 0x1000_E050;
    pub const D_STADR: u32 = 0x1000_E060;

    /// Master disable, read side
    pub const D_ENABLER: u32 = 0x1000_F520;
    /// Master disable, write side
    pub const D_ENABLEW: u32 = 0x1000_F590;
}

/// Field within a channel register block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelReg {
    Chcr,
    Madr,
    Qwc,
    Tadr,
    Asr0,
    Asr1,
    Sadr,
}

/// Decoded register address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Channel(ChannelId, ChannelReg),
    Ctrl,
    Stat,
    Pcr,
    Sqwc,
    Rbsr,
    Rbor,
    Stadr,
    EnableR,
    EnableW,
}

impl Register {
    /// Decode a word-aligned register address
    pub fn decode(address: u32) -> Option<Self> {
        let address = address & !0x3;
        match address {
            addr::D_CTRL => return Some(Self::Ctrl),
            addr::D_STAT => return Some(Self::Stat),
            addr::D_PCR => return Some(Self::Pcr),
            addr::D_SQWC => return Some(Self::Sqwc),
            addr::D_RBSR => return Some(Self::Rbsr),
            addr::D_RBOR => return Some(Self::Rbor),
            addr::D_STADR => return Some(Self::Stadr),
            addr::D_ENABLER => return Some(Self::EnableR),
            addr::D_ENABLEW => return Some(Self::EnableW),
            _ => {}
        }

        let (base, id) = addr::CHANNEL_BASES
            .iter()
            .copied()
            .find(|(base, _)| address >= *base && address < base + addr::CHANNEL_BLOCK_SIZE)?;

        let field = match address - base {
            addr::CHCR => ChannelReg::Chcr,
            addr::MADR => ChannelReg::Madr,
            addr::QWC => ChannelReg::Qwc,
            addr::TADR => ChannelReg::Tadr,
            addr::ASR0 => ChannelReg::Asr0,
            addr::ASR1 => ChannelReg::Asr1,
            addr::SADR => ChannelReg::Sadr,
            _ => return None,
        };
        Some(Self::Channel(id, field))
    }
}

/// D_CTRL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DCtrl {
    /// DMAE
    pub master_enable: bool,
    /// RELE
    pub cycle_stealing: bool,
    /// MFD: 0 off, 2 VIF1, 3 GIF
    pub mem_drain_channel: u8,
    /// STS: 0 off, 1 SIF0, 2 SPR_FROM, 3 IPU_FROM
    pub stall_source_channel: u8,
    /// STD: 0 off, 1 VIF1, 2 GIF, 3 SIF1
    pub stall_dest_channel: u8,
    /// RCYC
    pub release_cycle: u8,
}

impl DCtrl {
    pub fn read(&self) -> u32 {
        let mut reg = 0;
        reg |= self.master_enable as u32;
        reg |= (self.cycle_stealing as u32) << 1;
        reg |= (self.mem_drain_channel as u32) << 2;
        reg |= (self.stall_source_channel as u32) << 4;
        reg |= (self.stall_dest_channel as u32) << 6;
        reg |= (self.release_cycle as u32) << 8;
        reg
    }

    pub fn write(&mut self, value: u32) {
        self.master_enable = value & 0x1 != 0;
        self.cycle_stealing = value & 0x2 != 0;
        self.mem_drain_channel = ((value >> 2) & 0x3) as u8;
        self.stall_source_channel = ((value >> 4) & 0x3) as u8;
        self.stall_dest_channel = ((value >> 6) & 0x3) as u8;
        self.release_cycle = ((value >> 8) & 0x7) as u8;
    }

    /// Channel draining the MFIFO ring, if MFIFO is on
    pub fn mfifo_drain(&self) -> Option<ChannelId> {
        match self.mem_drain_channel {
            2 => Some(ChannelId::Vif1),
            3 => Some(ChannelId::Gif),
            _ => None,
        }
    }

    /// Channel that publishes its write address to STADR
    pub fn stall_source(&self) -> Option<ChannelId> {
        match self.stall_source_channel {
            1 => Some(ChannelId::Sif0),
            2 => Some(ChannelId::SprFrom),
            3 => Some(ChannelId::IpuFrom),
            _ => None,
        }
    }

    /// Channel held back by STADR
    pub fn stall_dest(&self) -> Option<ChannelId> {
        match self.stall_dest_channel {
            1 => Some(ChannelId::Vif1),
            2 => Some(ChannelId::Gif),
            3 => Some(ChannelId::Sif1),
            _ => None,
        }
    }

    /// Bus cycles between releases while cycle stealing
    pub fn release_period(&self) -> u32 {
        match self.release_cycle {
            0..=5 => 8 << self.release_cycle,
            // 6 and 7 are reserved
            _ => 8,
        }
    }
}

/// D_STAT
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DStat {
    pub channel_stat: [bool; NUM_CHANNELS],
    pub channel_mask: [bool; NUM_CHANNELS],
}

impl DStat {
    pub fn read(&self) -> u32 {
        let mut reg = 0;
        for i in 0..NUM_CHANNELS {
            reg |= (self.channel_stat[i] as u32) << i;
            reg |= (self.channel_mask[i] as u32) << (i + 16);
        }
        reg
    }

    /// Stat bits clear on 1, mask bits toggle on 1
    pub fn write(&mut self, value: u32) {
        for i in 0..NUM_CHANNELS {
            if value & (1 << i) != 0 {
                self.channel_stat[i] = false;
            }
            if value & (1 << (i + 16)) != 0 {
                self.channel_mask[i] = !self.channel_mask[i];
            }
        }
    }

    /// Any unmasked status bit raised
    pub fn pending(&self) -> bool {
        self.channel_stat
            .iter()
            .zip(self.channel_mask.iter())
            .any(|(stat, mask)| *stat && *mask)
    }
}

/// D_SQWC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DSqwc {
    pub skip_qwc: u8,
    pub transfer_qwc: u8,
}

impl DSqwc {
    pub fn read(&self) -> u32 {
        self.skip_qwc as u32 | ((self.transfer_qwc as u32) << 16)
    }

    pub fn write(&mut self, value: u32) {
        self.skip_qwc = (value & 0xFF) as u8;
        self.transfer_qwc = ((value >> 16) & 0xFF) as u8;
    }
}

/// D_PCR priority-enable bit
pub const PCR_PCE: u32 = 1 << 31;
/// D_PCR per-channel enable field offset
pub const PCR_CDE_SHIFT: u32 = 16;

/// D_ENABLE bit that suspends every transfer
pub const ENABLE_SUSPEND: u32 = 1 << 16;
/// D_ENABLE power-on value
pub const ENABLE_RESET_VALUE: u32 = 0x1201;

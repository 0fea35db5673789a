//! CPU-side register window
//!
//! All accesses funnel into the 32-bit paths. Narrow writes merge into the
//! containing word, except D_STAT where the lanes not written are zero so
//! they neither acknowledge nor toggle anything.

use crate::channel::ChannelId;
use crate::dmac::Dmac;
use crate::regs::{ChannelReg, Register, ENABLE_SUSPEND};
use ed_memory::{QUADWORD_MASK, SCRATCHPAD_OFFSET_MASK, SPR_SELECT_BIT};

/// RBOR, RBSR and STADR ignore bit 31 and the byte offset
const RING_ADDRESS_MASK: u32 = 0x7FFF_FFF0;

impl Dmac {
    pub fn read8(&self, address: u32) -> u8 {
        (self.read32(address & !0x3) >> ((address & 0x3) * 8)) as u8
    }

    pub fn read16(&self, address: u32) -> u16 {
        (self.read32(address & !0x3) >> ((address & 0x2) * 8)) as u16
    }

    pub fn read32(&self, address: u32) -> u32 {
        let Some(reg) = Register::decode(address) else {
            tracing::warn!("Read from unknown DMAC register 0x{:08x}", address);
            return 0;
        };

        match reg {
            Register::Channel(id, field) => {
                let chan = &self.channels[id.index()];
                match field {
                    ChannelReg::Chcr => chan.control,
                    ChannelReg::Madr => chan.address,
                    ChannelReg::Qwc => chan.quadword_count,
                    ChannelReg::Tadr => chan.tag_address,
                    ChannelReg::Asr0 => chan.tag_save0,
                    ChannelReg::Asr1 => chan.tag_save1,
                    ChannelReg::Sadr => chan.scratchpad_address,
                }
            }
            Register::Ctrl => self.control.read(),
            Register::Stat => self.interrupt_stat.read(),
            Register::Pcr => self.pcr,
            Register::Sqwc => self.sqwc.read(),
            Register::Rbsr => self.rbsr,
            Register::Rbor => self.rbor,
            Register::Stadr => self.stadr,
            Register::EnableR | Register::EnableW => self.master_disable,
        }
    }

    pub fn write8(&mut self, address: u32, value: u8) {
        let shift = (address & 0x3) * 8;
        self.write_partial(address, (value as u32) << shift, 0xFF << shift);
    }

    pub fn write16(&mut self, address: u32, value: u16) {
        let shift = (address & 0x2) * 8;
        self.write_partial(address, (value as u32) << shift, 0xFFFF << shift);
    }

    fn write_partial(&mut self, address: u32, value: u32, lanes: u32) {
        let word = address & !0x3;
        let merged = match Register::decode(word) {
            Some(Register::Stat) => value,
            _ => (self.read32(word) & !lanes) | value,
        };
        self.write32(word, merged);
    }

    pub fn write32(&mut self, address: u32, value: u32) {
        let Some(reg) = Register::decode(address) else {
            tracing::warn!(
                "Write to unknown DMAC register 0x{:08x} = 0x{:08x}",
                address,
                value
            );
            return;
        };

        match reg {
            Register::Channel(id, field) => self.write_channel(id, field, value),
            Register::Ctrl => self.write_ctrl(value),
            Register::Stat => {
                self.interrupt_stat.write(value);
                self.int1_check();
            }
            Register::Pcr => {
                self.pcr = value;
                tracing::debug!("D_PCR = 0x{:08x}", value);
                self.refresh_admission();
            }
            Register::Sqwc => self.sqwc.write(value),
            Register::Rbsr => self.rbsr = value & RING_ADDRESS_MASK,
            Register::Rbor => self.rbor = value & RING_ADDRESS_MASK,
            Register::Stadr => self.update_stadr(value & RING_ADDRESS_MASK),
            Register::EnableR => {
                tracing::debug!("Ignoring write to read-only D_ENABLER: 0x{:08x}", value);
            }
            Register::EnableW => self.write_master_disable(value),
        }
    }

    fn write_channel(&mut self, id: ChannelId, field: ChannelReg, value: u32) {
        let index = id.index();
        let chan = &mut self.channels[index];

        match field {
            ChannelReg::Chcr => {
                let was_running = chan.is_running();
                chan.control = value;
                match (was_running, chan.is_running()) {
                    (false, true) => self.start(index),
                    (true, false) => {
                        tracing::debug!("{} stopped by software", id);
                        self.deactivate_channel(index);
                    }
                    _ => {}
                }
            }
            ChannelReg::Madr => {
                chan.address = value & QUADWORD_MASK;
                chan.is_spr = value & SPR_SELECT_BIT != 0;
            }
            ChannelReg::Qwc => chan.quadword_count = value & 0xFFFF,
            ChannelReg::Tadr => chan.tag_address = value & QUADWORD_MASK,
            ChannelReg::Asr0 => chan.tag_save0 = value & QUADWORD_MASK,
            ChannelReg::Asr1 => chan.tag_save1 = value & QUADWORD_MASK,
            ChannelReg::Sadr => chan.scratchpad_address = value & SCRATCHPAD_OFFSET_MASK,
        }
    }

    fn write_ctrl(&mut self, value: u32) {
        let old = self.control;
        self.control.write(value);
        tracing::debug!("D_CTRL = 0x{:08x}", self.control.read());

        if old.cycle_stealing != self.control.cycle_stealing {
            self.update_cpu_tier();
        }
        if old.mfifo_drain() != self.control.mfifo_drain()
            || old.stall_dest() != self.control.stall_dest()
        {
            self.release_stale_pauses();
        }
        if old.master_enable != self.control.master_enable {
            self.refresh_admission();
        }
    }

    /// D_ENABLER
    pub fn read_master_disable(&self) -> u32 {
        self.master_disable
    }

    /// D_ENABLEW. Reachable regardless of D_CTRL.DMAE.
    pub fn write_master_disable(&mut self, value: u32) {
        self.master_disable = value;
        tracing::debug!(
            "D_ENABLE = 0x{:08x} ({})",
            value,
            if value & ENABLE_SUSPEND != 0 { "suspended" } else { "running" }
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::channel::ChannelId;
    use crate::dmac::Dmac;
    use crate::peer::Peers;
    use ed_memory::DmaMemory;

    fn create_test_dmac() -> Dmac {
        let memory = DmaMemory::with_sizes(0x10000, 0x4000).unwrap();
        Dmac::new(memory, Peers::null())
    }

    #[test]
    fn test_channel_register_roundtrip() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_9010, 0x8000_1234);
        dmac.write32(0x1000_9020, 0x0012_3456);
        dmac.write32(0x1000_9030, 0x0000_567F);
        dmac.write32(0x1000_9040, 0x0000_1000);
        dmac.write32(0x1000_9050, 0x0000_2000);

        assert_eq!(dmac.read32(0x1000_9010), 0x8000_1230);
        assert!(dmac.channel(ChannelId::Vif1).is_spr);
        assert_eq!(dmac.read32(0x1000_9020), 0x3456);
        assert_eq!(dmac.read32(0x1000_9030), 0x5670);
        assert_eq!(dmac.read32(0x1000_9040), 0x1000);
        assert_eq!(dmac.read32(0x1000_9050), 0x2000);
    }

    #[test]
    fn test_sadr_is_scratchpad_relative() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_D080, 0xFFFF_FFFF);
        assert_eq!(dmac.read32(0x1000_D080), 0x3FF0);
    }

    #[test]
    fn test_narrow_access() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_8010, 0x1234_5670);
        assert_eq!(dmac.read8(0x1000_8011), 0x56);
        assert_eq!(dmac.read16(0x1000_8012), 0x1234);

        dmac.write16(0x1000_8012, 0xABCD);
        assert_eq!(dmac.read32(0x1000_8010), 0xABCD_5670);
        dmac.write8(0x1000_8010, 0x80);
        assert_eq!(dmac.read32(0x1000_8010), 0xABCD_5680);
    }

    #[test]
    fn test_narrow_d_stat_write_touches_only_its_lanes() {
        let mut dmac = create_test_dmac();
        dmac.transfer_end(ChannelId::Vif0.index());
        dmac.transfer_end(ChannelId::Gif.index());

        // Byte write into the mask half must not acknowledge the stat bits
        dmac.write8(0x1000_E012, 0x04);
        let stat = dmac.read32(0x1000_E010);
        assert_eq!(stat & 0x7FFF, 0x5);
        assert_eq!(stat >> 16, 0x4);

        dmac.write8(0x1000_E010, 0x01);
        assert_eq!(dmac.read32(0x1000_E010) & 0x7FFF, 0x4);
    }

    #[test]
    fn test_byte_write_raises_str() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_E000, 1);
        dmac.write32(0x1000_C420, 1);
        dmac.write8(0x1000_C400, 0x01);
        assert_eq!(dmac.active_channel(), None);

        dmac.write8(0x1000_C401, 0x01);
        assert_eq!(dmac.active_channel(), Some(ChannelId::Sif1));
        assert_eq!(dmac.read32(0x1000_C400), 0x101);
    }

    #[test]
    fn test_clearing_str_stops_channel() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_E000, 1);
        dmac.write32(0x1000_C420, 4);
        dmac.write32(0x1000_C400, 0x101);
        assert_eq!(dmac.active_channel(), Some(ChannelId::Sif1));

        dmac.write32(0x1000_C400, 0x001);
        assert_eq!(dmac.active_channel(), None);
        assert_eq!(dmac.read32(0x1000_C420), 4);
    }

    #[test]
    fn test_master_disable_window() {
        let mut dmac = create_test_dmac();
        assert_eq!(dmac.read32(0x1000_F520), 0x1201);
        dmac.write32(0x1000_F520, 0);
        assert_eq!(dmac.read32(0x1000_F520), 0x1201);
        dmac.write32(0x1000_F590, 0x1_0000);
        assert_eq!(dmac.read32(0x1000_F520), 0x1_0000);
    }

    #[test]
    fn test_unknown_register() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_E070, 0xFFFF_FFFF);
        assert_eq!(dmac.read32(0x1000_E070), 0);
    }

    #[test]
    fn test_ring_registers() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_E050, 0x8000_4008);
        dmac.write32(0x1000_E040, 0x0000_0FFF);
        assert_eq!(dmac.read32(0x1000_E050), 0x4000);
        assert_eq!(dmac.read32(0x1000_E040), 0x0FF0);
    }
}

//! MFIFO ring and stall control
//!
//! Both mechanisms meet at STADR. With MFIFO on, SPR_FROM fills a ring
//! (RBOR/RBSR) in main memory and publishes its write position; the drain
//! channel (VIF1 or GIF) pauses when its tag pointer catches up. With stall
//! control on, the stall-source channel publishes its write position and
//! the stall-dest channel pauses before reading past it on `refs` tags.

use crate::channel::{ChannelId, TransferMode, NUM_CHANNELS};
use crate::dmac::Dmac;
use crate::tag::SourceTagId;

impl Dmac {
    /// Fold an address into the MFIFO ring
    pub(crate) fn ring_wrap(&self, addr: u32) -> u32 {
        self.rbor | (addr & self.rbsr)
    }

    fn is_mfifo_drain(&self, index: usize) -> bool {
        self.control.mfifo_drain().map(ChannelId::index) == Some(index)
    }

    /// Data addresses of the drain's current block live in the ring
    pub(crate) fn data_in_ring(&self, index: usize) -> bool {
        let chan = &self.channels[index];
        self.is_mfifo_drain(index)
            && chan.mode() == TransferMode::Chain
            && !SourceTagId::from_bits(chan.tag_id).is_reference()
    }

    /// Whether the drain's next tag would be read from the empty part of the ring
    fn mfifo_is_empty(&self, index: usize) -> bool {
        self.ring_wrap(self.channels[index].tag_address) == self.stadr
    }

    /// Gate a tag fetch by the MFIFO drain channel.
    ///
    /// Returns false (and pauses the channel) when the ring is empty. The
    /// MEIS interrupt is raised once per starvation.
    pub(crate) fn mfifo_handler(&mut self, index: usize) -> bool {
        if !self.is_mfifo_drain(index) {
            return true;
        }

        let wrapped = self.ring_wrap(self.channels[index].tag_address);
        self.channels[index].tag_address = wrapped;

        if self.mfifo_is_empty(index) {
            self.starve_mfifo(index);
            return false;
        }
        true
    }

    fn starve_mfifo(&mut self, index: usize) {
        if !self.mfifo_empty_triggered {
            tracing::debug!("MFIFO empty, {} waits on STADR", ChannelId::ALL[index]);
            self.mfifo_empty_triggered = true;
            self.interrupt_stat.channel_stat[ChannelId::MfifoEmpty.index()] = true;
            self.int1_check();
        }
        self.pause_channel(index);
    }

    /// Publish a new stall address and wake or hold the channels watching it
    pub(crate) fn update_stadr(&mut self, addr: u32) {
        self.stadr = addr;
        tracing::trace!("STADR = 0x{:08x}", addr);

        if let Some(drain) = self.control.mfifo_drain() {
            let index = drain.index();
            let chan = &self.channels[index];
            let waiting_on_tag = chan.is_running()
                && chan.started
                && chan.mode() == TransferMode::Chain
                && chan.block_done()
                && !chan.tag_end;

            if waiting_on_tag && self.mfifo_is_empty(index) {
                if !chan.paused {
                    self.starve_mfifo(index);
                }
            } else if chan.paused {
                self.mfifo_empty_triggered = false;
                self.resume_channel(index);
            }
        }

        if let Some(dest) = self.control.stall_dest() {
            let index = dest.index();
            if self.channels[index].paused && !self.drain_would_overrun(index) {
                self.resume_channel(index);
            }
        }
    }

    fn resume_channel(&mut self, index: usize) {
        self.channels[index].paused = false;
        tracing::debug!("{} resumed", ChannelId::ALL[index]);
        self.check_for_activation(index);
    }

    /// Whether the stall-dest channel is about to read data the stall
    /// source has not written yet
    pub(crate) fn drain_would_overrun(&self, index: usize) -> bool {
        let chan = &self.channels[index];
        self.control.stall_dest().map(ChannelId::index) == Some(index)
            && chan.can_stall_drain
            && chan.address >= self.stadr
    }

    /// Hold the stall-dest channel and raise SIS
    pub(crate) fn stall_drain(&mut self, index: usize) {
        tracing::debug!(
            "{} stalled at 0x{:08x} (STADR 0x{:08x})",
            ChannelId::ALL[index],
            self.channels[index].address,
            self.stadr
        );
        self.interrupt_stat.channel_stat[ChannelId::Stall.index()] = true;
        self.int1_check();
        self.pause_channel(index);
    }

    /// Whether `index` is the stall source and its current block feeds STADR
    pub(crate) fn publishes_stadr(&self, index: usize) -> bool {
        let chan = &self.channels[index];
        self.control.stall_source().map(ChannelId::index) == Some(index)
            && (chan.mode() != TransferMode::Chain || chan.tag_id == 0)
    }

    /// Release channels held by a stall or drain role they no longer have
    pub(crate) fn release_stale_pauses(&mut self) {
        if self.control.mfifo_drain().is_none() {
            self.mfifo_empty_triggered = false;
        }
        for index in 0..NUM_CHANNELS {
            if !self.channels[index].paused {
                continue;
            }
            let drain = self.is_mfifo_drain(index);
            let stall = self.control.stall_dest().map(ChannelId::index) == Some(index);
            if !drain && !stall {
                self.resume_channel(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::channel::ChannelId;
    use crate::dmac::Dmac;
    use crate::peer::Peers;
    use ed_memory::DmaMemory;

    fn tag(id: u8, qwc: u32, addr: u32) -> u128 {
        let word0 = qwc as u64 | ((id as u64) << 28);
        (word0 | ((addr as u64) << 32)) as u128
    }

    fn create_test_dmac() -> Dmac {
        let memory = DmaMemory::with_sizes(0x10000, 0x4000).unwrap();
        let mut dmac = Dmac::new(memory, Peers::null());
        dmac.write32(0x1000_E000, 1);
        dmac
    }

    /// MFIFO with GIF as the drain, ring at 0x4000..0x5000
    fn setup_ring(dmac: &mut Dmac) {
        dmac.write32(0x1000_E050, 0x4000);
        dmac.write32(0x1000_E040, 0x0FF0);
        dmac.write32(0x1000_E000, 0x1 | (3 << 2));
    }

    #[test]
    fn test_ring_wrap() {
        let mut dmac = create_test_dmac();
        setup_ring(&mut dmac);
        assert_eq!(dmac.ring_wrap(0x4FF0 + 16), 0x4000);
        assert_eq!(dmac.ring_wrap(0x4120), 0x4120);
    }

    #[test]
    fn test_empty_ring_pauses_drain() {
        let mut dmac = create_test_dmac();
        setup_ring(&mut dmac);
        dmac.write32(0x1000_E060, 0x4000);
        dmac.write32(0x1000_A030, 0x4000);
        dmac.write32(0x1000_A000, 0x105);

        dmac.run(10);
        assert!(dmac.channel(ChannelId::Gif).paused);
        assert!(dmac.mfifo_empty_triggered());
        assert!(dmac.status().channel_stat[ChannelId::MfifoEmpty.index()]);
        assert_eq!(dmac.active_channel(), None);
    }

    #[test]
    fn test_stadr_advance_resumes_drain() {
        let mut dmac = create_test_dmac();
        setup_ring(&mut dmac);
        dmac.memory().main().store_quadword(0x4000, tag(7, 1, 0)).unwrap();
        dmac.write32(0x1000_E060, 0x4000);
        dmac.write32(0x1000_A030, 0x4000);
        dmac.write32(0x1000_A000, 0x105);
        dmac.run(10);
        assert!(dmac.channel(ChannelId::Gif).paused);

        dmac.write32(0x1000_E060, 0x4020);
        assert!(!dmac.channel(ChannelId::Gif).paused);
        assert!(!dmac.mfifo_empty_triggered());
        dmac.run(10);
        assert!(!dmac.channel(ChannelId::Gif).is_running());
        assert!(dmac.status().channel_stat[ChannelId::Gif.index()]);
    }

    #[test]
    fn test_stadr_write_at_drain_position_pauses() {
        let mut dmac = create_test_dmac();
        setup_ring(&mut dmac);
        let main = dmac.memory().main().clone();
        main.store_quadword(0x4000, tag(1, 1, 0)).unwrap();
        dmac.write32(0x1000_E060, 0x4800);
        dmac.write32(0x1000_A030, 0x4000);
        dmac.write32(0x1000_A000, 0x105);

        dmac.run(2);
        let gif = dmac.channel(ChannelId::Gif);
        assert_eq!(gif.tag_address, 0x4020);
        assert!(gif.block_done());
        assert_eq!(dmac.active_channel(), Some(ChannelId::Gif));

        dmac.write32(0x1000_E060, 0x4020);
        assert!(dmac.channel(ChannelId::Gif).paused);
        assert_eq!(dmac.active_channel(), None);
    }

    #[test]
    fn test_drain_stalls_on_refs_past_stadr() {
        let mut dmac = create_test_dmac();
        // STD = GIF
        dmac.write32(0x1000_E000, 0x1 | (2 << 6));
        dmac.write32(0x1000_E060, 0x2020);
        let main = dmac.memory().main().clone();
        main.store_quadword(0x1000, tag(4, 4, 0x2000)).unwrap();
        main.store_quadword(0x1010, tag(7, 0, 0)).unwrap();
        dmac.write32(0x1000_A030, 0x1000);
        dmac.write32(0x1000_A000, 0x105);

        dmac.run(10);
        let gif = dmac.channel(ChannelId::Gif);
        assert!(gif.paused);
        assert_eq!(gif.address, 0x2020);
        assert_eq!(gif.quadword_count, 2);
        assert!(dmac.status().channel_stat[ChannelId::Stall.index()]);

        dmac.write32(0x1000_E060, 0x2040);
        assert!(!dmac.channel(ChannelId::Gif).paused);
        dmac.run(10);
        assert!(!dmac.channel(ChannelId::Gif).is_running());
        assert!(dmac.status().channel_stat[ChannelId::Gif.index()]);
    }

    #[test]
    fn test_stall_source_publishes_stadr() {
        let mut dmac = create_test_dmac();
        // STS = SPR_FROM
        dmac.write32(0x1000_E000, 0x1 | (2 << 4));
        dmac.write32(0x1000_D010, 0x3000);
        dmac.write32(0x1000_D020, 3);
        dmac.write32(0x1000_D000, 0x100);

        dmac.run(10);
        assert_eq!(dmac.stadr(), 0x3030);
    }

    #[test]
    fn test_spr_from_fills_ring() {
        let mut dmac = create_test_dmac();
        setup_ring(&mut dmac);
        dmac.write32(0x1000_D010, 0x4FF0);
        dmac.write32(0x1000_D020, 2);
        dmac.write32(0x1000_D000, 0x100);

        dmac.run(10);
        assert_eq!(dmac.channel(ChannelId::SprFrom).address, 0x4010);
        assert_eq!(dmac.stadr(), 0x4010);
    }

    #[test]
    fn test_spr_from_start_outside_ring_lands_in_ring() {
        let mut dmac = create_test_dmac();
        setup_ring(&mut dmac);
        let spr = dmac.memory().scratchpad().clone();
        spr.store_quadword(0x00, 0xAA).unwrap();
        spr.store_quadword(0x10, 0xBB).unwrap();
        dmac.write32(0x1000_D010, 0x1000);
        dmac.write32(0x1000_D020, 2);
        dmac.write32(0x1000_D080, 0);
        dmac.write32(0x1000_D000, 0x100);

        dmac.run(10);
        let main = dmac.memory().main();
        assert_eq!(main.load_quadword(0x1000).unwrap(), 0);
        assert_eq!(main.load_quadword(0x4000).unwrap(), 0xAA);
        assert_eq!(main.load_quadword(0x4010).unwrap(), 0xBB);
        assert_eq!(dmac.channel(ChannelId::SprFrom).address, 0x4020);
        assert_eq!(dmac.stadr(), 0x4020);
    }

    #[test]
    fn test_clearing_stall_role_releases_channel() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_E000, 0x1 | (2 << 6));
        dmac.memory().main().store_quadword(0x1000, tag(4, 1, 0x2000)).unwrap();
        dmac.write32(0x1000_A030, 0x1000);
        dmac.write32(0x1000_A000, 0x105);
        dmac.run(10);
        assert!(dmac.channel(ChannelId::Gif).paused);

        dmac.write32(0x1000_E000, 0x1);
        assert!(!dmac.channel(ChannelId::Gif).paused);
        assert_eq!(dmac.active_channel(), Some(ChannelId::Gif));
    }
}

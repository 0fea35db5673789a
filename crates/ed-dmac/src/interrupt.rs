//! Completion status and the INT1 line

use crate::channel::ChannelId;
use crate::dmac::Dmac;

impl Dmac {
    /// Finish a transfer: raise its D_STAT bit and take it off the bus
    pub(crate) fn transfer_end(&mut self, index: usize) {
        tracing::debug!("{} transfer end", ChannelId::ALL[index]);
        self.interrupt_stat.channel_stat[index] = true;
        self.int1_check();
        self.deactivate_channel(index);
    }

    /// Recompute INT1 as the OR of every unmasked stat bit
    pub(crate) fn int1_check(&mut self) {
        let asserted = self.interrupt_stat.pending();
        if asserted != self.int1_line {
            tracing::debug!("INT1 {}", if asserted { "asserted" } else { "cleared" });
        }
        self.int1_line = asserted;
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
        let mut dmac = Dmac::new(memory, Peers::null());
        dmac.write32(0x1000_E000, 1);
        dmac
    }

    #[test]
    fn test_masked_completion_raises_int1() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_E010, 1 << (16 + 6)); // unmask SIF1
        dmac.write32(0x1000_C420, 1);
        dmac.write32(0x1000_C400, 0x101);
        dmac.run(4);

        assert!(dmac.status().channel_stat[ChannelId::Sif1.index()]);
        assert!(dmac.int1_asserted());

        dmac.write32(0x1000_E010, 1 << 6);
        assert!(!dmac.int1_asserted());
    }

    #[test]
    fn test_unmasked_completion_stays_quiet() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_C420, 1);
        dmac.write32(0x1000_C400, 0x101);
        dmac.run(4);

        assert!(dmac.status().channel_stat[ChannelId::Sif1.index()]);
        assert!(!dmac.int1_asserted());

        // Unmasking a pending bit raises the line
        dmac.write32(0x1000_E010, 1 << (16 + 6));
        assert!(dmac.int1_asserted());
    }

    #[test]
    fn test_int1_tracks_any_unmasked_bit() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_E010, (1 << (16 + 6)) | (1 << (16 + 2)));
        dmac.transfer_end(ChannelId::Sif1.index());
        dmac.transfer_end(ChannelId::Gif.index());
        assert!(dmac.int1_asserted());

        dmac.write32(0x1000_E010, 1 << 6);
        assert!(dmac.int1_asserted());
        dmac.write32(0x1000_E010, 1 << 2);
        assert!(!dmac.int1_asserted());
    }
}

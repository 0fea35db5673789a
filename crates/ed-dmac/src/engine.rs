//! Transfer execution engine
//!
//! One routine per channel kind. Each invocation moves at most one burst,
//! never spends more than the budget it is handed, and returns the cycles
//! it actually used. Zero means the channel could not make progress.

use crate::channel::{ChannelId, ChcrFlags, TransferMode};
use crate::dmac::Dmac;
use ed_memory::{QUADWORD_SIZE, SCRATCHPAD_OFFSET_MASK};

/// Far side of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Far {
    /// A peer subsystem
    Peer,
    /// Scratchpad at SADR
    Scratchpad,
}

/// How a channel finds its next block once the current one is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chaining {
    /// Tags are read from memory at TADR
    Source,
    /// Tags arrive from the far side ahead of each block
    Dest,
    /// The channel has no chain mode
    Unsupported,
}

impl Dmac {
    pub(crate) fn process_vif0(&mut self, budget: u32) -> u32 {
        self.memory_to_far(ChannelId::Vif0.index(), Far::Peer, Chaining::Source, budget)
    }

    pub(crate) fn process_vif1(&mut self, budget: u32) -> u32 {
        let index = ChannelId::Vif1.index();
        if self.channels[index].from_memory() {
            self.memory_to_far(index, Far::Peer, Chaining::Source, budget)
        } else {
            self.far_to_memory(index, Far::Peer, Chaining::Unsupported, budget)
        }
    }

    pub(crate) fn process_gif(&mut self, budget: u32) -> u32 {
        self.memory_to_far(ChannelId::Gif.index(), Far::Peer, Chaining::Source, budget)
    }

    pub(crate) fn process_ipu_from(&mut self, budget: u32) -> u32 {
        self.far_to_memory(ChannelId::IpuFrom.index(), Far::Peer, Chaining::Unsupported, budget)
    }

    pub(crate) fn process_ipu_to(&mut self, budget: u32) -> u32 {
        self.memory_to_far(ChannelId::IpuTo.index(), Far::Peer, Chaining::Source, budget)
    }

    pub(crate) fn process_sif0(&mut self, budget: u32) -> u32 {
        self.far_to_memory(ChannelId::Sif0.index(), Far::Peer, Chaining::Dest, budget)
    }

    pub(crate) fn process_sif1(&mut self, budget: u32) -> u32 {
        self.memory_to_far(ChannelId::Sif1.index(), Far::Peer, Chaining::Source, budget)
    }

    pub(crate) fn process_sif2(&mut self, budget: u32) -> u32 {
        let index = ChannelId::Sif2.index();
        if self.channels[index].from_memory() {
            self.memory_to_far(index, Far::Peer, Chaining::Unsupported, budget)
        } else {
            self.far_to_memory(index, Far::Peer, Chaining::Unsupported, budget)
        }
    }

    pub(crate) fn process_spr_from(&mut self, budget: u32) -> u32 {
        self.far_to_memory(ChannelId::SprFrom.index(), Far::Scratchpad, Chaining::Dest, budget)
    }

    pub(crate) fn process_spr_to(&mut self, budget: u32) -> u32 {
        self.memory_to_far(ChannelId::SprTo.index(), Far::Scratchpad, Chaining::Source, budget)
    }

    /// Hand the bus to the CPU for one slice, then leave
    pub(crate) fn process_cpu_slice(&mut self, budget: u32) -> u32 {
        let cost = self.timing.cpu_slice_cycles.max(1).min(budget);
        self.cycles_since_release = 0;
        tracing::trace!("CPU slice: {} cycles", cost);
        self.deactivate_channel(ChannelId::EeReq.index());
        cost
    }

    /// Memory is the source; the far side consumes
    fn memory_to_far(&mut self, index: usize, far: Far, chaining: Chaining, budget: u32) -> u32 {
        let burst = self.timing.burst_quadwords.max(1);
        let mut cost = 0;
        let mut moved = 0;

        loop {
            if self.active_channel != Some(index) || self.channels[index].paused {
                break;
            }
            if self.channels[index].block_done() && self.channels[index].tag_end {
                self.transfer_end(index);
                break;
            }
            if cost >= budget || moved >= burst {
                break;
            }

            if !self.channels[index].block_done() {
                if self.drain_would_overrun(index) {
                    self.stall_drain(index);
                    break;
                }
                if !self.far_can_accept(index, far) {
                    break;
                }
                let addr = self.channels[index].address;
                let data = self.memory.fetch128(addr);
                self.deliver(index, far, data);
                tracing::trace!("{} read 0x{:08x}", ChannelId::ALL[index], addr);
                self.advance_source_dma(index);
                cost += 1;
                moved += 1;
            } else if chaining == Chaining::Source && self.is_chaining(index) {
                let tte = self.channels[index].flags().contains(ChcrFlags::TTE);
                if tte && !self.far_can_accept(index, far) {
                    break;
                }
                if !self.handle_source_chain(index, far) {
                    break;
                }
                cost += self.timing.tag_fetch_cycles.max(1).min(budget - cost);
            } else {
                self.end_unchained(index);
                break;
            }
        }

        cost
    }

    /// The far side produces; memory is the destination
    fn far_to_memory(&mut self, index: usize, far: Far, chaining: Chaining, budget: u32) -> u32 {
        let burst = self.timing.burst_quadwords.max(1);
        let mut cost = 0;
        let mut moved = 0;

        loop {
            if self.active_channel != Some(index) || self.channels[index].paused {
                break;
            }
            if self.channels[index].block_done() && self.channels[index].tag_end {
                self.transfer_end(index);
                break;
            }
            if cost >= budget || moved >= burst {
                break;
            }

            if !self.channels[index].block_done() {
                if !self.far_can_supply(index, far) {
                    break;
                }
                let data = self.pull(index, far);
                if index == ChannelId::SprFrom.index() && self.control.mfifo_drain().is_some() {
                    let wrapped = self.ring_wrap(self.channels[index].address);
                    self.channels[index].address = wrapped;
                }
                let addr = self.channels[index].address;
                self.memory.store128(addr, data);
                tracing::trace!("{} wrote 0x{:08x}", ChannelId::ALL[index], addr);
                self.advance_dest_dma(index);
                cost += 1;
                moved += 1;
            } else if chaining == Chaining::Dest && self.is_chaining(index) {
                if !self.far_can_supply(index, far) {
                    break;
                }
                let tag = self.pull(index, far);
                self.handle_dest_chain(index, tag);
                cost += self.timing.tag_fetch_cycles.max(1).min(budget - cost);
            } else {
                self.end_unchained(index);
                break;
            }
        }

        cost
    }

    fn is_chaining(&self, index: usize) -> bool {
        self.channels[index].mode() == TransferMode::Chain
    }

    /// A chain-mode start on a channel that cannot chain ends after its block
    fn end_unchained(&mut self, index: usize) {
        if self.is_chaining(index) {
            tracing::debug!(
                "{} has no chain mode, ending after current block",
                ChannelId::ALL[index]
            );
        }
        self.transfer_end(index);
    }

    fn far_can_accept(&self, index: usize, far: Far) -> bool {
        match far {
            Far::Peer => self.peers.can_accept(index),
            Far::Scratchpad => true,
        }
    }

    fn far_can_supply(&self, index: usize, far: Far) -> bool {
        match far {
            Far::Peer => self.peers.can_supply(index),
            Far::Scratchpad => true,
        }
    }

    /// Hand one data quadword to the far side
    pub(crate) fn deliver(&mut self, index: usize, far: Far, data: u128) {
        match far {
            Far::Peer => self.peers.push(index, data),
            Far::Scratchpad => {
                let sadr = self.channels[index].scratchpad_address;
                self.memory.store_scratchpad(sadr, data);
                self.advance_scratchpad(index);
            }
        }
    }

    /// Hand a tag quadword to the far side (CHCR.TTE)
    pub(crate) fn deliver_tag(&mut self, index: usize, far: Far, tag: u128) {
        match far {
            Far::Peer => self.peers.push_tag(index, tag),
            Far::Scratchpad => self.deliver(index, far, tag),
        }
    }

    /// Take one quadword from the far side
    fn pull(&mut self, index: usize, far: Far) -> u128 {
        match far {
            Far::Peer => self.peers.pull(index),
            Far::Scratchpad => {
                let data = self
                    .memory
                    .fetch_scratchpad(self.channels[index].scratchpad_address);
                self.advance_scratchpad(index);
                data
            }
        }
    }

    fn advance_scratchpad(&mut self, index: usize) {
        let chan = &mut self.channels[index];
        chan.scratchpad_address =
            chan.scratchpad_address.wrapping_add(QUADWORD_SIZE) & SCRATCHPAD_OFFSET_MASK;
    }

    /// Step past one quadword read from memory
    pub(crate) fn advance_source_dma(&mut self, index: usize) {
        let chan = &mut self.channels[index];
        chan.address = chan.address.wrapping_add(QUADWORD_SIZE);
        chan.quadword_count -= 1;

        self.interleave_step(index);

        if self.data_in_ring(index) {
            let wrapped = self.ring_wrap(self.channels[index].address);
            self.channels[index].address = wrapped;
        }
    }

    /// Step past one quadword written to memory
    pub(crate) fn advance_dest_dma(&mut self, index: usize) {
        let chan = &mut self.channels[index];
        chan.address = chan.address.wrapping_add(QUADWORD_SIZE);
        chan.quadword_count -= 1;

        self.interleave_step(index);

        if index == ChannelId::SprFrom.index() && self.control.mfifo_drain().is_some() {
            let wrapped = self.ring_wrap(self.channels[index].address);
            self.channels[index].address = wrapped;
            self.update_stadr(wrapped);
        } else if self.publishes_stadr(index) {
            let addr = self.channels[index].address;
            self.update_stadr(addr);
        }
    }

    /// Skip SQWC quadwords after every TQWC moved in interleave mode.
    /// Only the scratchpad channels interleave.
    fn interleave_step(&mut self, index: usize) {
        let sqwc = self.sqwc;
        let chan = &mut self.channels[index];
        if !chan.id().is_scratchpad()
            || chan.mode() != TransferMode::Interleave
            || sqwc.transfer_qwc == 0
        {
            return;
        }

        // D_SQWC may have been written after STR rose
        if chan.interleaved_qwc == 0 {
            chan.interleaved_qwc = sqwc.transfer_qwc;
        }
        chan.interleaved_qwc -= 1;
        if chan.interleaved_qwc == 0 {
            chan.address = chan
                .address
                .wrapping_add(sqwc.skip_qwc as u32 * QUADWORD_SIZE);
            chan.interleaved_qwc = sqwc.transfer_qwc;
        }
    }
}

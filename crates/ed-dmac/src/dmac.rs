//! DMA controller
//!
//! Owns the channel table, the ready queues and the global registers. The
//! host drives it with [`Dmac::run`] once per emulation quantum and pokes
//! registers in between; both paths mutate the same state, so a host that
//! runs the wider emulator on several threads must serialise them.

use crate::channel::{
    Channel, ChannelId, Routine, TransferMode, NUM_CHANNELS, PRIORITY_CPU_BASELINE,
    PRIORITY_CPU_STEALING,
};
use crate::peer::Peers;
use crate::regs::{DCtrl, DSqwc, DStat, ENABLE_RESET_VALUE, ENABLE_SUSPEND, PCR_CDE_SHIFT, PCR_PCE};
use crate::scheduler::PriorityQueues;
use crate::tag::SourceTagId;
use ed_core::config::TimingConfig;
use ed_memory::DmaMemory;

pub(crate) const EE_REQ: usize = ChannelId::EeReq as usize;

/// The DMA controller
pub struct Dmac {
    /// Memory capability, rebound on reset
    pub(crate) memory: DmaMemory,
    /// Subsystems on the far side of the channels
    pub(crate) peers: Peers,
    /// Cycle costs
    pub(crate) timing: TimingConfig,

    pub(crate) channels: [Channel; NUM_CHANNELS],
    /// Channel currently holding the bus
    pub(crate) active_channel: Option<usize>,
    pub(crate) queues: PriorityQueues,

    pub(crate) control: DCtrl,
    pub(crate) interrupt_stat: DStat,
    pub(crate) pcr: u32,
    pub(crate) sqwc: DSqwc,
    pub(crate) rbor: u32,
    pub(crate) rbsr: u32,
    pub(crate) stadr: u32,
    pub(crate) mfifo_empty_triggered: bool,
    /// Budget left in the current (or last) run call
    pub(crate) cycles_to_run: u32,
    /// DMA bus cycles since the CPU last got a slice
    pub(crate) cycles_since_release: u32,
    /// D_ENABLE
    pub(crate) master_disable: u32,
    /// INT1 output
    pub(crate) int1_line: bool,

    /// Channels that could not make progress during the current run call
    pub(crate) parked: u16,
}

impl Dmac {
    /// Create a controller in its power-on state
    pub fn new(memory: DmaMemory, peers: Peers) -> Self {
        Self::with_timing(memory, peers, TimingConfig::default())
    }

    /// Create a controller with explicit bus timing
    pub fn with_timing(memory: DmaMemory, peers: Peers, timing: TimingConfig) -> Self {
        Self {
            memory,
            peers,
            timing,
            channels: std::array::from_fn(|i| Channel::new(ChannelId::ALL[i])),
            active_channel: None,
            queues: PriorityQueues::new(),
            control: DCtrl::default(),
            interrupt_stat: DStat::default(),
            pcr: 0,
            sqwc: DSqwc::default(),
            rbor: 0,
            rbsr: 0,
            stadr: 0,
            mfifo_empty_triggered: false,
            cycles_to_run: 0,
            cycles_since_release: 0,
            master_disable: ENABLE_RESET_VALUE,
            int1_line: false,
            parked: 0,
        }
    }

    /// Return to power-on defaults and rebind the memory capability
    pub fn reset(&mut self, memory: DmaMemory) {
        let peers = std::mem::take(&mut self.peers);
        *self = Self::with_timing(memory, peers, self.timing);
        tracing::debug!("DMAC reset");
    }

    /// Replace the peer table
    pub fn set_peers(&mut self, peers: Peers) {
        self.peers = peers;
    }

    /// Run the controller for up to `cycles` bus cycles
    pub fn run(&mut self, cycles: u32) {
        if cycles == 0 || !self.is_enabled() {
            return;
        }

        self.cycles_to_run = cycles;
        self.parked = 0;
        self.arbitrate();

        while self.cycles_to_run > 0 {
            let Some(index) = self.active_channel else {
                break;
            };

            let budget = self.cycles_to_run;
            let cost = self.execute(index, budget).min(budget);
            self.cycles_to_run -= cost;

            if index != EE_REQ {
                self.count_bus_cycles(cost);
            }

            if cost == 0 && self.active_channel == Some(index) {
                // Blocked on its peer: give the bus to the next ready channel
                self.active_channel = None;
                if self.is_admissible(index) {
                    self.parked |= 1 << index;
                    self.queues.push(index, self.channels[index].priority);
                }
                tracing::trace!("{} parked until next run", ChannelId::ALL[index]);
            }

            self.arbitrate();
        }

        self.parked = 0;
    }

    /// Start a channel as if software had raised CHCR.STR
    pub fn start_dma(&mut self, id: ChannelId) {
        if !id.is_transfer_channel() {
            return;
        }
        self.channels[id.index()].set_running(true);
        self.start(id.index());
    }

    /// Assert the request line of `id`
    pub fn set_dma_request(&mut self, id: ChannelId) {
        let index = id.index();
        self.channels[index].dma_req = true;
        self.check_for_activation(index);
    }

    /// Deassert the request line of `id`. The channel keeps its registers
    /// and resumes when the line comes back. Scratchpad channels have no
    /// line to drop.
    pub fn clear_dma_request(&mut self, id: ChannelId) {
        if !id.needs_request_line() {
            return;
        }
        let index = id.index();
        self.channels[index].dma_req = false;
        self.unqueue(index);
    }

    /// Latch the start state of a channel whose STR just rose
    pub(crate) fn start(&mut self, index: usize) {
        let transfer_qwc = self.sqwc.transfer_qwc;
        let chan = &mut self.channels[index];
        let mode = chan.mode();

        chan.tag_end = mode != TransferMode::Chain;
        chan.can_stall_drain = false;
        if mode == TransferMode::Chain && chan.quadword_count > 0 {
            // Finish the block left by the previous tag before fetching more
            let id = SourceTagId::from_bits((chan.control >> 28) as u8);
            chan.tag_end = matches!(id, SourceTagId::Refe | SourceTagId::End);
            chan.can_stall_drain = id == SourceTagId::Refs;
        }
        chan.interleaved_qwc = transfer_qwc;
        chan.started = true;
        chan.paused = false;

        tracing::debug!(
            "Starting {} DMA: CHCR=0x{:08x} MADR=0x{:08x} QWC={} TADR=0x{:08x}",
            chan.id(),
            chan.control,
            chan.address,
            chan.quadword_count,
            chan.tag_address
        );

        self.check_for_activation(index);
    }

    /// Whether `index` may sit in a ready queue
    pub(crate) fn is_admissible(&self, index: usize) -> bool {
        let chan = &self.channels[index];
        chan.id().is_transfer_channel()
            && self.control.master_enable
            && chan.is_running()
            && !chan.paused
            && chan.dma_req
            && self.pcr_allows(index)
    }

    fn pcr_allows(&self, index: usize) -> bool {
        self.pcr & PCR_PCE == 0 || self.pcr & (1 << (PCR_CDE_SHIFT + index as u32)) != 0
    }

    /// Admit a channel to its ready queue if everything it needs is in place
    pub(crate) fn check_for_activation(&mut self, index: usize) {
        if !self.is_admissible(index)
            || self.active_channel == Some(index)
            || self.queues.contains(index)
        {
            return;
        }

        let priority = self.channels[index].priority;
        self.queues.push(index, priority);
        tracing::debug!("{} ready on tier {}", ChannelId::ALL[index], priority);
        self.arbitrate();
    }

    /// Stop a channel: clear STR, drop it from the queues and release the bus
    pub(crate) fn deactivate_channel(&mut self, index: usize) {
        let chan = &mut self.channels[index];
        chan.started = false;
        chan.set_running(false);
        tracing::debug!("{} deactivated", chan.id());
        self.unqueue(index);
    }

    /// Take a channel off the bus and out of the queues without touching its registers
    pub(crate) fn unqueue(&mut self, index: usize) {
        self.queues.remove(index);
        if self.active_channel == Some(index) {
            self.active_channel = None;
        }
        self.arbitrate();
    }

    /// Hold a channel until STADR moves
    pub(crate) fn pause_channel(&mut self, index: usize) {
        self.channels[index].paused = true;
        self.queues.remove(index);
        if self.active_channel == Some(index) {
            self.active_channel = None;
        }
        tracing::debug!("{} paused", ChannelId::ALL[index]);
    }

    /// Re-check every channel after a controller-wide change
    pub(crate) fn refresh_admission(&mut self) {
        if let Some(active) = self.active_channel {
            if active != EE_REQ && !self.is_admissible(active) {
                self.active_channel = None;
            }
        }
        for index in 0..NUM_CHANNELS {
            if index == EE_REQ {
                continue;
            }
            if self.queues.contains(index) && !self.is_admissible(index) {
                self.queues.remove(index);
            } else {
                self.check_for_activation(index);
            }
        }
        self.arbitrate();
    }

    /// Pick the channel that owns the bus.
    ///
    /// A queued channel on a strictly higher tier preempts the active one,
    /// which goes back to the tail of its own tier. Costs no cycles.
    pub(crate) fn arbitrate(&mut self) {
        let Some((best, tier)) = self.queues.peek_best(self.parked) else {
            return;
        };

        match self.active_channel {
            Some(active) if tier >= self.channels[active].priority => {}
            Some(active) => {
                self.queues.remove(best);
                self.queues.push(active, self.channels[active].priority);
                self.active_channel = Some(best);
                tracing::debug!(
                    "{} preempts {}",
                    ChannelId::ALL[best],
                    ChannelId::ALL[active]
                );
            }
            None => {
                self.queues.remove(best);
                self.active_channel = Some(best);
                tracing::trace!("{} granted the bus", ChannelId::ALL[best]);
            }
        }
    }

    /// Cycle-stealing bookkeeping: queue the CPU slice once the DMA has held
    /// the bus for a release period
    fn count_bus_cycles(&mut self, cost: u32) {
        if !self.control.cycle_stealing {
            return;
        }
        self.cycles_since_release = self.cycles_since_release.saturating_add(cost);
        if self.cycles_since_release >= self.control.release_period()
            && self.active_channel != Some(EE_REQ)
        {
            self.channels[EE_REQ].started = true;
            self.queues.push(EE_REQ, PRIORITY_CPU_STEALING);
        }
    }

    /// Move the CPU slot between tier 0 and 4 after RELE changes
    pub(crate) fn update_cpu_tier(&mut self) {
        let stealing = self.control.cycle_stealing;
        self.channels[EE_REQ].priority = if stealing {
            PRIORITY_CPU_STEALING
        } else {
            PRIORITY_CPU_BASELINE
        };
        self.cycles_since_release = 0;

        if !stealing {
            self.channels[EE_REQ].started = false;
            self.queues.remove(EE_REQ);
            if self.active_channel == Some(EE_REQ) {
                self.active_channel = None;
            }
        }
        tracing::debug!("Cycle stealing {}", if stealing { "on" } else { "off" });
        self.arbitrate();
    }

    /// Dispatch to the routine bound to `index`
    fn execute(&mut self, index: usize, budget: u32) -> u32 {
        match self.channels[index].routine {
            Routine::Vif0 => self.process_vif0(budget),
            Routine::Vif1 => self.process_vif1(budget),
            Routine::Gif => self.process_gif(budget),
            Routine::IpuFrom => self.process_ipu_from(budget),
            Routine::IpuTo => self.process_ipu_to(budget),
            Routine::Sif0 => self.process_sif0(budget),
            Routine::Sif1 => self.process_sif1(budget),
            Routine::Sif2 => self.process_sif2(budget),
            Routine::SprFrom => self.process_spr_from(budget),
            Routine::SprTo => self.process_spr_to(budget),
            Routine::CpuSlice => self.process_cpu_slice(budget),
            Routine::Idle => {
                self.deactivate_channel(index);
                0
            }
        }
    }

    /// D_CTRL.DMAE set and D_ENABLE not suspending
    pub fn is_enabled(&self) -> bool {
        self.control.master_enable && self.master_disable & ENABLE_SUSPEND == 0
    }

    /// Channel state for `id`
    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    /// Whole channel table
    pub fn channels(&self) -> &[Channel; NUM_CHANNELS] {
        &self.channels
    }

    /// Channel currently holding the bus
    pub fn active_channel(&self) -> Option<ChannelId> {
        self.active_channel.map(|index| ChannelId::ALL[index])
    }

    /// Ready queues
    pub fn queues(&self) -> &PriorityQueues {
        &self.queues
    }

    /// INT1 output level
    pub fn int1_asserted(&self) -> bool {
        self.int1_line
    }

    /// D_CTRL
    pub fn control(&self) -> &DCtrl {
        &self.control
    }

    /// D_STAT
    pub fn status(&self) -> &DStat {
        &self.interrupt_stat
    }

    /// D_STADR
    pub fn stadr(&self) -> u32 {
        self.stadr
    }

    /// Whether the MFIFO empty condition is latched
    pub fn mfifo_empty_triggered(&self) -> bool {
        self.mfifo_empty_triggered
    }

    /// Cycles the last run call left unused
    pub fn cycles_left(&self) -> u32 {
        self.cycles_to_run
    }

    /// Memory capability
    pub fn memory(&self) -> &DmaMemory {
        &self.memory
    }
}

impl std::fmt::Debug for Dmac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dmac")
            .field("active_channel", &self.active_channel())
            .field("queued", &self.queues.len())
            .field("control", &self.control)
            .field("int1", &self.int1_line)
            .finish()
    }
}

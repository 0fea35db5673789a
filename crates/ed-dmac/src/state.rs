//! Save-state capture and restore
//!
//! The snapshot carries every mutable field, queue order included, so a
//! restored controller resumes with the same tie-breaks. Restore still
//! re-derives queue membership from the channel flags: a queue entry whose
//! channel is no longer admissible is dropped, and an admissible channel
//! missing from the queues is appended to its tier.

use crate::channel::{
    Channel, ChannelId, NUM_CHANNELS, PRIORITY_CPU_BASELINE, PRIORITY_CPU_STEALING, ROUTINES,
};
use crate::dmac::{Dmac, EE_REQ};
use crate::regs::{DCtrl, DSqwc, DStat};
use crate::scheduler::DMAC_PRIORITIES;
use ed_core::{Result, StateError};
use serde::{Deserialize, Serialize};

/// Serializable controller snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmacState {
    pub channels: Vec<Channel>,
    pub active_channel: Option<usize>,
    pub queues: [Vec<usize>; DMAC_PRIORITIES],
    pub control: DCtrl,
    pub interrupt_stat: DStat,
    pub pcr: u32,
    pub sqwc: DSqwc,
    pub rbor: u32,
    pub rbsr: u32,
    pub stadr: u32,
    pub mfifo_empty_triggered: bool,
    pub cycles_to_run: u32,
    pub cycles_since_release: u32,
    pub master_disable: u32,
    pub int1_line: bool,
}

impl Dmac {
    /// Capture the controller state
    pub fn save_state(&self) -> DmacState {
        DmacState {
            channels: self.channels.to_vec(),
            active_channel: self.active_channel,
            queues: self.queues.snapshot(),
            control: self.control,
            interrupt_stat: self.interrupt_stat,
            pcr: self.pcr,
            sqwc: self.sqwc,
            rbor: self.rbor,
            rbsr: self.rbsr,
            stadr: self.stadr,
            mfifo_empty_triggered: self.mfifo_empty_triggered,
            cycles_to_run: self.cycles_to_run,
            cycles_since_release: self.cycles_since_release,
            master_disable: self.master_disable,
            int1_line: self.int1_line,
        }
    }

    /// Restore a snapshot taken by [`Dmac::save_state`].
    ///
    /// The controller is left untouched if the snapshot is malformed.
    pub fn load_state(&mut self, state: &DmacState) -> Result<()> {
        if state.channels.len() != NUM_CHANNELS {
            return Err(StateError::ChannelCount {
                expected: NUM_CHANNELS,
                found: state.channels.len(),
            }
            .into());
        }
        let referenced = state
            .active_channel
            .iter()
            .chain(state.queues.iter().flatten());
        for &index in referenced {
            if index >= NUM_CHANNELS {
                return Err(StateError::InvalidChannel(index).into());
            }
        }

        for (index, (slot, saved)) in self.channels.iter_mut().zip(&state.channels).enumerate() {
            *slot = saved.clone();
            slot.index = index;
            slot.routine = ROUTINES[index];
        }

        self.control = state.control;
        self.interrupt_stat = state.interrupt_stat;
        self.pcr = state.pcr;
        self.sqwc = state.sqwc;
        self.rbor = state.rbor;
        self.rbsr = state.rbsr;
        self.stadr = state.stadr;
        self.mfifo_empty_triggered = state.mfifo_empty_triggered;
        self.cycles_to_run = state.cycles_to_run;
        self.cycles_since_release = state.cycles_since_release;
        self.master_disable = state.master_disable;
        self.parked = 0;

        for (index, chan) in self.channels.iter_mut().enumerate() {
            chan.priority = if index == EE_REQ {
                if state.control.cycle_stealing {
                    PRIORITY_CPU_STEALING
                } else {
                    PRIORITY_CPU_BASELINE
                }
            } else {
                ChannelId::ALL[index].base_priority()
            };
        }

        self.active_channel = state
            .active_channel
            .filter(|&index| self.may_hold_bus(index));

        self.queues.clear();
        for &index in state.queues.iter().flatten() {
            if Some(index) != self.active_channel && self.may_hold_bus(index) {
                self.queues.push(index, self.channels[index].priority);
            }
        }
        for index in 0..NUM_CHANNELS {
            if index != EE_REQ
                && Some(index) != self.active_channel
                && self.is_admissible(index)
            {
                self.queues.push(index, self.channels[index].priority);
            }
        }

        self.int1_check();
        tracing::debug!(
            "Restored DMAC state: active={:?}, {} queued",
            self.active_channel(),
            self.queues.len()
        );
        Ok(())
    }

    /// Admissible transfer channel, or the CPU slice while cycle stealing
    fn may_hold_bus(&self, index: usize) -> bool {
        if index == EE_REQ {
            self.control.cycle_stealing
        } else {
            self.is_admissible(index)
        }
    }

    /// Snapshot as JSON
    pub fn save_state_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.save_state())?)
    }

    /// Restore from JSON produced by [`Dmac::save_state_json`]
    pub fn load_state_json(&mut self, json: &str) -> Result<()> {
        let state: DmacState = serde_json::from_str(json)?;
        self.load_state(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::Peers;
    use ed_core::DmacError;
    use ed_memory::DmaMemory;

    fn create_test_dmac() -> Dmac {
        let memory = DmaMemory::with_sizes(0x10000, 0x4000).unwrap();
        let mut dmac = Dmac::new(memory, Peers::null());
        dmac.write32(0x1000_E000, 1);
        dmac
    }

    #[test]
    fn test_roundtrip_preserves_queue_order() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_A020, 8);
        dmac.write32(0x1000_A000, 0x101);
        dmac.write32(0x1000_C420, 8);
        dmac.write32(0x1000_C400, 0x101);
        dmac.write32(0x1000_9020, 8);
        dmac.write32(0x1000_9000, 0x101);
        dmac.run(3);

        let json = dmac.save_state_json().unwrap();
        let mut restored = create_test_dmac();
        restored.load_state_json(&json).unwrap();

        assert_eq!(restored.save_state(), dmac.save_state());
        assert_eq!(restored.active_channel(), Some(ChannelId::Gif));
        assert_eq!(
            restored.queues().tier(3).collect::<Vec<_>>(),
            vec![ChannelId::Sif1.index(), ChannelId::Vif1.index()]
        );

        dmac.run(20);
        restored.run(20);
        assert_eq!(restored.save_state(), dmac.save_state());
    }

    #[test]
    fn test_restore_rebuilds_membership_from_flags() {
        let mut dmac = create_test_dmac();
        dmac.write32(0x1000_C420, 8);
        dmac.write32(0x1000_C400, 0x101);
        let mut state = dmac.save_state();

        // Queue lists a stopped channel and forgets a running one
        state.active_channel = None;
        state.queues[3] = vec![ChannelId::Gif.index()];
        state.channels[ChannelId::Sif2.index()].control = 0x101;

        let mut restored = create_test_dmac();
        restored.load_state(&state).unwrap();
        assert_eq!(restored.queues().tier_of(ChannelId::Gif.index()), None);
        assert_eq!(restored.queues().tier_of(ChannelId::Sif1.index()), Some(3));
        assert_eq!(restored.queues().tier_of(ChannelId::Sif2.index()), Some(2));
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let mut dmac = create_test_dmac();
        let mut state = dmac.save_state();
        state.channels.truncate(3);
        let err = dmac.load_state(&state).unwrap_err();
        assert!(matches!(
            err,
            DmacError::State(StateError::ChannelCount { expected: 15, found: 3 })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_queue_entry() {
        let mut dmac = create_test_dmac();
        let mut state = dmac.save_state();
        state.queues[0] = vec![42];
        let err = dmac.load_state(&state).unwrap_err();
        assert!(matches!(err, DmacError::State(StateError::InvalidChannel(42))));
    }

    #[test]
    fn test_bad_json() {
        let mut dmac = create_test_dmac();
        assert!(matches!(
            dmac.load_state_json("{ not json"),
            Err(DmacError::Json(_))
        ));
    }
}

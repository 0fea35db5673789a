//! Priority queues feeding the bus arbiter
//!
//! Five tiers, 0 highest. Tier 0 and 4 bracket the DMA channels with the
//! CPU's own bus slice (cycle stealing on and off respectively). Within a
//! tier, channels are served in arrival order. Queues hold slot indices
//! only; the channel table owns the channel state.

use crate::channel::NUM_CHANNELS;
use std::collections::VecDeque;

/// Number of priority tiers
pub const DMAC_PRIORITIES: usize = 5;

/// Ready queues, one per tier
#[derive(Debug, Clone, Default)]
pub struct PriorityQueues {
    queues: [VecDeque<usize>; DMAC_PRIORITIES],
    /// Tier each slot is queued on, if any
    membership: [Option<usize>; NUM_CHANNELS],
    queued_chan_count: usize,
}

impl PriorityQueues {
    /// Create empty queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `index` to the tail of `tier`. A slot that is already queued
    /// stays where it is.
    pub fn push(&mut self, index: usize, tier: usize) -> bool {
        if self.membership[index].is_some() {
            return false;
        }
        let tier = tier.min(DMAC_PRIORITIES - 1);
        self.queues[tier].push_back(index);
        self.membership[index] = Some(tier);
        self.queued_chan_count += 1;
        true
    }

    /// Remove `index` from whichever tier holds it
    pub fn remove(&mut self, index: usize) -> bool {
        let Some(tier) = self.membership[index].take() else {
            return false;
        };
        if let Some(pos) = self.queues[tier].iter().position(|&i| i == index) {
            self.queues[tier].remove(pos);
        }
        self.queued_chan_count -= 1;
        true
    }

    /// Tier holding `index`
    pub fn tier_of(&self, index: usize) -> Option<usize> {
        self.membership[index]
    }

    /// Whether `index` is waiting in any tier
    pub fn contains(&self, index: usize) -> bool {
        self.membership[index].is_some()
    }

    /// First queued slot, highest tier first, skipping slots in `excluded`
    /// (a bitmask over slot indices)
    pub fn peek_best(&self, excluded: u16) -> Option<(usize, usize)> {
        self.queues.iter().enumerate().find_map(|(tier, queue)| {
            queue
                .iter()
                .copied()
                .find(|&index| excluded & (1 << index) == 0)
                .map(|index| (index, tier))
        })
    }

    /// Number of queued slots
    pub fn len(&self) -> usize {
        self.queued_chan_count
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queued_chan_count == 0
    }

    /// Slots queued on `tier`, in service order
    pub fn tier(&self, tier: usize) -> impl Iterator<Item = usize> + '_ {
        self.queues[tier].iter().copied()
    }

    /// Snapshot of every tier, in service order
    pub fn snapshot(&self) -> [Vec<usize>; DMAC_PRIORITIES] {
        std::array::from_fn(|tier| self.queues[tier].iter().copied().collect())
    }

    /// Drop everything
    pub fn clear(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
        self.membership = [None; NUM_CHANNELS];
        self.queued_chan_count = 0;
    }
}

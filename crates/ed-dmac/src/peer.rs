//! Peer-facing side of the transfer engine
//!
//! Every subsystem the DMAC feeds or drains (vector interfaces, graphics
//! interface, image unit, mailbox links) exchanges one quadword at a time
//! and reports whether it is ready before the engine spends a cycle on it.

use crate::channel::{ChannelId, NUM_CHANNELS};
use parking_lot::Mutex;
use std::sync::Arc;

/// A subsystem on the far side of one or more channels
///
/// The channel id is passed so a single peer (the image unit, the mailbox
/// transport) can serve several channels.
pub trait DmaPeer {
    /// Room for one more quadword
    fn can_accept(&self, _channel: ChannelId) -> bool {
        false
    }

    /// Consume one quadword. Only called after `can_accept` returned true.
    fn push_quadword(&mut self, _channel: ChannelId, _data: u128) {}

    /// Receive a tag quadword when the channel transfers tags (CHCR.TTE)
    fn push_tag(&mut self, _channel: ChannelId, _tag: u128) {}

    /// One quadword is available
    fn can_supply(&self, _channel: ChannelId) -> bool {
        false
    }

    /// Produce one quadword. Only called after `can_supply` returned true.
    fn pull_quadword(&mut self, _channel: ChannelId) -> u128 {
        0
    }
}

/// Shared handle to a peer
pub type PeerHandle = Arc<Mutex<dyn DmaPeer + Send>>;

/// Peer that swallows everything it is given and never produces data
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPeer;

impl DmaPeer for NullPeer {
    fn can_accept(&self, _channel: ChannelId) -> bool {
        true
    }
}

/// Peer attached to each channel slot
#[derive(Clone, Default)]
pub struct Peers {
    slots: [Option<PeerHandle>; NUM_CHANNELS],
}

impl Peers {
    /// No peers attached; peer-facing channels never become ready
    pub fn new() -> Self {
        Self::default()
    }

    /// A [`NullPeer`] behind every transfer channel
    pub fn null() -> Self {
        let null: PeerHandle = Arc::new(Mutex::new(NullPeer));
        let mut peers = Self::new();
        for id in ChannelId::ALL.iter().filter(|id| id.is_transfer_channel()) {
            peers.attach(*id, null.clone());
        }
        peers
    }

    /// Attach `peer` to `channel`, replacing whatever was there
    pub fn attach(&mut self, channel: ChannelId, peer: PeerHandle) {
        self.slots[channel.index()] = Some(peer);
    }

    /// Builder form of [`Peers::attach`]
    pub fn with(mut self, channel: ChannelId, peer: PeerHandle) -> Self {
        self.attach(channel, peer);
        self
    }

    /// Peer behind `index`, if any
    pub(crate) fn get(&self, index: usize) -> Option<&PeerHandle> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Whether the peer behind `index` can take a quadword
    pub(crate) fn can_accept(&self, index: usize) -> bool {
        let id = ChannelId::ALL[index];
        self.get(index).is_some_and(|peer| peer.lock().can_accept(id))
    }

    /// Whether the peer behind `index` has a quadword
    pub(crate) fn can_supply(&self, index: usize) -> bool {
        let id = ChannelId::ALL[index];
        self.get(index).is_some_and(|peer| peer.lock().can_supply(id))
    }

    pub(crate) fn push(&self, index: usize, data: u128) {
        if let Some(peer) = self.get(index) {
            peer.lock().push_quadword(ChannelId::ALL[index], data);
        }
    }

    pub(crate) fn push_tag(&self, index: usize, tag: u128) {
        if let Some(peer) = self.get(index) {
            peer.lock().push_tag(ChannelId::ALL[index], tag);
        }
    }

    pub(crate) fn pull(&self, index: usize) -> u128 {
        self.get(index)
            .map(|peer| peer.lock().pull_quadword(ChannelId::ALL[index]))
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for Peers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attached: Vec<&str> = ChannelId::ALL
            .iter()
            .filter(|id| self.slots[id.index()].is_some())
            .map(|id| id.name())
            .collect();
        f.debug_struct("Peers").field("attached", &attached).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Fifo {
        data: VecDeque<u128>,
        capacity: usize,
    }

    impl DmaPeer for Fifo {
        fn can_accept(&self, _channel: ChannelId) -> bool {
            self.data.len() < self.capacity
        }

        fn push_quadword(&mut self, _channel: ChannelId, data: u128) {
            self.data.push_back(data);
        }

        fn can_supply(&self, _channel: ChannelId) -> bool {
            !self.data.is_empty()
        }

        fn pull_quadword(&mut self, _channel: ChannelId) -> u128 {
            self.data.pop_front().unwrap_or(0)
        }
    }

    #[test]
    fn test_missing_peer_is_never_ready() {
        let peers = Peers::new();
        assert!(!peers.can_accept(ChannelId::Gif.index()));
        assert!(!peers.can_supply(ChannelId::Sif0.index()));
        assert_eq!(peers.pull(ChannelId::Sif0.index()), 0);
    }

    #[test]
    fn test_null_peers() {
        let peers = Peers::null();
        assert!(peers.can_accept(ChannelId::Vif0.index()));
        assert!(!peers.can_supply(ChannelId::Vif0.index()));
        assert!(peers.get(ChannelId::EeReq.index()).is_none());
    }

    #[test]
    fn test_shared_peer_across_channels() {
        let fifo = Arc::new(Mutex::new(Fifo {
            data: VecDeque::new(),
            capacity: 1,
        }));
        let peers = Peers::new()
            .with(ChannelId::IpuTo, fifo.clone())
            .with(ChannelId::IpuFrom, fifo.clone());

        assert!(peers.can_accept(ChannelId::IpuTo.index()));
        peers.push(ChannelId::IpuTo.index(), 42);
        assert!(!peers.can_accept(ChannelId::IpuTo.index()));
        assert!(peers.can_supply(ChannelId::IpuFrom.index()));
        assert_eq!(peers.pull(ChannelId::IpuFrom.index()), 42);
        assert!(fifo.lock().data.is_empty());
    }
}

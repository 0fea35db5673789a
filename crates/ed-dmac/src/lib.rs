//! Emotion Engine DMA controller emulation for eedmac
//!
//! The DMAC multiplexes fifteen channel slots over one bus:
//! - ten transfer channels (VIF0/1, GIF, IPU in/out, SIF0/1/2, scratchpad in/out)
//! - a CPU slot used by cycle stealing
//! - D_STAT-only slots for the stall and MFIFO-empty interrupts
//!
//! Transfers follow tag chains in memory, can be held back by stall control
//! or an empty MFIFO ring, and raise INT1 on completion.

pub mod channel;
pub mod dmac;
mod engine;
mod interrupt;
mod mfifo;
pub mod peer;
mod registers;
pub mod regs;
pub mod scheduler;
pub mod state;
pub mod tag;

pub use channel::{Channel, ChannelId, ChcrFlags, Routine, TransferMode, NUM_CHANNELS};
pub use dmac::Dmac;
pub use peer::{DmaPeer, NullPeer, PeerHandle, Peers};
pub use regs::{DCtrl, DSqwc, DStat, Register};
pub use scheduler::{PriorityQueues, DMAC_PRIORITIES};
pub use state::DmacState;
pub use tag::{DestTagId, DmaTag, SourceTagId};

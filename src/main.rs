//! eedmac - Emotion Engine DMA controller emulator
//!
//! Smoke runner: loads the configuration, builds a controller over fresh
//! memory images, pushes a short GIF tag chain through it and prints the
//! resulting controller state as JSON.
//!
//! Usage: `eedmac [config.toml]`

use anyhow::Context;
use ed_core::Config;
use ed_dmac::{ChannelId, DmaPeer, Dmac, Peers};
use ed_memory::DmaMemory;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Graphics interface stand-in that counts what it is fed
#[derive(Debug, Default)]
struct GifSink {
    quadwords: usize,
    tags: usize,
}

impl DmaPeer for GifSink {
    fn can_accept(&self, _channel: ChannelId) -> bool {
        true
    }

    fn push_quadword(&mut self, _channel: ChannelId, _data: u128) {
        self.quadwords += 1;
    }

    fn push_tag(&mut self, _channel: ChannelId, _tag: u128) {
        self.tags += 1;
    }
}

fn load_config() -> anyhow::Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => {
            let path = PathBuf::from(path);
            Config::load_from(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => Config::load().context("Failed to load config"),
    }
}

/// Lay out `cnt(2) -> next -> end(1)` starting at `base`
fn build_demo_chain(memory: &DmaMemory, base: u32) -> anyhow::Result<()> {
    let main = memory.main();
    let tag = |id: u128, qwc: u128, addr: u128| qwc | (id << 28) | (addr << 32);

    main.store_quadword(base, tag(1, 2, 0))?;
    main.store_quadword(base + 0x10, 0x1111)?;
    main.store_quadword(base + 0x20, 0x2222)?;
    main.store_quadword(base + 0x30, tag(2, 0, (base + 0x100) as u128))?;
    main.store_quadword(base + 0x100, tag(7, 1, 0))?;
    main.store_quadword(base + 0x110, 0x3333)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    ed_core::logging::init(&config.debug);

    tracing::info!("Starting eedmac");

    let memory = DmaMemory::with_sizes(
        config.memory.main_memory_size as usize,
        config.memory.scratchpad_size as usize,
    )
    .context("Failed to allocate memory images")?;

    let sink = Arc::new(Mutex::new(GifSink::default()));
    let peers = Peers::null().with(ChannelId::Gif, sink.clone());
    let mut dmac = Dmac::with_timing(memory.clone(), peers, config.timing);

    build_demo_chain(&memory, 0x1000)?;

    // D_CTRL.DMAE, unmask GIF, then GIF chain mode with tag transfer
    dmac.write32(0x1000_E000, 0x1);
    dmac.write32(0x1000_E010, 1 << (16 + ChannelId::Gif.index()));
    dmac.write32(0x1000_A030, 0x1000);
    dmac.write32(0x1000_A000, 0x145);

    let mut slices = 0;
    while dmac.channel(ChannelId::Gif).is_running() && slices < 64 {
        dmac.run(4);
        slices += 1;
    }

    let sink = sink.lock();
    tracing::info!(
        "GIF received {} quadwords and {} tags in {} slices",
        sink.quadwords,
        sink.tags,
        slices
    );

    let report = serde_json::json!({
        "gif_quadwords": sink.quadwords,
        "gif_tags": sink.tags,
        "slices": slices,
        "int1": dmac.int1_asserted(),
        "state": dmac.save_state(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

//! Core types for the eedmac DMA controller emulator
//!
//! This crate provides the error types, configuration, and logging
//! setup shared by the memory and DMAC crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, DebugConfig, LogLevel, MemoryConfig, TimingConfig};
pub use error::{DmacError, MemoryError, Result, StateError};

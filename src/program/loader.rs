//! Building a ready-to-start CPU from a program image.

use thiserror::Error;
use crate::config::{ConfigError, CpuConfig};
use crate::cpu::{Cpu, Memory, MemoryError};

/// Construct a CPU whose memory holds `bytes` at `load_address` and zeros
/// everywhere else.
///
/// PC is set to `entry`, or to `load_address` when no entry is given. SP
/// starts at the top of memory. The returned CPU is in the Ready state.
pub fn load_image(
    bytes: &[u8],
    load_address: u16,
    entry: Option<u16>,
    config: &CpuConfig,
) -> Result<Cpu, LoadError> {
    config.validate()?;

    let mut mem = Memory::new(config.memory_size, config.endian);
    mem.load(load_address as usize, bytes)?;

    let entry = entry.unwrap_or(load_address);
    if !mem.contains(entry as usize) {
        return Err(LoadError::EntryOutOfRange {
            entry,
            capacity: mem.capacity(),
        });
    }

    let mut cpu = Cpu::new(mem);
    cpu.regs.set_pc(entry);

    tracing::debug!(
        size = bytes.len(),
        load_address,
        entry,
        memory_size = config.memory_size,
        "image loaded"
    );

    Ok(cpu)
}

/// Errors that can occur while loading an image into a new CPU.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Memory(#[from] MemoryError),

    #[error("entry point {entry:#06x} outside memory (capacity {capacity:#x})")]
    EntryOutOfRange { entry: u16, capacity: usize },
}

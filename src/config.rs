//! CPU configuration.
//!
//! A [`CpuConfig`] can be built in code, deserialized from JSON, or both:
//! missing JSON fields take their defaults.
//!
//! ```json
//! { "memory_size": 4096, "endian": "big" }
//! ```

use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::cpu::memory::{Endian, MAX_MEMORY_SIZE, DEFAULT_MEMORY_SIZE};

/// Machine parameters fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CpuConfig {
    /// Memory capacity in bytes (1..=65536).
    pub memory_size: usize,
    /// Byte order for multi-byte memory accesses and instruction operands.
    pub endian: Endian,
}

impl CpuConfig {
    /// Check that the configuration describes a buildable machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size == 0 || self.memory_size > MAX_MEMORY_SIZE {
            return Err(ConfigError::InvalidMemorySize(self.memory_size));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: CpuConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            endian: Endian::default(),
        }
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("memory size {0} out of range (1-{max})", max = MAX_MEMORY_SIZE)]
    InvalidMemorySize(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

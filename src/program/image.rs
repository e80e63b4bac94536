//! Program image files.
//!
//! Two formats are understood:
//! - raw binary: the file contents are the image bytes; the load address
//!   and entry point come from the caller
//! - JSON (`*.json`): a self-describing image
//!
//! ```json
//! {
//!   "isa_version": 1,
//!   "load_address": 0,
//!   "entry": null,
//!   "endian": "little",
//!   "bytes": [17, 0, 5, 0, 33, 0, 3, 0, 0]
//! }
//! ```

use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::config::CpuConfig;
use crate::cpu::isa::ISA_VERSION;
use crate::cpu::{Cpu, Endian};
use crate::program::loader::{load_image, LoadError};

/// A program image plus where to put it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramImage {
    /// Instruction set version the bytes were produced for.
    pub isa_version: u32,
    #[serde(default)]
    pub load_address: u16,
    /// Start address; defaults to `load_address`.
    #[serde(default)]
    pub entry: Option<u16>,
    /// Byte order the image was encoded with; overrides the configuration.
    #[serde(default)]
    pub endian: Option<Endian>,
    pub bytes: Vec<u8>,
}

impl ProgramImage {
    /// Wrap raw bytes for the current instruction set.
    pub fn new(bytes: Vec<u8>, load_address: u16) -> Self {
        Self {
            isa_version: ISA_VERSION,
            load_address,
            entry: None,
            endian: None,
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Parse a JSON image, rejecting other instruction set versions.
    pub fn from_json(text: &str) -> Result<Self, ImageError> {
        let image: ProgramImage = serde_json::from_str(text)?;
        if image.isa_version != ISA_VERSION {
            return Err(ImageError::UnsupportedIsaVersion {
                found: image.isa_version,
                expected: ISA_VERSION,
            });
        }
        Ok(image)
    }

    pub fn to_json(&self) -> Result<String, ImageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read an image from disk. `*.json` files are parsed as JSON images;
    /// anything else is raw binary placed at `load_address`.
    pub fn read<P: AsRef<Path>>(path: P, load_address: u16) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            let text = std::fs::read_to_string(path)?;
            Self::from_json(&text)
        } else {
            let bytes = std::fs::read(path)?;
            Ok(Self::new(bytes, load_address))
        }
    }

    /// Write as a JSON image.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ImageError> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    /// The configuration this image should run under: `config` with the
    /// image's byte order applied.
    pub fn effective_config(&self, config: &CpuConfig) -> CpuConfig {
        CpuConfig {
            endian: self.endian.unwrap_or(config.endian),
            ..config.clone()
        }
    }

    /// Build a Ready CPU holding this image.
    pub fn load(&self, config: &CpuConfig) -> Result<Cpu, LoadError> {
        load_image(&self.bytes, self.load_address, self.entry, &self.effective_config(config))
    }
}

/// Errors that can occur while reading or writing image files.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid image: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("image targets ISA version {found}, this CPU implements version {expected}")]
    UnsupportedIsaVersion { found: u32, expected: u32 },
}

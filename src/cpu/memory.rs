//! Byte-addressable main memory.
//!
//! Memory is a flat array of bytes with a capacity fixed at construction
//! (at most 64 KiB, since addresses are 16 bits). Multi-byte values are
//! assembled in the byte order chosen when the memory was created.

use std::ops::Range;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::cpu::machine::ErrorKind;

/// Largest supported memory: the whole 16-bit address space.
pub const MAX_MEMORY_SIZE: usize = 0x1_0000;

/// Default memory size.
pub const DEFAULT_MEMORY_SIZE: usize = MAX_MEMORY_SIZE;

/// Byte order for multi-byte reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    /// Assemble a 16-bit value from two bytes in this order.
    #[inline]
    pub fn read_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        }
    }

    /// Split a 16-bit value into two bytes in this order.
    #[inline]
    pub fn write_u16(self, value: u16) -> [u8; 2] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

impl FromStr for Endian {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "little" | "le" => Ok(Endian::Little),
            "big" | "be" => Ok(Endian::Big),
            other => Err(format!("unknown endianness '{}' (expected little or big)", other)),
        }
    }
}

/// Access width of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    /// Number of bytes touched.
    pub const fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
        }
    }
}

/// Main memory.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "MemorySnapshot")]
pub struct Memory {
    bytes: Vec<u8>,
    endian: Endian,
}

/// Unchecked serialized form; capacity is validated on the way in.
#[derive(Deserialize)]
struct MemorySnapshot {
    bytes: Vec<u8>,
    endian: Endian,
}

impl TryFrom<MemorySnapshot> for Memory {
    type Error = MemoryError;

    fn try_from(snapshot: MemorySnapshot) -> Result<Self, Self::Error> {
        let capacity = snapshot.bytes.len();
        if capacity == 0 || capacity > MAX_MEMORY_SIZE {
            return Err(MemoryError::InvalidCapacity(capacity));
        }
        Ok(Self {
            bytes: snapshot.bytes,
            endian: snapshot.endian,
        })
    }
}

/// Initial stack pointer for a memory of `capacity` bytes: one past the
/// last byte, wrapped to 16 bits. A full 64 KiB memory starts with SP = 0.
pub fn stack_top(capacity: usize) -> u16 {
    (capacity % MAX_MEMORY_SIZE) as u16
}

impl Memory {
    /// Create a zero-filled memory of `capacity` bytes.
    pub fn new(capacity: usize, endian: Endian) -> Self {
        Self {
            bytes: vec![0; capacity],
            endian,
        }
    }

    /// Number of addressable bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// True if `address` names a byte inside this memory.
    #[inline]
    pub fn contains(&self, address: usize) -> bool {
        address < self.bytes.len()
    }

    /// Validate an access of `width` bytes starting at `address`.
    fn range(&self, address: usize, width: usize) -> Result<Range<usize>, MemoryError> {
        let capacity = self.bytes.len();
        match address.checked_add(width) {
            Some(end) if address < capacity && end <= capacity => Ok(address..end),
            _ => Err(MemoryError::OutOfBounds { address, width, capacity }),
        }
    }

    /// Read `width` raw bytes starting at `address`.
    pub fn read(&self, address: usize, width: usize) -> Result<&[u8], MemoryError> {
        let range = self.range(address, width)?;
        Ok(&self.bytes[range])
    }

    /// Write raw bytes starting at `address`.
    ///
    /// The whole range is checked first; on error no byte is modified.
    pub fn write(&mut self, address: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(address, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_u8(&self, address: usize) -> Result<u8, MemoryError> {
        let range = self.range(address, 1)?;
        Ok(self.bytes[range.start])
    }

    pub fn write_u8(&mut self, address: usize, value: u8) -> Result<(), MemoryError> {
        self.write(address, &[value])
    }

    pub fn read_u16(&self, address: usize) -> Result<u16, MemoryError> {
        let bytes = self.read(address, 2)?;
        Ok(self.endian.read_u16([bytes[0], bytes[1]]))
    }

    pub fn write_u16(&mut self, address: usize, value: u16) -> Result<(), MemoryError> {
        let bytes = self.endian.write_u16(value);
        self.write(address, &bytes)
    }

    /// Read a value of the given width, zero-extended to 16 bits.
    pub fn read_value(&self, address: usize, width: Width) -> Result<u16, MemoryError> {
        match width {
            Width::Byte => self.read_u8(address).map(u16::from),
            Width::Word => self.read_u16(address),
        }
    }

    /// Write the low `width` bytes of `value`.
    pub fn write_value(&mut self, address: usize, width: Width, value: u16) -> Result<(), MemoryError> {
        match width {
            Width::Byte => self.write_u8(address, value as u8),
            Width::Word => self.write_u16(address, value),
        }
    }

    /// Copy an image into memory at `address`.
    pub fn load(&mut self, address: usize, image: &[u8]) -> Result<(), MemoryError> {
        let capacity = self.bytes.len();
        if address.saturating_add(image.len()) > capacity {
            return Err(MemoryError::ImageTooLarge {
                address,
                size: image.len(),
                capacity,
            });
        }
        self.bytes[address..address + image.len()].copy_from_slice(image);
        Ok(())
    }

    /// The whole memory as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Up to `len` bytes from `start`, clamped to capacity (for reporting).
    pub fn dump(&self, start: usize, len: usize) -> &[u8] {
        let start = start.min(self.bytes.len());
        let end = start.saturating_add(len).min(self.bytes.len());
        &self.bytes[start..end]
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SIZE, Endian::default())
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero bytes
        let non_zero = self.bytes.iter().filter(|&&b| b != 0).count();

        f.debug_struct("Memory")
            .field("capacity", &self.bytes.len())
            .field("endian", &self.endian)
            .field("non_zero_bytes", &non_zero)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MemoryError {
    /// Access touches bytes outside `0..capacity`.
    #[error("{width}-byte access at {address:#06x} out of bounds (capacity {capacity:#x})")]
    OutOfBounds { address: usize, width: usize, capacity: usize },

    /// Image does not fit at the requested address.
    #[error("image of {size} bytes at {address:#06x} exceeds memory capacity {capacity:#x}")]
    ImageTooLarge { address: usize, size: usize, capacity: usize },

    #[error("memory capacity {0} out of range (1-{max})", max = MAX_MEMORY_SIZE)]
    InvalidCapacity(usize),
}

impl MemoryError {
    /// Every variant is a bounds violation.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::OutOfBounds
    }
}

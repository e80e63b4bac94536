//! CPU emulation.
//!
//! This module implements the complete mmcpu architecture:
//! - up to 64 KiB of byte-addressable memory, little- or big-endian
//! - 11 registers: R0-R7, SP, PC and FLAGS, all 16 bits wide
//! - a 55-opcode variable-length instruction set (see [`isa`])

pub mod memory;
pub mod registers;
pub mod isa;
pub mod decode;
pub mod execute;
pub mod machine;

pub use memory::{Endian, Memory, MemoryError, Width};
pub use registers::{Reg, Registers};
pub use decode::{decode, encode, encode_program, Address, Condition, DecodeError, Instruction, Source, Target};
pub use execute::{execute, ExecuteError, ExecutionResult};
pub use machine::{Cpu, CpuError, CpuState, ErrorKind, Fault};

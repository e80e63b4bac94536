//! # mmcpu
//!
//! A minimal 16-bit virtual CPU.
//!
//! The machine has byte-addressable memory of up to 64 KiB, eight general
//! purpose registers plus SP, PC and FLAGS, and a compact variable-length
//! instruction set (1 to 4 bytes per instruction). Execution is a plain
//! fetch-decode-execute loop driven through [`Cpu::step`] or [`Cpu::run`].
//!
//! ```
//! use mmcpu::{load_image, CpuConfig, CpuState, Reg};
//!
//! // MOV R0, #5 ; ADD R0, #3 ; HLT
//! let image = [0x11, 0x00, 0x05, 0x00, 0x21, 0x00, 0x03, 0x00, 0x00];
//! let mut cpu = load_image(&image, 0, None, &CpuConfig::default()).unwrap();
//! cpu.start().unwrap();
//! cpu.run().unwrap();
//!
//! assert_eq!(cpu.regs.get(Reg::R0), 8);
//! assert_eq!(cpu.state(), CpuState::Halted);
//! ```

pub mod alu;
pub mod cpu;
pub mod config;
pub mod program;

#[cfg(feature = "wasm")]
pub mod wasm;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use alu::{AluOp, Flag, Flags};
pub use config::{ConfigError, CpuConfig};
pub use cpu::{Cpu, CpuError, CpuState, Endian, ErrorKind, Fault, Instruction, Memory, Reg, Registers};
pub use program::{disassemble, load_image, ImageError, LoadError, ProgramImage};

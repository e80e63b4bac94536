//! Register file.
//!
//! Eleven 16-bit registers:
//! - R0-R7: general purpose
//! - SP: stack pointer (the stack grows downward)
//! - PC: program counter
//! - FLAGS: status register; bits 0-3 hold Z, C, S, V

use std::fmt;
use serde::{Serialize, Deserialize};
use crate::alu::{Flag, Flags};

/// Register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reg {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    Sp,
    Pc,
    Flags,
}

impl Reg {
    /// Total number of registers.
    pub const COUNT: usize = 11;

    /// Number of general-purpose registers addressable from instructions.
    pub const GPR_COUNT: usize = 8;

    pub const ALL: [Reg; Reg::COUNT] = [
        Reg::R0,
        Reg::R1,
        Reg::R2,
        Reg::R3,
        Reg::R4,
        Reg::R5,
        Reg::R6,
        Reg::R7,
        Reg::Sp,
        Reg::Pc,
        Reg::Flags,
    ];

    /// Map a raw register index from an instruction to a general-purpose
    /// register. Indices 8-15 fit in the encoding but name no register.
    pub fn gpr(index: u8) -> Option<Reg> {
        Reg::ALL[..Reg::GPR_COUNT].get(index as usize).copied()
    }

    /// Slot of this register in the register array.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Reg::R0 => "R0",
            Reg::R1 => "R1",
            Reg::R2 => "R2",
            Reg::R3 => "R3",
            Reg::R4 => "R4",
            Reg::R5 => "R5",
            Reg::R6 => "R6",
            Reg::R7 => "R7",
            Reg::Sp => "SP",
            Reg::Pc => "PC",
            Reg::Flags => "FLAGS",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The register file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    values: [u16; Reg::COUNT],
}

impl Registers {
    /// Create a register file with every register zeroed.
    pub fn new() -> Self {
        Self {
            values: [0; Reg::COUNT],
        }
    }

    #[inline]
    pub fn get(&self, reg: Reg) -> u16 {
        self.values[reg.index()]
    }

    #[inline]
    pub fn set(&mut self, reg: Reg, value: u16) {
        self.values[reg.index()] = value;
    }

    #[inline]
    pub fn pc(&self) -> u16 {
        self.get(Reg::Pc)
    }

    #[inline]
    pub fn set_pc(&mut self, value: u16) {
        self.set(Reg::Pc, value);
    }

    #[inline]
    pub fn sp(&self) -> u16 {
        self.get(Reg::Sp)
    }

    #[inline]
    pub fn set_sp(&mut self, value: u16) {
        self.set(Reg::Sp, value);
    }

    /// Current condition flags.
    pub fn flags(&self) -> Flags {
        Flags::from_bits(self.get(Reg::Flags))
    }

    /// Replace the condition flags, keeping any other bits of FLAGS.
    pub fn set_flags(&mut self, flags: Flags) {
        let other = self.get(Reg::Flags) & !Flags::MASK;
        self.set(Reg::Flags, other | flags.to_bits());
    }

    pub fn flag(&self, flag: Flag) -> bool {
        self.get(Reg::Flags) & flag.bit() != 0
    }

    pub fn set_flag(&mut self, flag: Flag, on: bool) {
        let bits = self.get(Reg::Flags);
        let bits = if on { bits | flag.bit() } else { bits & !flag.bit() };
        self.set(Reg::Flags, bits);
    }

    /// Write an ALU result and the flags it produced together.
    pub fn write_result(&mut self, reg: Reg, value: u16, flags: Flags) {
        self.set(reg, value);
        self.set_flags(flags);
    }

    /// The eight general-purpose register values.
    pub fn gprs(&self) -> &[u16] {
        &self.values[..Reg::GPR_COUNT]
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for reg in Reg::ALL {
            map.entry(&reg.name(), &format_args!("{:#06x}", self.get(reg)));
        }
        map.finish()
    }
}

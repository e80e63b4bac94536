//! Condition flags.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A single bit of the flags register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// Result was zero.
    Zero,
    /// Unsigned carry out of bit 15 (add), borrow (sub/cmp), or the last bit shifted out.
    Carry,
    /// Bit 15 of the result.
    Sign,
    /// Two's-complement overflow.
    Overflow,
}

impl Flag {
    /// All flags, in bit order.
    pub const ALL: [Flag; 4] = [Flag::Zero, Flag::Carry, Flag::Sign, Flag::Overflow];

    /// Bit mask of this flag inside the flags register.
    pub const fn bit(self) -> u16 {
        match self {
            Flag::Zero => 1 << 0,
            Flag::Carry => 1 << 1,
            Flag::Sign => 1 << 2,
            Flag::Overflow => 1 << 3,
        }
    }

    /// One-letter name used in register dumps.
    pub const fn symbol(self) -> char {
        match self {
            Flag::Zero => 'Z',
            Flag::Carry => 'C',
            Flag::Sign => 'S',
            Flag::Overflow => 'V',
        }
    }
}

/// The four condition flags as plain booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags {
    pub zero: bool,
    pub carry: bool,
    pub sign: bool,
    pub overflow: bool,
}

impl Flags {
    /// Bits of the flags register owned by [`Flag`].
    pub const MASK: u16 = 0b1111;

    /// Derive zero and sign from `value`; carry and overflow are supplied.
    pub fn from_result(value: u16, carry: bool, overflow: bool) -> Self {
        Self {
            zero: value == 0,
            carry,
            sign: value & 0x8000 != 0,
            overflow,
        }
    }

    /// Decode from the low bits of a flags register value.
    pub fn from_bits(bits: u16) -> Self {
        Self {
            zero: bits & Flag::Zero.bit() != 0,
            carry: bits & Flag::Carry.bit() != 0,
            sign: bits & Flag::Sign.bit() != 0,
            overflow: bits & Flag::Overflow.bit() != 0,
        }
    }

    /// Encode into flags register bits.
    pub fn to_bits(self) -> u16 {
        Flag::ALL
            .iter()
            .filter(|&&flag| self.get(flag))
            .fold(0, |bits, flag| bits | flag.bit())
    }

    pub fn get(self, flag: Flag) -> bool {
        match flag {
            Flag::Zero => self.zero,
            Flag::Carry => self.carry,
            Flag::Sign => self.sign,
            Flag::Overflow => self.overflow,
        }
    }
}

impl fmt::Display for Flags {
    /// Renders as e.g. `Z-S-`, in `ZCSV` order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flag in Flag::ALL {
            let c = if self.get(flag) { flag.symbol() } else { '-' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

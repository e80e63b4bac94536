//! Wrapping 16-bit arithmetic with flag generation.
//!
//! Every operation returns `(result, flags)`. Results wrap modulo 2^16;
//! nothing is ever widened into a destination register.

use serde::{Serialize, Deserialize};
use crate::alu::Flags;

const SIGN_BIT: u16 = 0x8000;

/// Add two words, returning (result, flags).
#[inline]
pub fn add(a: u16, b: u16) -> (u16, Flags) {
    adc(a, b, false)
}

/// Add with carry in.
///
/// Carry is set iff the true sum exceeds 0xFFFF; overflow is set iff both
/// operands share a sign that the result does not.
pub fn adc(a: u16, b: u16, carry_in: bool) -> (u16, Flags) {
    let wide = a as u32 + b as u32 + carry_in as u32;
    let value = wide as u16;
    let overflow = (a ^ value) & (b ^ value) & SIGN_BIT != 0;
    (value, Flags::from_result(value, wide > 0xFFFF, overflow))
}

/// Subtract `b` from `a`, returning (result, flags).
#[inline]
pub fn sub(a: u16, b: u16) -> (u16, Flags) {
    sbc(a, b, false)
}

/// Subtract with borrow in.
///
/// Carry holds the borrow: it is set iff `a < b + borrow_in` as unsigned
/// integers. Overflow is set iff the operands differ in sign and the result
/// takes the sign of `b`.
pub fn sbc(a: u16, b: u16, borrow_in: bool) -> (u16, Flags) {
    let wide = a as i32 - b as i32 - borrow_in as i32;
    let value = wide as u16;
    let overflow = (a ^ b) & (a ^ value) & SIGN_BIT != 0;
    (value, Flags::from_result(value, wide < 0, overflow))
}

#[inline]
pub fn and(a: u16, b: u16) -> (u16, Flags) {
    logic(a & b)
}

#[inline]
pub fn or(a: u16, b: u16) -> (u16, Flags) {
    logic(a | b)
}

#[inline]
pub fn xor(a: u16, b: u16) -> (u16, Flags) {
    logic(a ^ b)
}

fn logic(value: u16) -> (u16, Flags) {
    (value, Flags::from_result(value, false, false))
}

/// Shift count used by all shifts: the low four bits of the operand.
#[inline]
fn shift_count(count: u16) -> u32 {
    (count & 0x0F) as u32
}

/// Logical shift left. Carry receives the last bit shifted out.
pub fn shl(a: u16, count: u16) -> (u16, Flags) {
    let n = shift_count(count);
    if n == 0 {
        return logic(a);
    }
    let value = a << n;
    let carry = (a >> (16 - n)) & 1 != 0;
    (value, Flags::from_result(value, carry, false))
}

/// Logical shift right. Carry receives the last bit shifted out.
pub fn shr(a: u16, count: u16) -> (u16, Flags) {
    let n = shift_count(count);
    if n == 0 {
        return logic(a);
    }
    let value = a >> n;
    let carry = (a >> (n - 1)) & 1 != 0;
    (value, Flags::from_result(value, carry, false))
}

/// Arithmetic shift right (sign-filling).
pub fn sar(a: u16, count: u16) -> (u16, Flags) {
    let n = shift_count(count);
    if n == 0 {
        return logic(a);
    }
    let value = ((a as i16) >> n) as u16;
    let carry = (a >> (n - 1)) & 1 != 0;
    (value, Flags::from_result(value, carry, false))
}

/// Two-operand ALU instructions that write their result back to the
/// destination register. Compare is modelled separately since it only
/// touches flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
}

impl AluOp {
    /// All operations, in opcode order.
    pub const ALL: [AluOp; 10] = [
        AluOp::Add,
        AluOp::Adc,
        AluOp::Sub,
        AluOp::Sbc,
        AluOp::And,
        AluOp::Or,
        AluOp::Xor,
        AluOp::Shl,
        AluOp::Shr,
        AluOp::Sar,
    ];

    /// Position in [`AluOp::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Adc => "ADC",
            AluOp::Sub => "SUB",
            AluOp::Sbc => "SBC",
            AluOp::And => "AND",
            AluOp::Or => "OR",
            AluOp::Xor => "XOR",
            AluOp::Shl => "SHL",
            AluOp::Shr => "SHR",
            AluOp::Sar => "SAR",
        }
    }

    /// Apply to `a` (destination) and `b` (source). `carry` is only read by
    /// ADC and SBC.
    pub fn apply(self, a: u16, b: u16, carry: bool) -> (u16, Flags) {
        match self {
            AluOp::Add => add(a, b),
            AluOp::Adc => adc(a, b, carry),
            AluOp::Sub => sub(a, b),
            AluOp::Sbc => sbc(a, b, carry),
            AluOp::And => and(a, b),
            AluOp::Or => or(a, b),
            AluOp::Xor => xor(a, b),
            AluOp::Shl => shl(a, b),
            AluOp::Shr => shr(a, b),
            AluOp::Sar => sar(a, b),
        }
    }
}

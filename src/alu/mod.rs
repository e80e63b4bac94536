//! 16-bit arithmetic and logic primitives.
//!
//! This module provides the pieces the executor builds on:
//! - [`Flag`] / [`Flags`] - the zero, carry, sign and overflow bits
//! - [`arith`] - wrapping add/sub/logic/shift operations that return the
//!   result together with the flags it produces
//! - [`AluOp`] - the closed set of two-operand ALU instructions

mod flags;
pub mod arith;

pub use flags::{Flag, Flags};
pub use arith::{add, adc, sub, sbc, and, or, xor, shl, shr, sar, AluOp};

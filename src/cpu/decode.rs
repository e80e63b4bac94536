//! Instruction decoder.
//!
//! Instructions are variable length (1-4 bytes, see [`crate::cpu::isa`]).
//! The decoder reads the opcode byte at PC, looks up how many operand bytes
//! it needs, and builds an [`Instruction`]. It only ever reads memory.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::alu::{AluOp, Flags};
use crate::cpu::isa::{self, opcodes, Layout};
use crate::cpu::memory::{Endian, Memory, Width};

/// Second operand of MOV, ALU and CMP instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    /// Raw register index (0-15).
    Reg(u8),
    Imm(u16),
}

/// Memory addressing mode of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Address {
    /// `[addr16]`
    Absolute(u16),
    /// `[rb + off16]`; the sum wraps modulo 2^16.
    Indexed { base: u8, offset: i16 },
}

/// Destination of JMP and CALL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Absolute(u16),
    /// Jump to the address held in a register.
    Reg(u8),
}

/// Branch condition, evaluated against the flags register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Zero,
    NotZero,
    Carry,
    NotCarry,
    Negative,
    NotNegative,
    Overflow,
    NotOverflow,
    /// Signed less than: S != V
    Less,
    /// Signed greater or equal: S == V
    GreaterEqual,
    /// Signed greater than: !Z && S == V
    Greater,
    /// Signed less or equal: Z || S != V
    LessEqual,
    /// Unsigned above: !C && !Z
    Above,
    /// Unsigned below or equal: C || Z
    BelowEqual,
}

impl Condition {
    /// All conditions, in opcode order starting at `BRANCH_BASE`.
    pub const ALL: [Condition; 14] = [
        Condition::Zero,
        Condition::NotZero,
        Condition::Carry,
        Condition::NotCarry,
        Condition::Negative,
        Condition::NotNegative,
        Condition::Overflow,
        Condition::NotOverflow,
        Condition::Less,
        Condition::GreaterEqual,
        Condition::Greater,
        Condition::LessEqual,
        Condition::Above,
        Condition::BelowEqual,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn holds(self, flags: Flags) -> bool {
        let Flags { zero, carry, sign, overflow } = flags;
        match self {
            Condition::Zero => zero,
            Condition::NotZero => !zero,
            Condition::Carry => carry,
            Condition::NotCarry => !carry,
            Condition::Negative => sign,
            Condition::NotNegative => !sign,
            Condition::Overflow => overflow,
            Condition::NotOverflow => !overflow,
            Condition::Less => sign != overflow,
            Condition::GreaterEqual => sign == overflow,
            Condition::Greater => !zero && sign == overflow,
            Condition::LessEqual => zero || sign != overflow,
            Condition::Above => !carry && !zero,
            Condition::BelowEqual => carry || zero,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Condition::Zero => "JZ",
            Condition::NotZero => "JNZ",
            Condition::Carry => "JC",
            Condition::NotCarry => "JNC",
            Condition::Negative => "JN",
            Condition::NotNegative => "JNN",
            Condition::Overflow => "JV",
            Condition::NotOverflow => "JNV",
            Condition::Less => "JLT",
            Condition::GreaterEqual => "JGE",
            Condition::Greater => "JGT",
            Condition::LessEqual => "JLE",
            Condition::Above => "JA",
            Condition::BelowEqual => "JBE",
        }
    }
}

/// A decoded instruction.
///
/// Register operands keep the raw 4-bit index from the encoding; indices
/// above 7 decode fine and are rejected by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Control ====================

    /// Stop the CPU
    Halt,

    /// No operation
    Nop,

    // ==================== Data Movement ====================

    /// ra := rb | imm
    Mov { dst: u8, src: Source },

    /// ra := mem[addr] (byte loads zero-extend)
    Load { dst: u8, addr: Address, width: Width },

    /// mem[addr] := ra (byte stores keep the low byte)
    Store { src: u8, addr: Address, width: Width },

    /// SP -= 2; mem16[SP] := ra
    Push { src: u8 },

    /// ra := mem16[SP]; SP += 2
    Pop { dst: u8 },

    // ==================== Arithmetic / Logic ====================

    /// ra := ra <op> (rb | imm), flags updated
    Alu { op: AluOp, dst: u8, src: Source },

    /// Flags from ra - (rb | imm); ra unchanged
    Cmp { lhs: u8, rhs: Source },

    // ==================== Control Flow ====================

    /// PC := target
    Jump { target: Target },

    /// if cond then PC := target
    Branch { cond: Condition, target: u16 },

    /// push PC + len; PC := target
    Call { target: Target },

    /// PC := pop
    Ret,
}

impl Instruction {
    /// The opcode byte this instruction encodes to.
    pub fn opcode(&self) -> u8 {
        match *self {
            Instruction::Halt => opcodes::HLT,
            Instruction::Nop => opcodes::NOP,
            Instruction::Mov { src: Source::Reg(_), .. } => opcodes::MOV_REG,
            Instruction::Mov { src: Source::Imm(_), .. } => opcodes::MOV_IMM,
            Instruction::Load { addr, width, .. } => match (width, addr) {
                (Width::Word, Address::Absolute(_)) => opcodes::LD_ABS,
                (Width::Word, Address::Indexed { .. }) => opcodes::LD_IDX,
                (Width::Byte, Address::Absolute(_)) => opcodes::LDB_ABS,
                (Width::Byte, Address::Indexed { .. }) => opcodes::LDB_IDX,
            },
            Instruction::Store { addr, width, .. } => match (width, addr) {
                (Width::Word, Address::Absolute(_)) => opcodes::ST_ABS,
                (Width::Word, Address::Indexed { .. }) => opcodes::ST_IDX,
                (Width::Byte, Address::Absolute(_)) => opcodes::STB_ABS,
                (Width::Byte, Address::Indexed { .. }) => opcodes::STB_IDX,
            },
            Instruction::Push { .. } => opcodes::PUSH,
            Instruction::Pop { .. } => opcodes::POP,
            Instruction::Alu { op, src, .. } => {
                opcodes::ALU_BASE + 2 * op.index() as u8 + source_bit(src)
            }
            Instruction::Cmp { rhs, .. } => opcodes::CMP_REG + source_bit(rhs),
            Instruction::Jump { target: Target::Absolute(_) } => opcodes::JMP_ABS,
            Instruction::Jump { target: Target::Reg(_) } => opcodes::JMP_REG,
            Instruction::Branch { cond, .. } => opcodes::BRANCH_BASE + cond.index() as u8,
            Instruction::Call { target: Target::Absolute(_) } => opcodes::CALL_ABS,
            Instruction::Call { target: Target::Reg(_) } => opcodes::CALL_REG,
            Instruction::Ret => opcodes::RET,
        }
    }

    /// Operand layout of this instruction's encoding.
    pub fn layout(&self) -> Layout {
        match *self {
            Instruction::Halt | Instruction::Nop | Instruction::Ret => Layout::Bare,
            Instruction::Mov { src, .. }
            | Instruction::Alu { src, .. }
            | Instruction::Cmp { rhs: src, .. } => match src {
                Source::Reg(_) => Layout::Reg,
                Source::Imm(_) => Layout::RegWord,
            },
            Instruction::Load { .. } | Instruction::Store { .. } => Layout::RegWord,
            Instruction::Push { .. } | Instruction::Pop { .. } => Layout::Reg,
            Instruction::Jump { target } | Instruction::Call { target } => match target {
                Target::Absolute(_) => Layout::Word,
                Target::Reg(_) => Layout::Reg,
            },
            Instruction::Branch { .. } => Layout::Word,
        }
    }

    /// Encoded length in bytes.
    #[inline]
    pub fn len(&self) -> u16 {
        self.layout().len()
    }
}

fn source_bit(src: Source) -> u8 {
    match src {
        Source::Reg(_) => 0,
        Source::Imm(_) => 1,
    }
}

/// Decode the instruction at `pc`.
pub fn decode(mem: &Memory, pc: u16) -> Result<Instruction, DecodeError> {
    let start = pc as usize;
    let available = mem.capacity().saturating_sub(start);
    let truncated = |needed: u16| DecodeError::TruncatedInstruction {
        pc,
        needed,
        available: available.min(u16::MAX as usize) as u16,
    };

    let opcode = mem.read_u8(start).map_err(|_| truncated(1))?;
    let info = isa::lookup(opcode).ok_or(DecodeError::InvalidOpcode { opcode, pc })?;
    let len = info.len();
    let raw = mem.read(start, len as usize).map_err(|_| truncated(len))?;

    // Register byte (if any) comes first, then the 16-bit word.
    let (a, b) = if info.layout.has_reg_byte() {
        (raw[1] >> 4, raw[1] & 0x0F)
    } else {
        (0, 0)
    };
    let word = match info.layout {
        Layout::Word => mem.endian().read_u16([raw[1], raw[2]]),
        Layout::RegWord => mem.endian().read_u16([raw[2], raw[3]]),
        Layout::Bare | Layout::Reg => 0,
    };
    let offset = word as i16;

    let instruction = match opcode {
        opcodes::HLT => Instruction::Halt,
        opcodes::NOP => Instruction::Nop,

        opcodes::MOV_REG => Instruction::Mov { dst: a, src: Source::Reg(b) },
        opcodes::MOV_IMM => Instruction::Mov { dst: a, src: Source::Imm(word) },
        opcodes::LD_ABS => Instruction::Load { dst: a, addr: Address::Absolute(word), width: Width::Word },
        opcodes::LD_IDX => Instruction::Load { dst: a, addr: Address::Indexed { base: b, offset }, width: Width::Word },
        opcodes::LDB_ABS => Instruction::Load { dst: a, addr: Address::Absolute(word), width: Width::Byte },
        opcodes::LDB_IDX => Instruction::Load { dst: a, addr: Address::Indexed { base: b, offset }, width: Width::Byte },
        opcodes::ST_ABS => Instruction::Store { src: a, addr: Address::Absolute(word), width: Width::Word },
        opcodes::ST_IDX => Instruction::Store { src: a, addr: Address::Indexed { base: b, offset }, width: Width::Word },
        opcodes::STB_ABS => Instruction::Store { src: a, addr: Address::Absolute(word), width: Width::Byte },
        opcodes::STB_IDX => Instruction::Store { src: a, addr: Address::Indexed { base: b, offset }, width: Width::Byte },
        opcodes::PUSH => Instruction::Push { src: a },
        opcodes::POP => Instruction::Pop { dst: a },

        opcodes::CMP_REG => Instruction::Cmp { lhs: a, rhs: Source::Reg(b) },
        opcodes::CMP_IMM => Instruction::Cmp { lhs: a, rhs: Source::Imm(word) },
        op if (opcodes::ALU_BASE..opcodes::CMP_REG).contains(&op) => {
            let index = ((op - opcodes::ALU_BASE) / 2) as usize;
            let src = if op & 1 == 0 { Source::Reg(b) } else { Source::Imm(word) };
            Instruction::Alu { op: AluOp::ALL[index], dst: a, src }
        }

        opcodes::JMP_ABS => Instruction::Jump { target: Target::Absolute(word) },
        opcodes::JMP_REG => Instruction::Jump { target: Target::Reg(a) },
        op if (opcodes::BRANCH_BASE..opcodes::CALL_ABS).contains(&op) => {
            let cond = Condition::ALL[(op - opcodes::BRANCH_BASE) as usize];
            Instruction::Branch { cond, target: word }
        }
        opcodes::CALL_ABS => Instruction::Call { target: Target::Absolute(word) },
        opcodes::CALL_REG => Instruction::Call { target: Target::Reg(a) },
        opcodes::RET => Instruction::Ret,

        _ => return Err(DecodeError::InvalidOpcode { opcode, pc }),
    };

    Ok(instruction)
}

/// Encode an instruction to bytes in the given byte order.
///
/// Register indices are masked to four bits.
pub fn encode(instr: &Instruction, endian: Endian) -> Vec<u8> {
    let reg_byte = |a: u8, b: u8| ((a & 0x0F) << 4) | (b & 0x0F);
    let source_parts = |src: Source| match src {
        Source::Reg(r) => (r, None),
        Source::Imm(imm) => (0, Some(imm)),
    };
    let address_parts = |addr: Address| match addr {
        Address::Absolute(a) => (0, a),
        Address::Indexed { base, offset } => (base, offset as u16),
    };

    let (regs, word): (Option<u8>, Option<u16>) = match *instr {
        Instruction::Halt | Instruction::Nop | Instruction::Ret => (None, None),
        Instruction::Mov { dst, src } | Instruction::Alu { dst, src, .. } => {
            let (b, imm) = source_parts(src);
            (Some(reg_byte(dst, b)), imm)
        }
        Instruction::Cmp { lhs, rhs } => {
            let (b, imm) = source_parts(rhs);
            (Some(reg_byte(lhs, b)), imm)
        }
        Instruction::Load { dst: r, addr, .. } | Instruction::Store { src: r, addr, .. } => {
            let (base, w) = address_parts(addr);
            (Some(reg_byte(r, base)), Some(w))
        }
        Instruction::Push { src: r } | Instruction::Pop { dst: r } => (Some(reg_byte(r, 0)), None),
        Instruction::Jump { target } | Instruction::Call { target } => match target {
            Target::Absolute(a) => (None, Some(a)),
            Target::Reg(r) => (Some(reg_byte(r, 0)), None),
        },
        Instruction::Branch { target, .. } => (None, Some(target)),
    };

    let mut bytes = Vec::with_capacity(instr.len() as usize);
    bytes.push(instr.opcode());
    bytes.extend(regs);
    if let Some(w) = word {
        bytes.extend_from_slice(&endian.write_u16(w));
    }
    bytes
}

/// Encode a sequence of instructions back to back.
pub fn encode_program(program: &[Instruction], endian: Endian) -> Vec<u8> {
    program.iter().flat_map(|instr| encode(instr, endian)).collect()
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("invalid opcode {opcode:#04x} at {pc:#06x}")]
    InvalidOpcode { opcode: u8, pc: u16 },

    #[error("truncated instruction at {pc:#06x}: needs {needed} bytes, {available} available")]
    TruncatedInstruction { pc: u16, needed: u16, available: u16 },
}

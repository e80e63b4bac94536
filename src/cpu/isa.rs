//! Instruction set table, version 1.
//!
//! This is the binary format programs must conform to. Each instruction
//! starts with one opcode byte; the opcode alone determines how many
//! operand bytes follow:
//!
//! ```text
//! Bare     [op]                       1 byte
//! Reg      [op][a:b]                  2 bytes
//! Word     [op][w16]                  3 bytes
//! RegWord  [op][a:b][w16]             4 bytes
//! ```
//!
//! `[a:b]` is a register byte: the high nibble names register `a`, the low
//! nibble register `b`. `w16` is an immediate, absolute address or signed
//! displacement stored in the memory's byte order.

use serde::Serialize;

/// Version of the encoding described by [`OPCODE_TABLE`].
pub const ISA_VERSION: u32 = 1;

/// Opcode byte values.
pub mod opcodes {
    pub const HLT: u8 = 0x00;
    pub const NOP: u8 = 0x01;

    pub const MOV_REG: u8 = 0x10;
    pub const MOV_IMM: u8 = 0x11;
    pub const LD_ABS: u8 = 0x12;
    pub const LD_IDX: u8 = 0x13;
    pub const LDB_ABS: u8 = 0x14;
    pub const LDB_IDX: u8 = 0x15;
    pub const ST_ABS: u8 = 0x16;
    pub const ST_IDX: u8 = 0x17;
    pub const STB_ABS: u8 = 0x18;
    pub const STB_IDX: u8 = 0x19;
    pub const PUSH: u8 = 0x1A;
    pub const POP: u8 = 0x1B;

    /// First ALU opcode. Each ALU operation takes two consecutive opcodes:
    /// even for a register source, odd for an immediate.
    pub const ALU_BASE: u8 = 0x20;
    pub const CMP_REG: u8 = 0x34;
    pub const CMP_IMM: u8 = 0x35;

    pub const JMP_ABS: u8 = 0x40;
    pub const JMP_REG: u8 = 0x41;
    /// First conditional branch; one opcode per condition.
    pub const BRANCH_BASE: u8 = 0x42;

    pub const CALL_ABS: u8 = 0x50;
    pub const CALL_REG: u8 = 0x51;
    pub const RET: u8 = 0x52;
}

/// Operand bytes that follow an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layout {
    Bare,
    Reg,
    Word,
    RegWord,
}

impl Layout {
    /// Encoded instruction length in bytes, opcode included.
    pub const fn len(self) -> u16 {
        match self {
            Layout::Bare => 1,
            Layout::Reg => 2,
            Layout::Word => 3,
            Layout::RegWord => 4,
        }
    }

    pub const fn has_reg_byte(self) -> bool {
        matches!(self, Layout::Reg | Layout::RegWord)
    }
}

/// One row of the published instruction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpcodeInfo {
    pub opcode: u8,
    pub mnemonic: &'static str,
    /// Assembly syntax, e.g. `LD ra, [rb+off16]`.
    pub syntax: &'static str,
    pub layout: Layout,
    /// Flags written, in `ZCSV` notation; `-` for none.
    pub flags: &'static str,
}

impl OpcodeInfo {
    pub const fn len(&self) -> u16 {
        self.layout.len()
    }
}

const fn row(opcode: u8, mnemonic: &'static str, syntax: &'static str, layout: Layout, flags: &'static str) -> OpcodeInfo {
    OpcodeInfo { opcode, mnemonic, syntax, layout, flags }
}

use Layout::{Bare, Reg, Word, RegWord};

/// The complete instruction table, sorted by opcode.
pub static OPCODE_TABLE: [OpcodeInfo; 55] = [
    row(0x00, "HLT", "HLT", Bare, "-"),
    row(0x01, "NOP", "NOP", Bare, "-"),

    row(0x10, "MOV", "MOV ra, rb", Reg, "-"),
    row(0x11, "MOV", "MOV ra, #imm16", RegWord, "-"),
    row(0x12, "LD", "LD ra, [addr16]", RegWord, "-"),
    row(0x13, "LD", "LD ra, [rb+off16]", RegWord, "-"),
    row(0x14, "LDB", "LDB ra, [addr16]", RegWord, "-"),
    row(0x15, "LDB", "LDB ra, [rb+off16]", RegWord, "-"),
    row(0x16, "ST", "ST [addr16], ra", RegWord, "-"),
    row(0x17, "ST", "ST [rb+off16], ra", RegWord, "-"),
    row(0x18, "STB", "STB [addr16], ra", RegWord, "-"),
    row(0x19, "STB", "STB [rb+off16], ra", RegWord, "-"),
    row(0x1A, "PUSH", "PUSH ra", Reg, "-"),
    row(0x1B, "POP", "POP ra", Reg, "-"),

    row(0x20, "ADD", "ADD ra, rb", Reg, "ZCSV"),
    row(0x21, "ADD", "ADD ra, #imm16", RegWord, "ZCSV"),
    row(0x22, "ADC", "ADC ra, rb", Reg, "ZCSV"),
    row(0x23, "ADC", "ADC ra, #imm16", RegWord, "ZCSV"),
    row(0x24, "SUB", "SUB ra, rb", Reg, "ZCSV"),
    row(0x25, "SUB", "SUB ra, #imm16", RegWord, "ZCSV"),
    row(0x26, "SBC", "SBC ra, rb", Reg, "ZCSV"),
    row(0x27, "SBC", "SBC ra, #imm16", RegWord, "ZCSV"),
    row(0x28, "AND", "AND ra, rb", Reg, "ZCSV"),
    row(0x29, "AND", "AND ra, #imm16", RegWord, "ZCSV"),
    row(0x2A, "OR", "OR ra, rb", Reg, "ZCSV"),
    row(0x2B, "OR", "OR ra, #imm16", RegWord, "ZCSV"),
    row(0x2C, "XOR", "XOR ra, rb", Reg, "ZCSV"),
    row(0x2D, "XOR", "XOR ra, #imm16", RegWord, "ZCSV"),
    row(0x2E, "SHL", "SHL ra, rb", Reg, "ZCSV"),
    row(0x2F, "SHL", "SHL ra, #imm16", RegWord, "ZCSV"),
    row(0x30, "SHR", "SHR ra, rb", Reg, "ZCSV"),
    row(0x31, "SHR", "SHR ra, #imm16", RegWord, "ZCSV"),
    row(0x32, "SAR", "SAR ra, rb", Reg, "ZCSV"),
    row(0x33, "SAR", "SAR ra, #imm16", RegWord, "ZCSV"),
    row(0x34, "CMP", "CMP ra, rb", Reg, "ZCSV"),
    row(0x35, "CMP", "CMP ra, #imm16", RegWord, "ZCSV"),

    row(0x40, "JMP", "JMP addr16", Word, "-"),
    row(0x41, "JMP", "JMP ra", Reg, "-"),
    row(0x42, "JZ", "JZ addr16", Word, "-"),
    row(0x43, "JNZ", "JNZ addr16", Word, "-"),
    row(0x44, "JC", "JC addr16", Word, "-"),
    row(0x45, "JNC", "JNC addr16", Word, "-"),
    row(0x46, "JN", "JN addr16", Word, "-"),
    row(0x47, "JNN", "JNN addr16", Word, "-"),
    row(0x48, "JV", "JV addr16", Word, "-"),
    row(0x49, "JNV", "JNV addr16", Word, "-"),
    row(0x4A, "JLT", "JLT addr16", Word, "-"),
    row(0x4B, "JGE", "JGE addr16", Word, "-"),
    row(0x4C, "JGT", "JGT addr16", Word, "-"),
    row(0x4D, "JLE", "JLE addr16", Word, "-"),
    row(0x4E, "JA", "JA addr16", Word, "-"),
    row(0x4F, "JBE", "JBE addr16", Word, "-"),

    row(0x50, "CALL", "CALL addr16", Word, "-"),
    row(0x51, "CALL", "CALL ra", Reg, "-"),
    row(0x52, "RET", "RET", Bare, "-"),
];

/// Look up an opcode byte. `None` means the byte is not a valid opcode.
pub fn lookup(opcode: u8) -> Option<&'static OpcodeInfo> {
    OPCODE_TABLE
        .binary_search_by_key(&opcode, |info| info.opcode)
        .ok()
        .map(|index| &OPCODE_TABLE[index])
}

/// Render the table as aligned text.
pub fn format_table() -> String {
    let mut output = String::new();
    output.push_str(&format!("; mmcpu instruction set, version {}\n", ISA_VERSION));
    output.push_str("; opcode  len  flags  syntax\n");

    for info in OPCODE_TABLE.iter() {
        output.push_str(&format!(
            "  {:#04x}    {}    {:<5}  {}\n",
            info.opcode,
            info.len(),
            info.flags,
            info.syntax
        ));
    }

    output
}

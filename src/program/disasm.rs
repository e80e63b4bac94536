//! Disassembler.
//!
//! Converts machine code back to readable assembly. Built only on the
//! decoder, so what it prints is exactly what the CPU would execute.

use std::fmt;
use crate::cpu::decode::{decode, Address, DecodeError, Instruction, Source, Target};
use crate::cpu::memory::{Memory, Width};

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_instruction(self))
    }
}

/// Format a decoded instruction as assembly text.
pub fn format_instruction(instr: &Instruction) -> String {
    match *instr {
        Instruction::Halt => "HLT".to_string(),
        Instruction::Nop => "NOP".to_string(),

        Instruction::Mov { dst, src } => format!("MOV {}, {}", reg(dst), format_source(src)),
        Instruction::Load { dst, addr, width } => {
            format!("{} {}, {}", load_mnemonic(width), reg(dst), format_address(addr))
        }
        Instruction::Store { src, addr, width } => {
            format!("{} {}, {}", store_mnemonic(width), format_address(addr), reg(src))
        }
        Instruction::Push { src } => format!("PUSH {}", reg(src)),
        Instruction::Pop { dst } => format!("POP {}", reg(dst)),

        Instruction::Alu { op, dst, src } => {
            format!("{} {}, {}", op.mnemonic(), reg(dst), format_source(src))
        }
        Instruction::Cmp { lhs, rhs } => format!("CMP {}, {}", reg(lhs), format_source(rhs)),

        Instruction::Jump { target } => format!("JMP {}", format_target(target)),
        Instruction::Branch { cond, target } => format!("{} {:#06x}", cond.mnemonic(), target),
        Instruction::Call { target } => format!("CALL {}", format_target(target)),
        Instruction::Ret => "RET".to_string(),
    }
}

/// Register name from a raw index. Indices without a register print as
/// `R?n` so broken code stays readable.
fn reg(index: u8) -> String {
    if index < 8 {
        format!("R{}", index)
    } else {
        format!("R?{}", index)
    }
}

fn load_mnemonic(width: Width) -> &'static str {
    match width {
        Width::Word => "LD",
        Width::Byte => "LDB",
    }
}

fn store_mnemonic(width: Width) -> &'static str {
    match width {
        Width::Word => "ST",
        Width::Byte => "STB",
    }
}

fn format_source(src: Source) -> String {
    match src {
        Source::Reg(r) => reg(r),
        Source::Imm(value) => format!("#{:#06x}", value),
    }
}

fn format_address(addr: Address) -> String {
    match addr {
        Address::Absolute(a) => format!("[{:#06x}]", a),
        Address::Indexed { base, offset } if offset < 0 => {
            format!("[{}-{}]", reg(base), offset.unsigned_abs())
        }
        Address::Indexed { base, offset } => format!("[{}+{}]", reg(base), offset),
    }
}

fn format_target(target: Target) -> String {
    match target {
        Target::Absolute(a) => format!("{:#06x}", a),
        Target::Reg(r) => reg(r),
    }
}

/// One line of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine {
    pub address: u16,
    pub bytes: Vec<u8>,
    /// Assembly text, or a `.byte` directive for undecodable bytes.
    pub text: String,
}

impl fmt::Display for ListingLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: Vec<String> = self.bytes.iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "{:04x}: {:<12} {}", self.address, hex.join(" "), self.text)
    }
}

/// Disassemble the instruction at `pc`, returning its text and length.
pub fn disassemble_at(mem: &Memory, pc: u16) -> Result<(String, u16), DecodeError> {
    let instr = decode(mem, pc)?;
    Ok((format_instruction(&instr), instr.len()))
}

/// Walk memory from `start` for `len` bytes, decoding linearly.
///
/// Invalid opcodes become one-byte `.byte` lines so the walk can resync.
/// A truncated instruction at the end is emitted as `.byte` too.
pub fn listing(mem: &Memory, start: u16, len: usize) -> Vec<ListingLine> {
    let end = (start as usize).saturating_add(len).min(mem.capacity());
    let mut lines = Vec::new();
    let mut addr = start as usize;

    while addr < end {
        let pc = addr as u16;
        let (text, size) = match decode(mem, pc) {
            Ok(instr) if addr + instr.len() as usize <= end => {
                (format_instruction(&instr), instr.len() as usize)
            }
            Ok(_) | Err(DecodeError::TruncatedInstruction { .. }) => {
                let rest = end - addr;
                (byte_directive(mem.dump(addr, rest)), rest)
            }
            Err(DecodeError::InvalidOpcode { opcode, .. }) => {
                (format!(".byte {:#04x}  ; invalid opcode", opcode), 1)
            }
        };

        lines.push(ListingLine {
            address: pc,
            bytes: mem.dump(addr, size).to_vec(),
            text,
        });
        addr += size;
    }

    lines
}

fn byte_directive(bytes: &[u8]) -> String {
    let values: Vec<String> = bytes.iter().map(|b| format!("{:#04x}", b)).collect();
    format!(".byte {}", values.join(", "))
}

/// Disassemble a region to listing text.
pub fn disassemble(mem: &Memory, start: u16, len: usize) -> String {
    let mut output = String::new();
    output.push_str("; mmcpu disassembly\n");
    output.push_str("; -----------------\n\n");

    for line in listing(mem, start, len) {
        output.push_str(&format!("{}\n", line));
    }

    output
}

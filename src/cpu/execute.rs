//! Instruction execution.
//!
//! [`execute`] applies one decoded instruction to the register file and
//! memory. Every operand (register index, effective address, stack slot,
//! jump target) is resolved and checked before anything is written, so an
//! instruction that fails leaves registers, flags and memory untouched.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::alu;
use crate::cpu::decode::{Address, Instruction, Source, Target};
use crate::cpu::memory::{Memory, MemoryError, Width};
use crate::cpu::registers::{Reg, Registers};

/// What the driver should do after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Advance PC past the instruction.
    Continue,
    /// Set PC to the given address.
    Jump(u16),
    /// Stop the CPU.
    Halt,
}

/// Execute a decoded instruction.
///
/// The program counter is read (CALL needs the return address) but never
/// written; the driver applies the returned [`ExecutionResult`].
pub fn execute(
    instr: &Instruction,
    regs: &mut Registers,
    mem: &mut Memory,
) -> Result<ExecutionResult, ExecuteError> {
    match *instr {
        Instruction::Halt => return Ok(ExecutionResult::Halt),

        Instruction::Nop => {}

        // ==================== Data Movement ====================

        Instruction::Mov { dst, src } => {
            let dst = gpr(dst)?;
            let value = read_source(regs, src)?;
            regs.set(dst, value);
        }

        Instruction::Load { dst, addr, width } => {
            let dst = gpr(dst)?;
            let ea = effective_address(regs, addr)?;
            let value = mem.read_value(ea as usize, width)?;
            regs.set(dst, value);
        }

        Instruction::Store { src, addr, width } => {
            let value = regs.get(gpr(src)?);
            let ea = effective_address(regs, addr)?;
            mem.write_value(ea as usize, width, value)?;
        }

        Instruction::Push { src } => {
            let value = regs.get(gpr(src)?);
            push(regs, mem, value)?;
        }

        Instruction::Pop { dst } => {
            let dst = gpr(dst)?;
            let value = peek(regs, mem)?;
            regs.set_sp(regs.sp().wrapping_add(2));
            regs.set(dst, value);
        }

        // ==================== Arithmetic / Logic ====================

        Instruction::Alu { op, dst, src } => {
            let dst = gpr(dst)?;
            let b = read_source(regs, src)?;
            let a = regs.get(dst);
            let (value, flags) = op.apply(a, b, regs.flag(alu::Flag::Carry));
            regs.write_result(dst, value, flags);
        }

        Instruction::Cmp { lhs, rhs } => {
            let a = regs.get(gpr(lhs)?);
            let b = read_source(regs, rhs)?;
            let (_, flags) = alu::sub(a, b);
            regs.set_flags(flags);
        }

        // ==================== Control Flow ====================

        Instruction::Jump { target } => {
            let target = resolve_target(regs, mem, target)?;
            return Ok(ExecutionResult::Jump(target));
        }

        Instruction::Branch { cond, target } => {
            if cond.holds(regs.flags()) {
                check_target(mem, target)?;
                return Ok(ExecutionResult::Jump(target));
            }
        }

        Instruction::Call { target } => {
            let target = resolve_target(regs, mem, target)?;
            let return_addr = regs.pc().wrapping_add(instr.len());
            push(regs, mem, return_addr)?;
            return Ok(ExecutionResult::Jump(target));
        }

        Instruction::Ret => {
            let target = peek(regs, mem)?;
            check_target(mem, target)?;
            regs.set_sp(regs.sp().wrapping_add(2));
            return Ok(ExecutionResult::Jump(target));
        }
    }

    Ok(ExecutionResult::Continue)
}

/// Map a raw register index to a general-purpose register.
fn gpr(index: u8) -> Result<Reg, ExecuteError> {
    Reg::gpr(index).ok_or(ExecuteError::InvalidRegister(index))
}

fn read_source(regs: &Registers, src: Source) -> Result<u16, ExecuteError> {
    match src {
        Source::Reg(index) => Ok(regs.get(gpr(index)?)),
        Source::Imm(value) => Ok(value),
    }
}

/// Compute the address a load or store touches.
fn effective_address(regs: &Registers, addr: Address) -> Result<u16, ExecuteError> {
    match addr {
        Address::Absolute(a) => Ok(a),
        Address::Indexed { base, offset } => {
            let base = regs.get(gpr(base)?);
            Ok(base.wrapping_add(offset as u16))
        }
    }
}

fn resolve_target(regs: &Registers, mem: &Memory, target: Target) -> Result<u16, ExecuteError> {
    let address = match target {
        Target::Absolute(a) => a,
        Target::Reg(index) => regs.get(gpr(index)?),
    };
    check_target(mem, address)?;
    Ok(address)
}

/// Control may only be transferred to an address inside memory.
fn check_target(mem: &Memory, target: u16) -> Result<(), ExecuteError> {
    if mem.contains(target as usize) {
        Ok(())
    } else {
        Err(ExecuteError::InvalidTarget { target })
    }
}

/// Push a word: SP -= 2, then store. SP only moves once the store succeeded.
fn push(regs: &mut Registers, mem: &mut Memory, value: u16) -> Result<(), ExecuteError> {
    let sp = regs.sp().wrapping_sub(2);
    mem.write_value(sp as usize, Width::Word, value)?;
    regs.set_sp(sp);
    Ok(())
}

/// Read the word on top of the stack without popping it.
fn peek(regs: &Registers, mem: &Memory) -> Result<u16, ExecuteError> {
    Ok(mem.read_value(regs.sp() as usize, Width::Word)?)
}

/// Errors raised while executing an instruction. All of them mean an
/// operand resolved to something invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExecuteError {
    #[error("invalid operand: register index {0} is not R0-R7")]
    InvalidRegister(u8),

    #[error("invalid operand: {0}")]
    Memory(#[from] MemoryError),

    #[error("invalid operand: control transfer to {target:#06x} outside memory")]
    InvalidTarget { target: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alu::{AluOp, Flag};
    use crate::cpu::decode::Condition;
    use crate::cpu::memory::Endian;

    fn setup() -> (Registers, Memory) {
        let mut regs = Registers::new();
        regs.set_sp(0x100);
        (regs, Memory::new(0x100, Endian::Little))
    }

    #[test]
    fn test_mov_does_not_touch_flags() {
        let (mut regs, mut mem) = setup();
        regs.set_flag(Flag::Carry, true);

        let instr = Instruction::Mov { dst: 2, src: Source::Imm(0) };
        let result = execute(&instr, &mut regs, &mut mem).unwrap();

        assert_eq!(result, ExecutionResult::Continue);
        assert_eq!(regs.get(Reg::R2), 0);
        assert!(regs.flag(Flag::Carry));
        assert!(!regs.flag(Flag::Zero));
    }

    #[test]
    fn test_alu_writes_result_and_flags() {
        let (mut regs, mut mem) = setup();
        regs.set(Reg::R0, 0xFFFF);
        regs.set(Reg::R1, 1);

        let instr = Instruction::Alu { op: AluOp::Add, dst: 0, src: Source::Reg(1) };
        execute(&instr, &mut regs, &mut mem).unwrap();

        assert_eq!(regs.get(Reg::R0), 0);
        assert!(regs.flag(Flag::Zero));
        assert!(regs.flag(Flag::Carry));
    }

    #[test]
    fn test_adc_reads_carry() {
        let (mut regs, mut mem) = setup();
        regs.set(Reg::R0, 1);
        regs.set_flag(Flag::Carry, true);

        let instr = Instruction::Alu { op: AluOp::Adc, dst: 0, src: Source::Imm(1) };
        execute(&instr, &mut regs, &mut mem).unwrap();

        assert_eq!(regs.get(Reg::R0), 3);
        assert!(!regs.flag(Flag::Carry));
    }

    #[test]
    fn test_cmp_only_sets_flags() {
        let (mut regs, mut mem) = setup();
        regs.set(Reg::R0, 7);
        regs.set(Reg::R1, 7);

        let instr = Instruction::Cmp { lhs: 0, rhs: Source::Reg(1) };
        execute(&instr, &mut regs, &mut mem).unwrap();

        assert_eq!(regs.get(Reg::R0), 7);
        assert!(regs.flag(Flag::Zero));
        assert!(!regs.flag(Flag::Carry));
    }

    #[test]
    fn test_load_store_indexed() {
        let (mut regs, mut mem) = setup();
        regs.set(Reg::R1, 0x1234);
        regs.set(Reg::R2, 0x42);

        let store = Instruction::Store {
            src: 1,
            addr: Address::Indexed { base: 2, offset: -2 },
            width: Width::Word,
        };
        execute(&store, &mut regs, &mut mem).unwrap();
        assert_eq!(mem.read_u16(0x40).unwrap(), 0x1234);

        let load = Instruction::Load { dst: 3, addr: Address::Absolute(0x40), width: Width::Byte };
        execute(&load, &mut regs, &mut mem).unwrap();
        assert_eq!(regs.get(Reg::R3), 0x34);
    }

    #[test]
    fn test_invalid_register_is_rejected() {
        let (mut regs, mut mem) = setup();
        let instr = Instruction::Mov { dst: 8, src: Source::Imm(1) };
        assert_eq!(
            execute(&instr, &mut regs, &mut mem),
            Err(ExecuteError::InvalidRegister(8))
        );
    }

    #[test]
    fn test_out_of_bounds_store_changes_nothing() {
        let (mut regs, mut mem) = setup();
        regs.set(Reg::R0, 0xAAAA);
        let before = (regs.clone(), mem.as_slice().to_vec());

        let instr = Instruction::Store { src: 0, addr: Address::Absolute(0xFF), width: Width::Word };
        let err = execute(&instr, &mut regs, &mut mem).unwrap_err();

        assert!(matches!(err, ExecuteError::Memory(MemoryError::OutOfBounds { .. })));
        assert_eq!(regs, before.0);
        assert_eq!(mem.as_slice(), &before.1[..]);
    }

    #[test]
    fn test_branch_taken_and_not_taken() {
        let (mut regs, mut mem) = setup();
        let instr = Instruction::Branch { cond: Condition::Zero, target: 0x20 };

        assert_eq!(execute(&instr, &mut regs, &mut mem).unwrap(), ExecutionResult::Continue);

        regs.set_flag(Flag::Zero, true);
        assert_eq!(execute(&instr, &mut regs, &mut mem).unwrap(), ExecutionResult::Jump(0x20));
    }

    #[test]
    fn test_untaken_branch_target_not_checked() {
        let (mut regs, mut mem) = setup();
        let instr = Instruction::Branch { cond: Condition::Zero, target: 0xF000 };
        assert_eq!(execute(&instr, &mut regs, &mut mem).unwrap(), ExecutionResult::Continue);
    }

    #[test]
    fn test_jump_outside_memory() {
        let (mut regs, mut mem) = setup();
        let instr = Instruction::Jump { target: Target::Absolute(0x100) };
        assert_eq!(
            execute(&instr, &mut regs, &mut mem),
            Err(ExecuteError::InvalidTarget { target: 0x100 })
        );
    }

    #[test]
    fn test_call_and_ret() {
        let (mut regs, mut mem) = setup();
        regs.set_pc(0x10);

        let call = Instruction::Call { target: Target::Absolute(0x80) };
        assert_eq!(execute(&call, &mut regs, &mut mem).unwrap(), ExecutionResult::Jump(0x80));
        assert_eq!(regs.sp(), 0xFE);
        assert_eq!(mem.read_u16(0xFE).unwrap(), 0x13);

        assert_eq!(execute(&Instruction::Ret, &mut regs, &mut mem).unwrap(), ExecutionResult::Jump(0x13));
        assert_eq!(regs.sp(), 0x100);
    }

    #[test]
    fn test_push_pop() {
        let (mut regs, mut mem) = setup();
        regs.set(Reg::R5, 0xCAFE);

        execute(&Instruction::Push { src: 5 }, &mut regs, &mut mem).unwrap();
        execute(&Instruction::Pop { dst: 6 }, &mut regs, &mut mem).unwrap();

        assert_eq!(regs.get(Reg::R6), 0xCAFE);
        assert_eq!(regs.sp(), 0x100);
    }

    #[test]
    fn test_ret_with_empty_stack_faults_cleanly() {
        let (mut regs, mut mem) = setup();
        // SP == capacity: nothing to pop
        let err = execute(&Instruction::Ret, &mut regs, &mut mem).unwrap_err();
        assert!(matches!(err, ExecuteError::Memory(_)));
        assert_eq!(regs.sp(), 0x100);
    }

    #[test]
    fn test_halt() {
        let (mut regs, mut mem) = setup();
        assert_eq!(execute(&Instruction::Halt, &mut regs, &mut mem).unwrap(), ExecutionResult::Halt);
    }
}

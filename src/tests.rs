//! Whole-machine tests: programs loaded through the loader and run to
//! completion, plus property tests over the building blocks.

use crate::alu::{self, AluOp, Flag};
use crate::config::CpuConfig;
use crate::cpu::decode::{decode, encode, encode_program, Address, Condition, Instruction, Source, Target};
use crate::cpu::memory::{Endian, Memory, MemoryError, Width};
use crate::cpu::{Cpu, CpuError, CpuState, ErrorKind, Reg};
use crate::program::load_image;

fn boot_with(program: &[Instruction], config: &CpuConfig) -> Cpu {
    let bytes = encode_program(program, config.endian);
    let mut cpu = load_image(&bytes, 0, None, config).unwrap();
    cpu.start().unwrap();
    cpu
}

fn boot(program: &[Instruction]) -> Cpu {
    boot_with(program, &CpuConfig { memory_size: 256, ..CpuConfig::default() })
}

fn imm(dst: u8, value: u16) -> Instruction {
    Instruction::Mov { dst, src: Source::Imm(value) }
}

#[test]
fn test_mov_add_halt() {
    let config = CpuConfig::default();
    let mut cpu = load_image(
        &[0x11, 0x00, 0x05, 0x00, 0x21, 0x00, 0x03, 0x00, 0x00],
        0,
        None,
        &config,
    )
    .unwrap();
    cpu.start().unwrap();

    assert_eq!(cpu.run().unwrap(), 3);
    assert_eq!(cpu.regs.get(Reg::R0), 8);
    assert_eq!(cpu.state(), CpuState::Halted);
    assert!(!cpu.regs.flag(Flag::Zero));
    assert!(!cpu.regs.flag(Flag::Carry));
    assert_eq!(cpu.regs.pc(), 8);
}

#[test]
fn test_undefined_opcode_at_entry() {
    let mut cpu = load_image(&[0xFF], 0, None, &CpuConfig::default()).unwrap();
    cpu.start().unwrap();
    let before = cpu.regs.clone();

    let err = cpu.step().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidOpcode);
    assert_eq!(cpu.state(), CpuState::Faulted);
    assert_eq!(cpu.regs.pc(), 0);
    assert_eq!(cpu.regs, before);
    assert_eq!(cpu.fault().map(|f| f.pc), Some(0));
}

#[test]
fn test_cmp_equal_takes_jz() {
    // 0: MOV R0,#7  4: MOV R1,#7  8: CMP R0,R1  10: JZ 18
    // 13: MOV R2,#1  17: HLT  18: MOV R2,#2  22: HLT
    let mut cpu = boot(&[
        imm(0, 7),
        imm(1, 7),
        Instruction::Cmp { lhs: 0, rhs: Source::Reg(1) },
        Instruction::Branch { cond: Condition::Zero, target: 18 },
        imm(2, 1),
        Instruction::Halt,
        imm(2, 2),
        Instruction::Halt,
    ]);

    cpu.step().unwrap();
    cpu.step().unwrap();
    cpu.step().unwrap();
    assert!(cpu.regs.flag(Flag::Zero));

    cpu.step().unwrap();
    assert_eq!(cpu.regs.pc(), 18);

    cpu.run().unwrap();
    assert_eq!(cpu.regs.get(Reg::R2), 2);
    assert_eq!(cpu.regs.pc(), 22);
}

#[test]
fn test_countdown_loop() {
    // Sum 5 + 4 + 3 + 2 + 1 into R1.
    let mut cpu = boot(&[
        imm(0, 5),
        imm(1, 0),
        Instruction::Alu { op: AluOp::Add, dst: 1, src: Source::Reg(0) },
        Instruction::Alu { op: AluOp::Sub, dst: 0, src: Source::Imm(1) },
        Instruction::Branch { cond: Condition::NotZero, target: 8 },
        Instruction::Halt,
    ]);

    cpu.run().unwrap();
    assert_eq!(cpu.regs.get(Reg::R1), 15);
    assert_eq!(cpu.regs.get(Reg::R0), 0);
    assert_eq!(cpu.cycles(), 2 + 5 * 3 + 1);
}

#[test]
fn test_signed_compare_branch() {
    // -3 < 2 signed, but 0xFFFD > 2 unsigned.
    let mut cpu = boot(&[
        imm(0, (-3i16) as u16),
        Instruction::Cmp { lhs: 0, rhs: Source::Imm(2) },
        Instruction::Branch { cond: Condition::Less, target: 15 },
        imm(3, 0xBAD),
        Instruction::Halt,
    ]);

    cpu.run().unwrap();
    assert_eq!(cpu.regs.get(Reg::R3), 0);
    assert!(!cpu.regs.flag(Flag::Carry));
    assert!(cpu.regs.flag(Flag::Sign));
}

#[test]
fn test_call_ret_restores_stack() {
    // 0: MOV R0,#2  4: CALL 8  7: HLT  8: ADD R0,R0  10: RET
    let mut cpu = boot(&[
        imm(0, 2),
        Instruction::Call { target: Target::Absolute(8) },
        Instruction::Halt,
        Instruction::Alu { op: AluOp::Add, dst: 0, src: Source::Reg(0) },
        Instruction::Ret,
    ]);

    cpu.step().unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.regs.pc(), 8);
    assert_eq!(cpu.regs.sp(), 254);
    assert_eq!(cpu.mem.read_u16(254).unwrap(), 7);

    cpu.run().unwrap();
    assert_eq!(cpu.regs.get(Reg::R0), 4);
    assert_eq!(cpu.regs.sp(), 256);
    assert_eq!(cpu.regs.pc(), 7);
    assert!(cpu.is_halted());
}

#[test]
fn test_push_pop_order() {
    let mut cpu = boot(&[
        imm(0, 1),
        imm(1, 2),
        Instruction::Push { src: 0 },
        Instruction::Push { src: 1 },
        Instruction::Pop { dst: 2 },
        Instruction::Pop { dst: 3 },
        Instruction::Halt,
    ]);

    cpu.run().unwrap();
    assert_eq!(cpu.regs.get(Reg::R2), 2);
    assert_eq!(cpu.regs.get(Reg::R3), 1);
    assert_eq!(cpu.regs.sp(), 256);
}

#[test]
fn test_full_memory_stack_wraps_from_zero() {
    let mut cpu = boot_with(
        &[imm(0, 0xBEEF), Instruction::Push { src: 0 }, Instruction::Halt],
        &CpuConfig::default(),
    );
    assert_eq!(cpu.regs.sp(), 0);

    cpu.run().unwrap();
    assert_eq!(cpu.regs.sp(), 0xFFFE);
    assert_eq!(cpu.mem.read_u16(0xFFFE).unwrap(), 0xBEEF);
}

#[test]
fn test_byte_and_word_memory_big_endian() {
    let config = CpuConfig { memory_size: 256, endian: Endian::Big };
    let mut cpu = boot_with(
        &[
            imm(0, 0x1234),
            Instruction::Store { src: 0, addr: Address::Absolute(0x80), width: Width::Word },
            Instruction::Load { dst: 1, addr: Address::Absolute(0x80), width: Width::Byte },
            imm(2, 0x90),
            Instruction::Store { src: 0, addr: Address::Indexed { base: 2, offset: -1 }, width: Width::Byte },
            Instruction::Halt,
        ],
        &config,
    );

    cpu.run().unwrap();
    assert_eq!(cpu.mem.dump(0x80, 2), &[0x12, 0x34]);
    assert_eq!(cpu.regs.get(Reg::R1), 0x12);
    assert_eq!(cpu.mem.read_u8(0x8F).unwrap(), 0x34);
}

#[test]
fn test_store_out_of_bounds_is_atomic() {
    let mut cpu = boot(&[
        imm(1, 0x1234),
        Instruction::Store { src: 1, addr: Address::Absolute(0x00FF), width: Width::Word },
        Instruction::Halt,
    ]);
    cpu.step().unwrap();
    let regs = cpu.regs.clone();
    let mem = cpu.mem.clone();

    let err = cpu.step().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidOperand);
    assert!(matches!(
        err,
        CpuError::Execute(crate::cpu::ExecuteError::Memory(MemoryError::OutOfBounds { address: 0xFF, width: 2, .. }))
    ));
    assert_eq!(cpu.regs, regs);
    assert_eq!(cpu.mem.as_slice(), mem.as_slice());
    assert_eq!(cpu.regs.pc(), 4);
    assert_eq!(cpu.fault().map(|f| f.pc), Some(4));
}

#[test]
fn test_jump_outside_memory_faults() {
    let mut cpu = boot(&[imm(0, 5), Instruction::Jump { target: Target::Absolute(0x100) }]);

    let err = cpu.run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperand);
    assert_eq!(cpu.regs.pc(), 4);
    assert_eq!(cpu.regs.get(Reg::R0), 5);
}

#[test]
fn test_invalid_register_faults() {
    let mut cpu = boot(&[Instruction::Mov { dst: 9, src: Source::Imm(1) }]);

    let err = cpu.step().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperand);
    assert!(cpu.is_faulted());
}

#[test]
fn test_truncated_operand_at_end_of_memory() {
    let config = CpuConfig { memory_size: 3, ..CpuConfig::default() };
    let mut cpu = load_image(&[0x01, 0x11, 0x00], 0, None, &config).unwrap();
    cpu.start().unwrap();

    cpu.step().unwrap();
    let err = cpu.step().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TruncatedInstruction);
    assert_eq!(cpu.regs.pc(), 1);
}

#[test]
fn test_terminal_state_is_sticky() {
    let mut cpu = boot(&[Instruction::Halt]);
    cpu.run().unwrap();
    let snapshot = (cpu.regs.clone(), cpu.cycles());

    for _ in 0..3 {
        let err = cpu.step().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyTerminated);
    }
    assert_eq!((cpu.regs.clone(), cpu.cycles()), snapshot);
    assert_eq!(cpu.run(), Ok(0));

    let mut cpu = boot(&[Instruction::Jump { target: Target::Reg(15) }]);
    assert!(cpu.run().is_err());
    assert_eq!(cpu.step().unwrap_err().kind(), ErrorKind::AlreadyTerminated);
    assert_eq!(cpu.state(), CpuState::Faulted);
}

#[test]
fn test_entry_point_and_load_address() {
    let program = encode_program(&[imm(0, 1), Instruction::Halt, imm(0, 2), Instruction::Halt], Endian::Little);
    let config = CpuConfig { memory_size: 256, ..CpuConfig::default() };
    let mut cpu = load_image(&program, 0x40, Some(0x45), &config).unwrap();
    cpu.start().unwrap();

    cpu.run().unwrap();
    assert_eq!(cpu.regs.get(Reg::R0), 2);
    assert_eq!(cpu.regs.pc(), 0x49);
}

#[test]
fn test_cpu_state_serializes() {
    let mut cpu = boot(&[imm(0, 42), Instruction::Halt]);
    cpu.run().unwrap();

    let json = serde_json::to_string(&cpu).unwrap();
    let restored: Cpu = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.regs, cpu.regs);
    assert_eq!(restored.state(), CpuState::Halted);
    assert_eq!(restored.mem.as_slice(), cpu.mem.as_slice());
}

#[test]
fn test_faulted_cpu_keeps_fault_across_serialization() {
    let mut cpu = boot(&[Instruction::Nop]);
    cpu.mem.write_u8(1, 0xFF).unwrap();
    assert!(cpu.run().is_err());

    let json = serde_json::to_string(&cpu).unwrap();
    let restored: Cpu = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.state(), CpuState::Faulted);
    assert_eq!(restored.fault(), cpu.fault());
    let fault = restored.fault().unwrap();
    assert_eq!(fault.pc, 1);
    assert_eq!(fault.error.kind(), ErrorKind::InvalidOpcode);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn endian() -> impl Strategy<Value = Endian> {
        prop_oneof![Just(Endian::Little), Just(Endian::Big)]
    }

    proptest! {
        #[test]
        fn add_sets_carry_and_zero(a: u16, b: u16) {
            let (value, flags) = alu::add(a, b);
            let wide = a as u32 + b as u32;

            prop_assert_eq!(value, wide as u16);
            prop_assert_eq!(flags.carry, wide > 0xFFFF);
            prop_assert_eq!(flags.zero, value == 0);
            prop_assert_eq!(flags.sign, value & 0x8000 != 0);
        }

        #[test]
        fn sub_borrow_matches_unsigned_order(a: u16, b: u16) {
            let (value, flags) = alu::sub(a, b);
            prop_assert_eq!(value, a.wrapping_sub(b));
            prop_assert_eq!(flags.carry, a < b);
            prop_assert_eq!(flags.zero, a == b);
        }

        #[test]
        fn signed_overflow_matches_i16(a: i16, b: i16) {
            let (_, flags) = alu::add(a as u16, b as u16);
            prop_assert_eq!(flags.overflow, a.checked_add(b).is_none());

            let (_, flags) = alu::sub(a as u16, b as u16);
            prop_assert_eq!(flags.overflow, a.checked_sub(b).is_none());
        }

        #[test]
        fn memory_roundtrip(
            capacity in 2usize..=1024,
            offset: usize,
            value: u16,
            word: bool,
            endian in endian(),
        ) {
            let width = if word { Width::Word } else { Width::Byte };
            let address = offset % (capacity - width.bytes() + 1);
            let mut mem = Memory::new(capacity, endian);

            mem.write_value(address, width, value).unwrap();
            let expected = if word { value } else { value & 0xFF };
            prop_assert_eq!(mem.read_value(address, width).unwrap(), expected);
        }

        #[test]
        fn memory_boundary(capacity in 1usize..=0x1_0000) {
            let mut mem = Memory::new(capacity, Endian::Little);

            prop_assert!(mem.read_u8(capacity - 1).is_ok());
            prop_assert!(mem.write_u8(capacity - 1, 0xAA).is_ok());

            let err = mem.read_u8(capacity).unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::OutOfBounds);
            prop_assert!(mem.write_u8(capacity, 0).is_err());
        }

        #[test]
        fn decode_is_idempotent(bytes in proptest::collection::vec(any::<u8>(), 1..8), endian in endian()) {
            let mut mem = Memory::new(bytes.len(), endian);
            mem.load(0, &bytes).unwrap();

            let first = decode(&mem, 0);
            let second = decode(&mem, 0);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(mem.as_slice(), &bytes[..]);

            if let Ok(instr) = first {
                let mut again = Memory::new(8, endian);
                again.load(0, &encode(&instr, endian)).unwrap();
                prop_assert_eq!(decode(&again, 0), Ok(instr));
            }
        }

        #[test]
        fn random_programs_never_panic(bytes in proptest::collection::vec(any::<u8>(), 1..128)) {
            let config = CpuConfig { memory_size: 128, ..CpuConfig::default() };
            let mut cpu = load_image(&bytes, 0, None, &config).unwrap();
            cpu.start().unwrap();

            let result = cpu.run_limited(500);
            match cpu.state() {
                CpuState::Faulted => {
                    prop_assert!(result.is_err());
                    prop_assert!(cpu.fault().is_some());
                }
                CpuState::Running | CpuState::Halted => prop_assert!(result.is_ok()),
                CpuState::Ready => prop_assert!(false, "cpu fell back to Ready"),
            }
        }
    }
}

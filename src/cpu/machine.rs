//! The CPU: owns registers and memory and drives fetch-decode-execute.

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, trace};
use crate::config::CpuConfig;
use crate::cpu::decode::{self, DecodeError, Instruction};
use crate::cpu::execute::{self, ExecuteError, ExecutionResult};
use crate::cpu::memory::{self, Memory};
use crate::cpu::registers::Registers;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Loaded but not started.
    Ready,
    /// Executing instructions.
    Running,
    /// Executed HLT or was halted externally.
    Halted,
    /// Stopped on an error; see [`Cpu::fault`].
    Faulted,
}

impl CpuState {
    /// Halted and Faulted accept no further steps.
    pub fn is_terminal(self) -> bool {
        matches!(self, CpuState::Halted | CpuState::Faulted)
    }
}

/// Where and why the CPU faulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Address of the instruction that failed.
    pub pc: u16,
    pub error: CpuError,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at PC={:#06x}: {}", self.error.kind(), self.pc, self.error)
    }
}

/// The CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    state: CpuState,
    cycles: u64,
    last_instr: Option<Instruction>,
    fault: Option<Fault>,
}

impl Cpu {
    /// Create a CPU around `mem` with zeroed registers, PC = 0 and SP at
    /// the top of memory. The CPU starts in [`CpuState::Ready`].
    pub fn new(mem: Memory) -> Self {
        let mut regs = Registers::new();
        regs.set_sp(memory::stack_top(mem.capacity()));

        Self {
            regs,
            mem,
            state: CpuState::Ready,
            cycles: 0,
            last_instr: None,
            fault: None,
        }
    }

    /// Create a CPU with empty memory sized by `config`.
    pub fn with_config(config: &CpuConfig) -> Self {
        Self::new(Memory::new(config.memory_size, config.endian))
    }

    /// Current execution state.
    pub fn state(&self) -> CpuState {
        self.state
    }

    /// Instructions retired so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// The fault that stopped the CPU, if any.
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    pub fn is_faulted(&self) -> bool {
        self.state == CpuState::Faulted
    }

    /// Ready -> Running. A no-op when already running.
    pub fn start(&mut self) -> Result<(), CpuError> {
        match self.state {
            CpuState::Ready => {
                debug!(pc = self.regs.pc(), sp = self.regs.sp(), "cpu started");
                self.state = CpuState::Running;
                Ok(())
            }
            CpuState::Running => Ok(()),
            state => Err(CpuError::AlreadyTerminated(state)),
        }
    }

    /// Stop the CPU from outside. Has no effect once terminated.
    pub fn halt(&mut self) {
        if !self.state.is_terminal() {
            debug!(pc = self.regs.pc(), "cpu halted externally");
            self.state = CpuState::Halted;
        }
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed. On a decode or execute
    /// error the CPU moves to [`CpuState::Faulted`] with PC left on the
    /// failing instruction. Stepping a halted or faulted CPU fails with
    /// [`CpuError::AlreadyTerminated`] and changes nothing.
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        match self.state {
            CpuState::Running => {}
            CpuState::Ready => return Err(CpuError::NotStarted),
            state => return Err(CpuError::AlreadyTerminated(state)),
        }

        // Fetch + decode
        let pc = self.regs.pc();
        let instr = match decode::decode(&self.mem, pc) {
            Ok(instr) => instr,
            Err(e) => return Err(self.enter_fault(pc, e.into())),
        };

        // Execute
        let result = match execute::execute(&instr, &mut self.regs, &mut self.mem) {
            Ok(result) => result,
            Err(e) => return Err(self.enter_fault(pc, e.into())),
        };

        self.cycles += 1;
        self.last_instr = Some(instr);
        trace!(pc, %instr, "executed");

        match result {
            ExecutionResult::Continue => self.regs.set_pc(pc.wrapping_add(instr.len())),
            ExecutionResult::Jump(target) => self.regs.set_pc(target),
            ExecutionResult::Halt => {
                debug!(pc, cycles = self.cycles, "cpu halted");
                self.state = CpuState::Halted;
            }
        }

        Ok(instr)
    }

    /// Run until halt or fault.
    ///
    /// Returns the number of instructions executed. A CPU that was never
    /// started fails with [`CpuError::NotStarted`]; a halted or faulted one
    /// returns `Ok(0)`.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        if self.state == CpuState::Ready {
            return Err(CpuError::NotStarted);
        }
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        if self.state == CpuState::Ready {
            return Err(CpuError::NotStarted);
        }
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    fn enter_fault(&mut self, pc: u16, error: CpuError) -> CpuError {
        debug!(pc, kind = %error.kind(), %error, "cpu faulted");
        self.state = CpuState::Faulted;
        self.fault = Some(Fault { pc, error: error.clone() });
        error
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::with_config(&CpuConfig::default())
    }
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("fault", &self.fault)
            .finish()
    }
}

/// Error categories reported to the embedding driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    OutOfBounds,
    InvalidOpcode,
    TruncatedInstruction,
    InvalidOperand,
    AlreadyTerminated,
    NotStarted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CpuError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("execution error: {0}")]
    Execute(#[from] ExecuteError),

    #[error("CPU has not been started")]
    NotStarted,

    #[error("CPU already terminated: {0:?}")]
    AlreadyTerminated(CpuState),
}

impl CpuError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CpuError::Decode(DecodeError::InvalidOpcode { .. }) => ErrorKind::InvalidOpcode,
            CpuError::Decode(DecodeError::TruncatedInstruction { .. }) => ErrorKind::TruncatedInstruction,
            CpuError::Execute(_) => ErrorKind::InvalidOperand,
            CpuError::NotStarted => ErrorKind::NotStarted,
            CpuError::AlreadyTerminated(_) => ErrorKind::AlreadyTerminated,
        }
    }
}

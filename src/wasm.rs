//! WebAssembly bindings.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.

use wasm_bindgen::prelude::*;
use crate::{Cpu, CpuConfig, CpuError, Endian, Reg};
use crate::program::{disassemble, format_instruction, load_image};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn js_error(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

/// WebAssembly-friendly CPU wrapper.
#[wasm_bindgen]
pub struct WasmCpu {
    cpu: Cpu,
    config: CpuConfig,
    image: Vec<u8>,
    load_address: u16,
}

#[wasm_bindgen]
impl WasmCpu {
    /// Create a CPU with `memory_size` bytes of memory.
    #[wasm_bindgen(constructor)]
    pub fn new(memory_size: usize, big_endian: bool) -> Result<WasmCpu, JsError> {
        let config = CpuConfig {
            memory_size,
            endian: if big_endian { Endian::Big } else { Endian::Little },
        };
        config.validate().map_err(js_error)?;

        Ok(Self {
            cpu: Cpu::with_config(&config),
            config,
            image: Vec::new(),
            load_address: 0,
        })
    }

    /// Load an image, replacing the current machine. Returns the image size.
    #[wasm_bindgen]
    pub fn load_image(&mut self, bytes: &[u8], load_address: u16) -> Result<usize, JsError> {
        self.cpu = load_image(bytes, load_address, None, &self.config).map_err(js_error)?;
        self.image = bytes.to_vec();
        self.load_address = load_address;
        Ok(bytes.len())
    }

    /// Reload the last image into a fresh machine.
    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsError> {
        self.cpu = load_image(&self.image, self.load_address, None, &self.config).map_err(js_error)?;
        Ok(())
    }

    #[wasm_bindgen]
    pub fn start(&mut self) -> Result<(), JsError> {
        self.cpu.start().map_err(js_error)
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let instr = self.cpu.step().map_err(js_error)?;
        Ok(format_instruction(&instr))
    }

    /// Run until halt, fault or `max_cycles`. Returns the total cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u64, JsError> {
        // Faults are surfaced through `state` and `fault`.
        if let Err(CpuError::NotStarted) = self.cpu.run_limited(max_cycles as u64) {
            return Err(js_error(CpuError::NotStarted));
        }
        Ok(self.cpu.cycles())
    }

    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles()
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.cpu.state())
    }

    /// Fault description, or an empty string.
    #[wasm_bindgen]
    pub fn fault(&self) -> String {
        self.cpu.fault().map(|f| f.to_string()).unwrap_or_default()
    }

    #[wasm_bindgen]
    pub fn pc(&self) -> u16 {
        self.cpu.regs.pc()
    }

    /// Read a register by name (`R0`-`R7`, `SP`, `PC`, `FLAGS`).
    #[wasm_bindgen]
    pub fn register(&self, name: &str) -> Result<u16, JsError> {
        Reg::ALL
            .iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(name))
            .map(|&reg| self.cpu.regs.get(reg))
            .ok_or_else(|| JsError::new(&format!("unknown register '{}'", name)))
    }

    /// Get registers as JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.cpu.regs).map_err(js_error)
    }

    /// Copy of `len` bytes of memory from `start`, clamped to capacity.
    #[wasm_bindgen]
    pub fn memory(&self, start: usize, len: usize) -> Vec<u8> {
        self.cpu.mem.dump(start, len).to_vec()
    }

    /// Disassemble the loaded image.
    #[wasm_bindgen]
    pub fn disassemble(&self) -> String {
        disassemble(&self.cpu.mem, self.load_address, self.image.len())
    }
}

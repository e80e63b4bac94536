//! mmcpu - CLI Entry Point
//!
//! Commands:
//! - `mmcpu run <image>` - Load an image and run it until it halts or faults
//! - `mmcpu disasm <image>` - Disassemble an image
//! - `mmcpu isa` - Print the instruction table

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use mmcpu::cpu::isa::{format_table, ISA_VERSION, OPCODE_TABLE};
use mmcpu::{Cpu, CpuConfig, CpuState, Endian, ErrorKind, ProgramImage, Reg};

#[derive(Parser)]
#[command(name = "mmcpu")]
#[command(version)]
#[command(about = "A minimal 16-bit virtual CPU")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an image until it halts or faults
    Run {
        /// Raw binary image, or a `.json` program image
        image: String,
        /// Address to load a raw image at
        #[arg(short, long, default_value = "0", value_parser = parse_u16)]
        load_address: u16,
        /// Start address (defaults to the load address)
        #[arg(short, long, value_parser = parse_u16)]
        entry: Option<u16>,
        /// Memory size in bytes (1-65536)
        #[arg(short = 's', long)]
        memory_size: Option<usize>,
        /// Byte order: little or big
        #[arg(long)]
        endian: Option<Endian>,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<String>,
        /// Stop after this many instructions
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Log every executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Disassemble an image to readable text
    Disasm {
        /// Raw binary image, or a `.json` program image
        image: String,
        /// Address to load a raw image at
        #[arg(short, long, default_value = "0", value_parser = parse_u16)]
        load_address: u16,
        /// Byte order: little or big
        #[arg(long)]
        endian: Option<Endian>,
    },
    /// Print the instruction table
    Isa {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Accept decimal or `0x`-prefixed hex.
fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn init_tracing(trace: bool) {
    let default = if trace { "mmcpu=trace" } else { "mmcpu=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            image,
            load_address,
            entry,
            memory_size,
            endian,
            config,
            max_cycles,
            trace,
            json,
        } => {
            init_tracing(trace);
            let config = build_config(config.as_deref(), memory_size, endian);
            run_image(&image, load_address, entry, &config, max_cycles, json);
        }
        Commands::Disasm { image, load_address, endian } => {
            init_tracing(false);
            let config = build_config(None, None, endian);
            disassemble_image(&image, load_address, &config);
        }
        Commands::Isa { json } => print_isa(json),
    }
}

/// Configuration file first, then command-line overrides.
fn build_config(path: Option<&str>, memory_size: Option<usize>, endian: Option<Endian>) -> CpuConfig {
    let mut config = match path {
        Some(path) => match CpuConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => CpuConfig::default(),
    };

    if let Some(size) = memory_size {
        config.memory_size = size;
    }
    if let Some(endian) = endian {
        config.endian = endian;
    }
    config
}

fn read_image(path: &str, load_address: u16) -> ProgramImage {
    match ProgramImage::read(path, load_address) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Failed to read image {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn load_cpu(image: &ProgramImage, config: &CpuConfig) -> Cpu {
    match image.load(config) {
        Ok(cpu) => cpu,
        Err(e) => {
            eprintln!("❌ Failed to load image: {}", e);
            std::process::exit(1);
        }
    }
}

/// Final machine state, as printed by `run --json`.
#[derive(Serialize)]
struct RunReport {
    state: CpuState,
    cycles: u64,
    pc: u16,
    sp: u16,
    flags: String,
    registers: Vec<u16>,
    fault: Option<FaultReport>,
}

#[derive(Serialize)]
struct FaultReport {
    kind: ErrorKind,
    pc: u16,
    message: String,
}

impl RunReport {
    fn from_cpu(cpu: &Cpu) -> Self {
        Self {
            state: cpu.state(),
            cycles: cpu.cycles(),
            pc: cpu.regs.pc(),
            sp: cpu.regs.sp(),
            flags: cpu.regs.flags().to_string(),
            registers: cpu.regs.gprs().to_vec(),
            fault: cpu.fault().map(|fault| FaultReport {
                kind: fault.error.kind(),
                pc: fault.pc,
                message: fault.error.to_string(),
            }),
        }
    }
}

fn run_image(
    path: &str,
    load_address: u16,
    entry: Option<u16>,
    config: &CpuConfig,
    max_cycles: Option<u64>,
    json: bool,
) {
    let mut image = read_image(path, load_address);
    if entry.is_some() {
        image.entry = entry;
    }
    let mut cpu = load_cpu(&image, config);

    if let Err(e) = cpu.start() {
        eprintln!("❌ Failed to start CPU: {}", e);
        std::process::exit(1);
    }

    // A fault is recorded on the CPU; the report below covers it.
    let _ = match max_cycles {
        Some(limit) => cpu.run_limited(limit),
        None => cpu.run(),
    };

    if json {
        match serde_json::to_string_pretty(&RunReport::from_cpu(&cpu)) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("❌ Failed to encode report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print_state(&cpu);
        if cpu.is_running() {
            println!();
            println!("⚠️  Reached max cycles limit. Use --max-cycles to increase.");
        }
    }

    if let Some(fault) = cpu.fault() {
        if !json {
            eprintln!("❌ {}", fault);
        }
        std::process::exit(1);
    }
}

fn print_state(cpu: &Cpu) {
    println!("━━━ Result ━━━");
    println!("State:  {:?}", cpu.state());
    println!("Cycles: {}", cpu.cycles());
    println!("PC:     {:#06x}", cpu.regs.pc());
    println!("SP:     {:#06x}", cpu.regs.sp());
    println!("FLAGS:  {} ({:#06x})", cpu.regs.flags(), cpu.regs.get(Reg::Flags));
    for (index, value) in cpu.regs.gprs().iter().enumerate() {
        println!("R{}:     {:#06x} ({})", index, value, *value as i16);
    }
    if let Some(instr) = cpu.last_instruction() {
        println!("Last:   {}", instr);
    }
}

fn disassemble_image(path: &str, load_address: u16, config: &CpuConfig) {
    let image = read_image(path, load_address);
    let cpu = load_cpu(&image, config);

    println!("📖 Disassembling: {}", path);
    println!();
    print!("{}", mmcpu::disassemble(&cpu.mem, image.load_address, image.len()));
}

fn print_isa(json: bool) {
    if json {
        let doc = serde_json::json!({
            "isa_version": ISA_VERSION,
            "opcodes": &OPCODE_TABLE[..],
        });
        match serde_json::to_string_pretty(&doc) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("❌ Failed to encode table: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        println!("mmcpu ISA version {}", ISA_VERSION);
        println!();
        print!("{}", format_table());
    }
}

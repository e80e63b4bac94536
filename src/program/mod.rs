//! Program images: loading into a CPU, image files and disassembly.

pub mod disasm;
pub mod image;
pub mod loader;

pub use disasm::{disassemble, disassemble_at, format_instruction, listing, ListingLine};
pub use image::{ImageError, ProgramImage};
pub use loader::{load_image, LoadError};

pub mod assembler;
pub mod emulator;
pub mod isa;
mod utils;

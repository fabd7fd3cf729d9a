//! Host-side on-chip debugger for the FP51 8051-compatible soft CPU.
//!
//! Talks to the target over a CRC-framed serial link and exposes a console
//! for reset/pause/step control, code and data memory access, breakpoints,
//! HEX-file loading, and disassembly.

pub mod addr_map;
pub mod code_mem;
pub mod config;
pub mod console;
pub mod crc;
pub mod disasm;
pub mod error;
pub mod frame;
pub mod hex;
pub mod hex_loader;
pub mod lineedit;
pub mod link;
pub mod transport;

//! An emulator for a small 8-bit stored-program computer.
//!
//! [`memory`] provides the flat byte-addressable RAM and the program
//! loader, [`processor`] the register file and the fetch-decode-execute
//! loop. A program is a flat image of bytes loaded at address zero; the
//! processor runs it until a `HLT` instruction or a fault.

pub mod memory;
pub mod processor;

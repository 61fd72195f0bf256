use std::env;
use std::io;

use color_eyre::eyre::Result;
use log::*;
use simple_logger::SimpleLogger;

use emu8::memory::{parse, Byte, Ram};
use emu8::processor::Processor;

/// Fallback image when no program file is given: LDI r0, 8; PRN r0; HLT.
const DEMO_IMAGE: &[Byte] = &[0b10000010, 0, 8, 0b01000111, 0, 0b00000001];

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap(); // logging

    let image = match env::args().nth(1) {
        Some(path) => parse::load_file(path)?,
        None => {
            info!("no program file given, running the built-in demo");
            DEMO_IMAGE.to_vec()
        }
    };

    let mut memory = Ram::default();
    memory.load(0, &image)?;
    memory.dump();

    let mut cpu = Processor::new(memory);
    let stdout = io::stdout();
    cpu.run(&mut stdout.lock())?;

    Ok(())
}

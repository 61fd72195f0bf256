use std::io;

use color_eyre::eyre::Result;

use emu8::memory::Ram;
use emu8::processor::Processor;
use emu8::write_instructions;
use simple_logger::SimpleLogger;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new().init().unwrap(); // logging

    let mut mem = Ram::default();

    use emu8::processor::Instruction::*;
    write_instructions!(mem : 0 =>
        LDI, 0, 8,
        PRN, 0,
        HLT
    );

    let mut cpu = Processor::new(mem);
    let stdout = io::stdout();
    cpu.run(&mut stdout.lock())?;

    Ok(())
}

use std::io;

use color_eyre::eyre::Result;

use emu8::memory::Ram;
use emu8::processor::Processor;
use emu8::write_instructions;
use log::LevelFilter;
use simple_logger::SimpleLogger;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Debug)
        .init()
        .unwrap(); // logging

    let mut mem = Ram::default();

    // the subroutine at 13 pushes and pops r1, so the PRN after the CALL
    // sees it unchanged
    use emu8::processor::Instruction::*;
    write_instructions!(mem : 0 =>
        LDI, 1, 42,
        LDI, 2, 13,
        CALL, 2,
        PRN, 1,
        HLT,
        0, 0,
        PUSH, 1,
        POP, 1,
        RET
    );

    let mut cpu = Processor::new(mem);
    let stdout = io::stdout();
    cpu.run(&mut stdout.lock())?;

    Ok(())
}

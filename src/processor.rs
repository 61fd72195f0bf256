use std::convert::TryFrom;
use std::error;
use std::fmt;
use std::io::Write;

use crate::memory::{Byte, OutOfBounds, Ram, RAM_SIZE};
use log::*;
use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;

/// Register contents. Registers hold plain integers; arithmetic is not
/// clamped to the 8-bit range of a memory cell.
pub type Value = i64;

/// Number of register slots.
pub const NUM_REGISTERS: usize = 8;

/// Operand byte count encoded in the two high bits of an opcode.
fn operand_count(opcode: Byte) -> usize {
    ((opcode >> 6) & 0b11) as usize
}

macro_rules! instructions {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $repr:literal , )+ ) => {
        /// Defines the instruction set
        /// The two high bits of every opcode encode its operand-byte count
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Instruction {
            $(
                $( #[doc = $doc] )+
                $name = $repr,
            )+
        }

        impl Instruction {
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name) , )+
                }
            }
        }

        impl ::std::fmt::Display for Instruction {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $( Self::$name => f.write_str(stringify!($name)) , )+
                }
            }
        }
    }
}

instructions! {
    /// Stop the fetch-execute loop
    HLT = 0b00000001,
    /// Return from a subroutine to the address on top of the stack
    RET = 0b00010001,
    /// Push a register's value onto the stack
    /// @param register Cell holding the source register index
    PUSH = 0b01000101,
    /// Pop the value on top of the stack into a register
    /// @param register Cell holding the destination register index
    POP = 0b01000110,
    /// Print a register's value as a decimal integer on its own line
    /// @param register Cell holding the register index to print
    PRN = 0b01000111,
    /// Call the subroutine whose address is held in a register
    /// @param register Cell holding the register index with the target address
    CALL = 0b01010000,
    /// Load an immediate byte into a register
    /// @param register Cell holding the destination register index
    /// @param value The literal byte to load
    LDI = 0b10000010,
    /// Add two registers, storing the result in the first
    /// @param register Cell holding the first register index
    /// @param register Cell holding the second register index
    ADD = 0b10100000,
    /// Subtract the second register from the first, storing the result in the first
    /// @param register Cell holding the first register index
    /// @param register Cell holding the second register index
    SUB = 0b10100001,
    /// Multiply two registers, storing the result in the first
    /// @param register Cell holding the first register index
    /// @param register Cell holding the second register index
    MUL = 0b10100010,
    /// Divide the first register by the second, storing the integer quotient in the first
    /// @param register Cell holding the first register index
    /// @param register Cell holding the second register index
    DIV = 0b10100011,
    /// Reduce the first register modulo the second, storing the result in the first
    /// @param register Cell holding the first register index
    /// @param register Cell holding the second register index
    MOD = 0b10100100,
}

impl Instruction {
    /// Number of operand bytes following this opcode
    pub fn operands(self) -> usize {
        operand_count(u8::from(self))
    }
}

/// Access to a register index outside of `[0, NUM_REGISTERS)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRegister {
    pub index: Byte,
}

impl fmt::Display for InvalidRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "register file has no register `{}`", self.index)
    }
}

impl error::Error for InvalidRegister {}

/// The register file: five general-purpose registers followed by the three
/// reserved slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registers {
    slots: [Value; NUM_REGISTERS],
}

impl Default for Registers {
    fn default() -> Self {
        let mut slots = [0; NUM_REGISTERS];
        slots[Self::STACK_POINTER as usize] = Self::STACK_BASE;
        Self { slots }
    }
}

impl Registers {
    /// Interrupt mask register. Reserved; no instruction touches it.
    pub const INTERRUPT_MASK: Byte = 5;
    /// Interrupt status register. Reserved; no instruction touches it.
    pub const INTERRUPT_STATUS: Byte = 6;
    /// Stack pointer register.
    pub const STACK_POINTER: Byte = 7;
    /// Initial stack pointer value. The stack grows toward lower addresses.
    pub const STACK_BASE: Value = 0xF4;

    /// Reads a register
    pub fn get(&self, index: Byte) -> Result<Value, InvalidRegister> {
        self.slots
            .get(index as usize)
            .copied()
            .ok_or(InvalidRegister { index })
    }

    /// Writes a register
    pub fn set(&mut self, index: Byte, value: Value) -> Result<(), InvalidRegister> {
        match self.slots.get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(InvalidRegister { index }),
        }
    }

    /// All register slots in index order
    pub fn slots(&self) -> &[Value; NUM_REGISTERS] {
        &self.slots
    }
}

/// The condition that aborted a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// The fetched opcode has no handler.
    UnsupportedInstruction { opcode: Byte },
    /// The operation tag handed to the ALU is not an arithmetic instruction.
    UnsupportedOperation { op: Instruction },
    /// A register index outside of the register file was used.
    InvalidRegister { index: Byte },
    /// A memory address outside of RAM was used.
    OutOfBounds { address: i64 },
    /// The divisor register held zero.
    DivisionByZero { op: Instruction },
    /// A register value outside of [0, 255] was stored into a memory cell.
    ValueOutOfRange { value: Value },
    /// The console output channel failed.
    Output { message: String },
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::UnsupportedInstruction { opcode } => {
                write!(f, "no handler for opcode `0x{:02X}`", opcode)
            }
            FaultKind::UnsupportedOperation { op } => {
                write!(f, "`{}` is not an arithmetic operation", op)
            }
            FaultKind::InvalidRegister { index } => {
                write!(f, "register file has no register `{}`", index)
            }
            FaultKind::OutOfBounds { address } => {
                write!(f, "memory has no address `{}`", address)
            }
            FaultKind::DivisionByZero { op } => write!(f, "division by zero in `{}`", op),
            FaultKind::ValueOutOfRange { value } => {
                write!(f, "value `{}` does not fit in a memory cell", value)
            }
            FaultKind::Output { message } => write!(f, "output channel failure: {}", message),
        }
    }
}

impl From<OutOfBounds> for FaultKind {
    fn from(err: OutOfBounds) -> Self {
        FaultKind::OutOfBounds {
            address: err.address,
        }
    }
}

impl From<InvalidRegister> for FaultKind {
    fn from(err: InvalidRegister) -> Self {
        FaultKind::InvalidRegister { index: err.index }
    }
}

/// A fatal execution error. Carries the program counter at the time of the
/// fault; there is no recovery, the run loop is torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub pc: usize,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault [pc: 0x{:02X}]: {}", self.pc, self.kind)
    }
}

impl error::Error for Fault {}

/// Emulates a CPU
///
/// Owns its memory and register file; independent instances do not share
/// any state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processor {
    /// The RAM, populated with the program image before [`Processor::run`]
    pub memory: Ram,
    /// The register file
    pub registers: Registers,
    /// Program counter
    pub pc: usize,
    /// Instruction register, the most recently fetched opcode
    pub ir: Byte,
    /// Cleared by the HLT instruction to stop the run loop
    pub running: bool,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(Ram::default())
    }
}

impl Processor {
    /// Initializes a new CPU around an already loaded memory
    pub fn new(memory: Ram) -> Self {
        Self {
            memory,
            registers: Registers::default(),
            pc: 0,
            ir: 0,
            running: false,
        }
    }

    fn fault<K: Into<FaultKind>>(&self, kind: K) -> Fault {
        Fault {
            kind: kind.into(),
            pc: self.pc,
        }
    }

    /// Converts a register value into a RAM address
    fn address(&self, value: Value) -> Result<usize, Fault> {
        usize::try_from(value)
            .ok()
            .filter(|&address| address < RAM_SIZE)
            .ok_or_else(|| self.fault(OutOfBounds { address: value }))
    }

    /// Converts a register value into a storable memory cell
    fn cell(&self, value: Value) -> Result<Byte, Fault> {
        Byte::try_from(value).map_err(|_| self.fault(FaultKind::ValueOutOfRange { value }))
    }

    /// Advances the program counter past the current instruction and its
    /// operand bytes. Not applied by CALL and RET, which set the program
    /// counter themselves.
    fn advance(&mut self) {
        self.pc += operand_count(self.ir) + 1;
    }

    /// Performs an arithmetic operation on the two registers whose indices
    /// are stored at `addr_a` and `addr_b`, writing the result back into
    /// the first. Operands are memory addresses, not register indices; the
    /// indirection is part of the program encoding.
    pub fn alu(&mut self, op: Instruction, addr_a: usize, addr_b: usize) -> Result<(), Fault> {
        let reg_a = self.memory.read(addr_a).map_err(|e| self.fault(e))?;
        let reg_b = self.memory.read(addr_b).map_err(|e| self.fault(e))?;
        let a = self.registers.get(reg_a).map_err(|e| self.fault(e))?;
        let b = self.registers.get(reg_b).map_err(|e| self.fault(e))?;

        let result = match op {
            Instruction::ADD => a.wrapping_add(b),
            Instruction::SUB => a.wrapping_sub(b),
            Instruction::MUL => a.wrapping_mul(b),
            Instruction::DIV => {
                if b == 0 {
                    return Err(self.fault(FaultKind::DivisionByZero { op }));
                }
                a.wrapping_div(b)
            }
            Instruction::MOD => {
                if b == 0 {
                    return Err(self.fault(FaultKind::DivisionByZero { op }));
                }
                a.wrapping_rem_euclid(b)
            }
            other => return Err(self.fault(FaultKind::UnsupportedOperation { op: other })),
        };

        self.registers.set(reg_a, result).map_err(|e| self.fault(e))?;

        debug!("{} r{} r{}: {}", op, reg_a, reg_b, result);

        Ok(())
    }

    fn ldi(&mut self) -> Result<(), Fault> {
        let reg = self.memory.read(self.pc + 1).map_err(|e| self.fault(e))?;
        let value = self.memory.read(self.pc + 2).map_err(|e| self.fault(e))?;
        self.registers
            .set(reg, Value::from(value))
            .map_err(|e| self.fault(e))?;

        debug!("LDI r{}: {}", reg, value);

        Ok(())
    }

    fn prn<W: Write>(&mut self, out: &mut W) -> Result<(), Fault> {
        let reg = self.memory.read(self.pc + 1).map_err(|e| self.fault(e))?;
        let value = self.registers.get(reg).map_err(|e| self.fault(e))?;
        writeln!(out, "{}", value).map_err(|e| {
            self.fault(FaultKind::Output {
                message: e.to_string(),
            })
        })?;

        debug!("PRN r{}", reg);

        Ok(())
    }

    fn hlt(&mut self) {
        self.running = false;

        debug!("HLT");
    }

    fn push(&mut self) -> Result<(), Fault> {
        let sp = self
            .registers
            .get(Registers::STACK_POINTER)
            .map_err(|e| self.fault(e))?
            - 1;
        self.registers
            .set(Registers::STACK_POINTER, sp)
            .map_err(|e| self.fault(e))?;

        let reg = self.memory.read(self.pc + 1).map_err(|e| self.fault(e))?;
        let value = self.registers.get(reg).map_err(|e| self.fault(e))?;
        let address = self.address(sp)?;
        let cell = self.cell(value)?;
        self.memory.write(address, cell).map_err(|e| self.fault(e))?;

        debug!("PUSH r{}: {}", reg, value);

        Ok(())
    }

    fn pop(&mut self) -> Result<(), Fault> {
        let sp = self
            .registers
            .get(Registers::STACK_POINTER)
            .map_err(|e| self.fault(e))?;
        let address = self.address(sp)?;
        let value = self.memory.read(address).map_err(|e| self.fault(e))?;

        let reg = self.memory.read(self.pc + 1).map_err(|e| self.fault(e))?;
        self.registers
            .set(reg, Value::from(value))
            .map_err(|e| self.fault(e))?;
        self.registers
            .set(Registers::STACK_POINTER, sp + 1)
            .map_err(|e| self.fault(e))?;

        debug!("POP r{}: {}", reg, value);

        Ok(())
    }

    fn call(&mut self) -> Result<(), Fault> {
        let ret = self.pc + operand_count(self.ir) + 1;

        let sp = self
            .registers
            .get(Registers::STACK_POINTER)
            .map_err(|e| self.fault(e))?
            - 1;
        self.registers
            .set(Registers::STACK_POINTER, sp)
            .map_err(|e| self.fault(e))?;
        let address = self.address(sp)?;
        let cell = self.cell(ret as Value)?;
        self.memory.write(address, cell).map_err(|e| self.fault(e))?;

        let reg = self.memory.read(self.pc + 1).map_err(|e| self.fault(e))?;
        let target = self.registers.get(reg).map_err(|e| self.fault(e))?;
        self.pc = self.address(target)?;

        debug!("CALL r{}: 0x{:02X}", reg, self.pc);

        Ok(())
    }

    fn ret(&mut self) -> Result<(), Fault> {
        let sp = self
            .registers
            .get(Registers::STACK_POINTER)
            .map_err(|e| self.fault(e))?;
        let address = self.address(sp)?;
        let target = self.memory.read(address).map_err(|e| self.fault(e))?;
        self.pc = target as usize;
        self.registers
            .set(Registers::STACK_POINTER, sp + 1)
            .map_err(|e| self.fault(e))?;

        debug!("RET: 0x{:02X}", self.pc);

        Ok(())
    }

    /// Fetches, decodes and executes a single instruction
    pub fn step<W: Write>(&mut self, out: &mut W) -> Result<(), Fault> {
        self.trace();

        self.ir = self.memory.read(self.pc).map_err(|e| self.fault(e))?;
        let instruction = Instruction::try_from(self.ir)
            .map_err(|_| self.fault(FaultKind::UnsupportedInstruction { opcode: self.ir }))?;

        match instruction {
            Instruction::LDI => {
                self.ldi()?;
                self.advance();
            }
            Instruction::PRN => {
                self.prn(out)?;
                self.advance();
            }
            Instruction::HLT => {
                self.hlt();
                self.advance();
            }
            Instruction::ADD
            | Instruction::SUB
            | Instruction::MUL
            | Instruction::DIV
            | Instruction::MOD => {
                self.alu(instruction, self.pc + 1, self.pc + 2)?;
                self.advance();
            }
            Instruction::PUSH => {
                self.push()?;
                self.advance();
            }
            Instruction::POP => {
                self.pop()?;
                self.advance();
            }
            Instruction::CALL => self.call()?,
            Instruction::RET => self.ret()?,
        }

        Ok(())
    }

    /// Runs the fetch-execute loop until HLT clears the running flag
    ///
    /// PRN writes its lines to `out`. A fault aborts the loop and carries
    /// the program counter at which it was raised.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<(), Fault> {
        self.running = true;

        while self.running {
            self.step(out)?;
        }

        Ok(())
    }

    /// Logs the CPU state: pc, the three cells starting at pc and the
    /// register file
    pub fn trace(&self) {
        let at = |offset: usize| self.memory.read(self.pc + offset).unwrap_or(0);
        let regs = self
            .registers
            .slots()
            .iter()
            .map(|value| format!("{:02X}", value))
            .collect::<Vec<_>>()
            .join(" ");

        trace!(
            "TRACE: {:02X} | {:02X} {:02X} {:02X} | {}",
            self.pc,
            at(0),
            at(1),
            at(2),
            regs
        );
    }
}

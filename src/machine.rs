//! Structures and functions for the machine itself: the register file, the flat
//! data memory, the loaded program, and the fetch-decode-execute loop that drives
//! them.

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use prettytable::{format as TableFormat, Table};
use thiserror::Error;

use crate::bytecode::{decode_instruction, Instruction, InstructionWord, RegisterIndex};

/// Number of slots in the register file.
pub const NUM_REGISTERS: usize = 4;
/// Size of the data memory in words, not bytes.
pub const RAM_SIZE: usize = 65535;

/// Registers and memory hold 32 bit signed integers.
pub type RegisterValue = i32;
/// An index into the program, counted in instruction words.
pub type ProgramCounter = usize;

/**
  A fault stops the machine. Every condition the instruction stream can provoke is
  enumerated here; a fault is always a defect in the loaded program, never in the
  machine, so none of them are recoverable.
*/
#[derive(Error, Clone, Copy, Eq, PartialEq, Debug)]
pub enum Fault {
  #[error("register index {index} is outside the register file")]
  RegisterOutOfRange { index: RegisterIndex },

  #[error("memory address {address} is outside ram")]
  MemoryOutOfRange { address: RegisterValue },

  #[error("program counter {target} is outside the {len} word program")]
  ProgramCounterOutOfRange { target: i64, len: usize },

  #[error("division by zero")]
  DivisionByZero,
}

/// What the trace hook sees after each cycle completes.
pub struct Cycle<'a> {
  /// The program counter after this cycle's fetch, before any branch.
  pub pc: ProgramCounter,
  /// The raw instruction word that was executed.
  pub word: InstructionWord,
  /// The register file after the instruction's effect.
  pub registers: &'a [RegisterValue],
}

/// An observation hook invoked once per executed cycle. Execution semantics are
/// identical with or without one installed.
pub type Tracer = Box<dyn FnMut(&Cycle)>;

pub struct Machine {

  // Memory stores
  registers : [RegisterValue; NUM_REGISTERS], // The register file
  ram       : Vec<RegisterValue>,             // Flat data memory
  program   : Vec<InstructionWord>,           // Instruction memory, immutable after load

  // Cursors and flags
  pc      : ProgramCounter,
  running : bool,
  cycles  : u64,

  // For tracing execution:
  tracer  : Option<Tracer>,

}

impl Machine {

  // region Construction and accessors

  /// A fresh machine: registers and ram zeroed, program counter zero, running.
  pub fn new(program: Vec<InstructionWord>) -> Machine {
    Machine {
      registers : [0; NUM_REGISTERS],
      ram       : vec![0; RAM_SIZE],
      program,
      pc        : 0,
      running   : true,
      cycles    : 0,
      tracer    : None,
    }
  }

  pub fn set_tracer(&mut self, tracer: Tracer) {
    self.tracer = Some(tracer);
  }

  pub fn register(&self, index: RegisterIndex) -> Result<RegisterValue, Fault> {
    self.registers
        .get(index as usize)
        .copied()
        .ok_or(Fault::RegisterOutOfRange { index })
  }

  pub fn set_register(&mut self, index: RegisterIndex, value: RegisterValue)
    -> Result<(), Fault>
  {
    match self.registers.get_mut(index as usize) {
      Some(slot) => {
        *slot = value;
        Ok(())
      }
      None => Err(Fault::RegisterOutOfRange { index }),
    }
  }

  /// Reads the ram word addressed by a register-held value.
  pub fn load(&self, address: RegisterValue) -> Result<RegisterValue, Fault> {
    let index = self.ram_index(address)?;
    Ok(self.ram[index])
  }

  /// Writes the ram word addressed by a register-held value.
  pub fn store(&mut self, address: RegisterValue, value: RegisterValue)
    -> Result<(), Fault>
  {
    let index = self.ram_index(address)?;
    self.ram[index] = value;
    Ok(())
  }

  pub fn pc(&self) -> ProgramCounter {
    self.pc
  }

  /// Overwrites the program counter. A value outside the program is caught by
  /// the next fetch.
  pub fn set_pc(&mut self, pc: ProgramCounter) {
    self.pc = pc;
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  /// Cycles executed so far, the halt cycle included.
  pub fn cycles(&self) -> u64 {
    self.cycles
  }

  /// Clears the running flag. Nothing but this and the halt instruction does.
  pub fn halt(&mut self) {
    self.running = false;
  }

  /// Addresses are register values and may be negative; both negative and
  /// past-the-end addresses are the same fault.
  fn ram_index(&self, address: RegisterValue) -> Result<usize, Fault> {
    match usize::try_from(address) {
      Ok(index) if index < self.ram.len() => Ok(index),
      _ => Err(Fault::MemoryOutOfRange { address }),
    }
  }

  // endregion

  // region Fetch-decode-execute

  /// Returns the word at the program counter and advances the counter. The sole
  /// place where an out-of-range program counter is detected.
  fn fetch(&mut self) -> Result<InstructionWord, Fault> {
    let word = self.program
                   .get(self.pc)
                   .copied()
                   .ok_or(Fault::ProgramCounterOutOfRange {
                     target: self.pc as i64,
                     len: self.program.len(),
                   })?;
    self.pc += 1;
    Ok(word)
  }

  /// Redirects the program counter to a register-held target. A negative target
  /// can never be a program index and faults here; a target past the end of the
  /// program faults at the next fetch.
  fn branch_to(&mut self, target: RegisterValue) -> Result<(), Fault> {
    match usize::try_from(target) {
      Ok(pc) => {
        self.pc = pc;
        Ok(())
      }
      Err(_) => Err(Fault::ProgramCounterOutOfRange {
        target: target as i64,
        len: self.program.len(),
      }),
    }
  }

  /**
    Applies one decoded instruction to the machine state.

    All arithmetic is wrapping 32 bit signed arithmetic. `div` is the one
    arithmetic operation with a fault of its own; `wrapping_div` covers the
    remaining corner, `i32::MIN / -1`. An unrecognized opcode is a no-op,
    never an error.
  */
  fn execute(&mut self, instruction: &Instruction) -> Result<(), Fault> {
    match *instruction {

      Instruction::Halt => {
        self.halt();
      }

      Instruction::Nop => {}

      Instruction::Li { r0, immediate } => {
        self.set_register(r0, immediate as RegisterValue)?;
      }

      Instruction::Lw { r0, r1 } => {
        let value = self.load(self.register(r1)?)?;
        self.set_register(r0, value)?;
      }

      Instruction::Sw { r0, r1 } => {
        let address = self.register(r1)?;
        let value   = self.register(r0)?;
        self.store(address, value)?;
      }

      Instruction::Add { r0, r1, r2 } => {
        let value = self.register(r1)?.wrapping_add(self.register(r2)?);
        self.set_register(r0, value)?;
      }

      Instruction::Sub { r0, r1, r2 } => {
        let value = self.register(r1)?.wrapping_sub(self.register(r2)?);
        self.set_register(r0, value)?;
      }

      Instruction::Mult { r0, r1, r2 } => {
        let value = self.register(r1)?.wrapping_mul(self.register(r2)?);
        self.set_register(r0, value)?;
      }

      Instruction::Div { r0, r1, r2 } => {
        let dividend = self.register(r1)?;
        let divisor  = self.register(r2)?;
        match divisor {
          0 => return Err(Fault::DivisionByZero),
          _ => self.set_register(r0, dividend.wrapping_div(divisor))?,
        }
      }

      Instruction::J { immediate } => {
        self.pc = immediate as ProgramCounter;
      }

      Instruction::Jr { r0 } => {
        let target = self.register(r0)?;
        self.branch_to(target)?;
      }

      Instruction::Beq { r0, r1, r2 } => {
        if self.register(r0)? == self.register(r1)? {
          let target = self.register(r2)?;
          self.branch_to(target)?;
        }
      }

      Instruction::Bne { r0, r1, r2 } => {
        if self.register(r0)? != self.register(r1)? {
          let target = self.register(r2)?;
          self.branch_to(target)?;
        }
      }

      Instruction::Inc { r0 } => {
        let value = self.register(r0)?.wrapping_add(1);
        self.set_register(r0, value)?;
      }

      Instruction::Dec { r0 } => {
        let value = self.register(r0)?.wrapping_sub(1);
        self.set_register(r0, value)?;
      }

      Instruction::Unknown(_) => {}

    }
    Ok(())
  }

  /// One cycle: fetch, decode, execute, then report the cycle to the tracer. The
  /// tracer sees the post-increment program counter and the post-execution
  /// register file.
  pub fn step(&mut self) -> Result<(), Fault> {
    let word       = self.fetch()?;
    let fetched_at = self.pc;

    let instruction = decode_instruction(word);
    self.execute(&instruction)?;
    self.cycles += 1;

    if let Some(tracer) = self.tracer.as_mut() {
      tracer(&Cycle {
        pc: fetched_at,
        word,
        registers: &self.registers,
      });
    }
    Ok(())
  }

  /// Runs until the halt instruction clears the running flag or a fault stops
  /// the machine.
  pub fn run(&mut self) -> Result<(), Fault> {
    while self.running {
      self.step()?;
    }
    Ok(())
  }

  // endregion

  // region Display methods

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Value"]);

    for (i, value) in self.registers.iter().enumerate() {
      table.add_row(row![r->format!("r{} =", i), format!("{:08x}", value)]);
    }
    table
  }

  /// A window of the program around the program counter, disassembled. The row
  /// the next fetch would read is highlighted.
  fn make_program_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Word", ubl->"Instruction"]);

    let first = std::cmp::min(self.program.len(), self.pc.saturating_sub(2));
    let last  = std::cmp::min(self.program.len(), self.pc.saturating_add(3));

    for (offset, word) in self.program[first..last].iter().enumerate() {
      let address = first + offset;
      match address == self.pc {

        true => {
          table.add_row(row![
            r->format!("* --> {:#x}", address),
            format!("{:016x}", word),
            format!("{}", decode_instruction(*word))
          ]);
        }

        false => {
          table.add_row(row![
            r->format!("{:#x}", address),
            format!("{:016x}", word),
            format!("{}", decode_instruction(*word))
          ]);
        }

      } // end match on highlight
    } // end for
    table
  }

  // endregion

}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Machine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let register_table = self.make_register_table();
    let program_table  = self.make_program_table();

    let mut combined_table = table!([register_table, program_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Program"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    let state = match self.running {
      true  => "running",
      false => "halted",
    };

    write!(
      f,
      "Machine {} at pc {:#x} after {} cycles.\n{}",
      state, self.pc, self.cycles, combined_table
    )
  }
}


use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};

/// A register index as it appears in an instruction word. The register file is far
/// smaller than `u8::MAX`; indices are range checked when the register is accessed,
/// not when the instruction is decoded.
pub type RegisterIndex = u8;

/**
  Opcodes of the virtual machine.

  The discriminants are the on-the-wire opcode bytes, so a decoded opcode byte
  converts directly to a variant (`num_enum`) and a mnemonic converts to and from
  a variant (`strum`). The same table therefore drives the decoder, the assembler,
  and disassembly text.
*/
#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
  Halt = 0x0,
  Nop  = 0x1,
  Li   = 0x2,
  Lw   = 0x3,
  Sw   = 0x4,
  Add  = 0x5,
  Sub  = 0x6,
  Mult = 0x7,
  Div  = 0x8,
  J    = 0x9,
  Jr   = 0xA,
  Beq  = 0xB,
  Bne  = 0xC,
  Inc  = 0xD,
  Dec  = 0xE,
}

/// The operand shape of an opcode. Register index fields are reused contextually:
/// not every opcode interprets r0/r1/r2/immediate the same way, and the fields a
/// given opcode does not consume are ignored.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum OperandFormat {
  /// No operands.
  Nullary,
  /// One register.
  Register,
  /// A destination register and a literal.
  RegisterImmediate,
  /// Two registers.
  RegisterPair,
  /// Three registers.
  RegisterTriple,
  /// A literal only.
  Immediate,
}

impl OperandFormat {
  /// The number of operand tokens the assembler expects for this shape.
  pub fn operand_count(&self) -> usize {
    match self {
      OperandFormat::Nullary           => 0,
      OperandFormat::Register          => 1,
      OperandFormat::RegisterImmediate => 2,
      OperandFormat::RegisterPair      => 2,
      OperandFormat::RegisterTriple    => 3,
      OperandFormat::Immediate         => 1,
    }
  }
}

impl Opcode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn format(&self) -> OperandFormat {
    match self {
      Opcode::Halt
      | Opcode::Nop  => OperandFormat::Nullary,

      Opcode::Li     => OperandFormat::RegisterImmediate,

      Opcode::Lw
      | Opcode::Sw   => OperandFormat::RegisterPair,

      Opcode::Add
      | Opcode::Sub
      | Opcode::Mult
      | Opcode::Div
      | Opcode::Beq
      | Opcode::Bne  => OperandFormat::RegisterTriple,

      Opcode::J      => OperandFormat::Immediate,

      Opcode::Jr
      | Opcode::Inc
      | Opcode::Dec  => OperandFormat::Register,
    }
  }
}

/**
  Holds the decoded components of an instruction, one variant per operation. Each
  variant carries only the fields its operation consumes, so the dispatch match in
  the machine is exhaustive and the unrecognized-opcode rule is an explicit branch
  rather than an implicit fallthrough.

  An `Instruction` value is produced from one program word and lives for a single
  cycle.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Instruction {
  /// Stop execution.
  Halt,
  /// Do nothing.
  Nop,
  /// r0 <- immediate
  Li   { r0: RegisterIndex, immediate: u32 },
  /// r0 <- memory[r1]
  Lw   { r0: RegisterIndex, r1: RegisterIndex },
  /// memory[r1] <- r0
  Sw   { r0: RegisterIndex, r1: RegisterIndex },
  /// r0 <- r1 + r2
  Add  { r0: RegisterIndex, r1: RegisterIndex, r2: RegisterIndex },
  /// r0 <- r1 - r2
  Sub  { r0: RegisterIndex, r1: RegisterIndex, r2: RegisterIndex },
  /// r0 <- r1 * r2
  Mult { r0: RegisterIndex, r1: RegisterIndex, r2: RegisterIndex },
  /// r0 <- r1 / r2
  Div  { r0: RegisterIndex, r1: RegisterIndex, r2: RegisterIndex },
  /// pc <- immediate
  J    { immediate: u32 },
  /// pc <- r0
  Jr   { r0: RegisterIndex },
  /// if r0 == r1 then pc <- r2
  Beq  { r0: RegisterIndex, r1: RegisterIndex, r2: RegisterIndex },
  /// if r0 != r1 then pc <- r2
  Bne  { r0: RegisterIndex, r1: RegisterIndex, r2: RegisterIndex },
  /// r0 <- r0 + 1
  Inc  { r0: RegisterIndex },
  /// r0 <- r0 - 1
  Dec  { r0: RegisterIndex },
  /// An opcode byte with no assigned operation. Executes as a no-op.
  Unknown(u8),
}

impl Display for Instruction {
  /// Renders assembly syntax: mnemonic, then space-separated operands, immediates
  /// in bare hexadecimal.
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      Instruction::Halt => write!(f, "{}", Opcode::Halt),
      Instruction::Nop  => write!(f, "{}", Opcode::Nop),

      Instruction::Li { r0, immediate } => {
        write!(f, "{} r{} {:x}", Opcode::Li, r0, immediate)
      }

      Instruction::Lw { r0, r1 } => write!(f, "{} r{} r{}", Opcode::Lw, r0, r1),
      Instruction::Sw { r0, r1 } => write!(f, "{} r{} r{}", Opcode::Sw, r0, r1),

      Instruction::Add  { r0, r1, r2 } => write!(f, "{} r{} r{} r{}", Opcode::Add,  r0, r1, r2),
      Instruction::Sub  { r0, r1, r2 } => write!(f, "{} r{} r{} r{}", Opcode::Sub,  r0, r1, r2),
      Instruction::Mult { r0, r1, r2 } => write!(f, "{} r{} r{} r{}", Opcode::Mult, r0, r1, r2),
      Instruction::Div  { r0, r1, r2 } => write!(f, "{} r{} r{} r{}", Opcode::Div,  r0, r1, r2),

      Instruction::J  { immediate } => write!(f, "{} {:x}", Opcode::J, immediate),
      Instruction::Jr { r0 }        => write!(f, "{} r{}", Opcode::Jr, r0),

      Instruction::Beq { r0, r1, r2 } => write!(f, "{} r{} r{} r{}", Opcode::Beq, r0, r1, r2),
      Instruction::Bne { r0, r1, r2 } => write!(f, "{} r{} r{} r{}", Opcode::Bne, r0, r1, r2),

      Instruction::Inc { r0 } => write!(f, "{} r{}", Opcode::Inc, r0),
      Instruction::Dec { r0 } => write!(f, "{} r{}", Opcode::Dec, r0),

      Instruction::Unknown(code) => write!(f, "unknown {:#04x}", code),

    }
  }
}

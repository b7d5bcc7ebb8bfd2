/*!
  The human readable textual form of bytecode is called assembly. This module
  leverages the `strum` derives of `Opcode` to map mnemonics to operations and
  parses source text with `nom`.

  The syntax is line oriented. A line is either a label definition (`name:`), an
  instruction (a mnemonic followed by space separated operands), or nothing.
  Registers are written `r0`..`r3`, immediates are bare hexadecimal, and a `;`
  starts a comment that runs to the end of the line. An immediate position may
  also hold a label name, which resolves to the index of the instruction word
  following the definition; labels win over hexadecimal readings of the same
  token.
*/

use std::collections::HashMap;
use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::take_while1,
  character::complete::{char as one_char, space0, space1},
  combinator::{all_consuming, map},
  multi::many0,
  sequence::{pair, preceded, terminated},
  IResult,
};
use thiserror::Error;

use super::{encode_instruction, Instruction, InstructionWord, Opcode};
use super::instruction::RegisterIndex;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum AssemblyError {
  #[error("line {line}: cannot parse `{text}`")]
  Malformed { line: usize, text: String },

  #[error("line {line}: `{name}` is not an operation")]
  UnknownMnemonic { line: usize, name: String },

  #[error("line {line}: {operation} requires {expected} operands but was given {found}")]
  WrongOperandCount {
    line: usize,
    operation: Opcode,
    expected: usize,
    found: usize,
  },

  #[error("line {line}: expected a register like r0, found `{token}`")]
  ExpectedRegister { line: usize, token: String },

  #[error("line {line}: `{token}` is neither a label nor a hexadecimal literal")]
  BadImmediate { line: usize, token: String },

  #[error("line {line}: label `{name}` is defined twice")]
  DuplicateLabel { line: usize, name: String },
}

/// One meaningful source line. Comment-only and blank lines never produce one.
enum Line<'a> {
  Label(&'a str),
  Instruction {
    mnemonic: &'a str,
    operands: Vec<&'a str>,
  },
}

fn identifier(input: &str) -> IResult<&str, &str> {
  take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn label_line(input: &str) -> IResult<&str, Line> {
  map(
    terminated(identifier, preceded(space0, one_char(':'))),
    Line::Label,
  )(input)
}

fn instruction_line(input: &str) -> IResult<&str, Line> {
  map(
    pair(identifier, many0(preceded(space1, identifier))),
    |(mnemonic, operands)| Line::Instruction { mnemonic, operands },
  )(input)
}

fn source_line(input: &str) -> IResult<&str, Line> {
  all_consuming(alt((label_line, instruction_line)))(input)
}

/// Strips comments, drops blank lines, and parses the rest, keeping 1-based line
/// numbers for error reporting.
fn parse_lines(text: &str) -> Result<Vec<(usize, Line)>, AssemblyError> {
  let mut lines = Vec::new();

  for (number, raw) in text.lines().enumerate() {
    let line_number = number + 1;
    let code = raw.split(';').next().unwrap_or(raw).trim();
    if code.is_empty() {
      continue;
    }

    match source_line(code) {
      Ok((_rest, parsed)) => lines.push((line_number, parsed)),
      Err(_) => {
        return Err(AssemblyError::Malformed {
          line: line_number,
          text: code.to_string(),
        })
      }
    }
  }
  Ok(lines)
}

fn register_operand(token: &str, line: usize) -> Result<RegisterIndex, AssemblyError> {
  token
    .strip_prefix('r')
    .and_then(|digits| digits.parse::<RegisterIndex>().ok())
    .ok_or_else(|| AssemblyError::ExpectedRegister {
      line,
      token: token.to_string(),
    })
}

// ToDo: warn when a label shadows a hexadecimal reading of the same token
//       (a label named `add` makes `j add` resolve to the label, silently).
fn immediate_operand(
  token: &str,
  labels: &HashMap<&str, usize>,
  line: usize,
) -> Result<u32, AssemblyError> {
  if let Some(&address) = labels.get(token) {
    return Ok(address as u32);
  }
  u32::from_str_radix(token, 16).map_err(|_| AssemblyError::BadImmediate {
    line,
    token: token.to_string(),
  })
}

fn encode_line(
  line: usize,
  mnemonic: &str,
  operands: &[&str],
  labels: &HashMap<&str, usize>,
) -> Result<InstructionWord, AssemblyError> {
  let opcode = Opcode::from_str(mnemonic).map_err(|_| AssemblyError::UnknownMnemonic {
    line,
    name: mnemonic.to_string(),
  })?;

  let expected = opcode.format().operand_count();
  if operands.len() != expected {
    return Err(AssemblyError::WrongOperandCount {
      line,
      operation: opcode,
      expected,
      found: operands.len(),
    });
  }

  // The operand count is already checked, so positional indexing is in range.
  let register  = |position: usize| register_operand(operands[position], line);
  let immediate = |position: usize| immediate_operand(operands[position], labels, line);

  let instruction = match opcode {
    Opcode::Halt => Instruction::Halt,
    Opcode::Nop  => Instruction::Nop,
    Opcode::Li   => Instruction::Li   { r0: register(0)?, immediate: immediate(1)? },
    Opcode::Lw   => Instruction::Lw   { r0: register(0)?, r1: register(1)? },
    Opcode::Sw   => Instruction::Sw   { r0: register(0)?, r1: register(1)? },
    Opcode::Add  => Instruction::Add  { r0: register(0)?, r1: register(1)?, r2: register(2)? },
    Opcode::Sub  => Instruction::Sub  { r0: register(0)?, r1: register(1)?, r2: register(2)? },
    Opcode::Mult => Instruction::Mult { r0: register(0)?, r1: register(1)?, r2: register(2)? },
    Opcode::Div  => Instruction::Div  { r0: register(0)?, r1: register(1)?, r2: register(2)? },
    Opcode::J    => Instruction::J    { immediate: immediate(0)? },
    Opcode::Jr   => Instruction::Jr   { r0: register(0)? },
    Opcode::Beq  => Instruction::Beq  { r0: register(0)?, r1: register(1)?, r2: register(2)? },
    Opcode::Bne  => Instruction::Bne  { r0: register(0)?, r1: register(1)?, r2: register(2)? },
    Opcode::Inc  => Instruction::Inc  { r0: register(0)? },
    Opcode::Dec  => Instruction::Dec  { r0: register(0)? },
  };

  Ok(encode_instruction(&instruction))
}

/**
  Assembles source text into instruction words.

  Two passes: the first binds every label to the index of the instruction word
  that follows it, the second checks operand shapes and encodes. All errors carry
  the 1-based source line they were found on.
*/
pub fn assemble(text: &str) -> Result<Vec<InstructionWord>, AssemblyError> {
  let lines = parse_lines(text)?;

  let mut labels: HashMap<&str, usize> = HashMap::new();
  let mut index = 0;
  for (line_number, line) in &lines {
    match line {
      Line::Label(name) => {
        if labels.insert(*name, index).is_some() {
          return Err(AssemblyError::DuplicateLabel {
            line: *line_number,
            name: name.to_string(),
          });
        }
      }
      Line::Instruction { .. } => index += 1,
    }
  }

  let mut words = Vec::with_capacity(index);
  for (line_number, line) in &lines {
    if let Line::Instruction { mnemonic, operands } = line {
      words.push(encode_line(*line_number, *mnemonic, operands, &labels)?);
    }
  }
  Ok(words)
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::machine::Machine;

  fn encoded(instructions: &[Instruction]) -> Vec<InstructionWord> {
    instructions.iter().map(encode_instruction).collect()
  }

  #[test]
  fn assembles_the_add_program() {
    let words = assemble(
      "li r0 5\n\
       li r1 3\n\
       add r2 r0 r1\n\
       halt\n",
    )
    .unwrap();
    assert_eq!(
      words,
      encoded(&[
        Instruction::Li  { r0: 0, immediate: 5 },
        Instruction::Li  { r0: 1, immediate: 3 },
        Instruction::Add { r0: 2, r1: 0, r2: 1 },
        Instruction::Halt,
      ])
    );
  }

  #[test]
  fn comments_and_blank_lines_assemble_to_nothing() {
    let words = assemble(
      "; a program of very little consequence\n\
       \n\
       nop ; does nothing\n\
       halt\n",
    )
    .unwrap();
    assert_eq!(words, encoded(&[Instruction::Nop, Instruction::Halt]));
  }

  #[test]
  fn immediates_are_hexadecimal() {
    let words = assemble("li r0 ff\nhalt\n").unwrap();
    assert_eq!(words[0], encode_instruction(&Instruction::Li { r0: 0, immediate: 0xFF }));
  }

  #[test]
  fn labels_bind_to_the_next_instruction_word() {
    let words = assemble(
      "li r0 0\n\
       li r1 3\n\
       li r2 loop\n\
       loop:\n\
       inc r0\n\
       bne r0 r1 r2\n\
       halt\n",
    )
    .unwrap();
    assert_eq!(words[2], encode_instruction(&Instruction::Li { r0: 2, immediate: 3 }));
  }

  #[test]
  fn assembled_counting_loop_runs_to_completion() {
    let words = assemble(
      "li r0 0\n\
       li r1 3\n\
       li r2 loop\n\
       loop:\n\
       inc r0\n\
       bne r0 r1 r2\n\
       halt\n",
    )
    .unwrap();

    let mut machine = Machine::new(words);
    machine.run().unwrap();
    assert_eq!(machine.register(0).unwrap(), 3);
    assert!(!machine.is_running());
  }

  #[test]
  fn a_label_wins_over_its_hexadecimal_reading() {
    // `fee` is valid hexadecimal, but the label definition takes precedence.
    let words = assemble("j fee\nfee:\nhalt\n").unwrap();
    assert_eq!(words[0], encode_instruction(&Instruction::J { immediate: 1 }));
  }

  #[test]
  fn unknown_mnemonics_are_reported_with_their_line() {
    let error = assemble("nop\nfoo r0\n").unwrap_err();
    assert_eq!(
      error,
      AssemblyError::UnknownMnemonic { line: 2, name: "foo".to_string() }
    );
  }

  #[test]
  fn wrong_operand_counts_are_reported() {
    let error = assemble("add r0 r1\n").unwrap_err();
    assert_eq!(
      error,
      AssemblyError::WrongOperandCount {
        line: 1,
        operation: Opcode::Add,
        expected: 3,
        found: 2,
      }
    );
  }

  #[test]
  fn register_operands_must_look_like_registers() {
    let error = assemble("inc 5\n").unwrap_err();
    assert_eq!(
      error,
      AssemblyError::ExpectedRegister { line: 1, token: "5".to_string() }
    );
  }

  #[test]
  fn immediates_must_be_labels_or_hexadecimal() {
    let error = assemble("li r0 zigzag\n").unwrap_err();
    assert_eq!(
      error,
      AssemblyError::BadImmediate { line: 1, token: "zigzag".to_string() }
    );
  }

  #[test]
  fn duplicate_labels_are_rejected() {
    let error = assemble("top:\nnop\ntop:\nhalt\n").unwrap_err();
    assert_eq!(
      error,
      AssemblyError::DuplicateLabel { line: 3, name: "top".to_string() }
    );
  }

  #[test]
  fn punctuation_is_malformed() {
    let error = assemble("li r0, 5\n").unwrap_err();
    assert_eq!(
      error,
      AssemblyError::Malformed { line: 1, text: "li r0, 5".to_string() }
    );
  }
}

#![allow(dead_code)]

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

mod bytecode;
mod loader;
mod machine;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};

use crate::bytecode::decode_instruction;
use crate::machine::Machine;

/// tvm - a tiny register machine
#[derive(Parser, Debug)]
#[command(name = "tvm", version, about = "An emulator and assembler for a tiny 64-bit register machine")]
struct Args {
  /// Path to the program image to execute (or to assembly source with --assemble)
  program: PathBuf,

  /// Assemble the input to OUTPUT instead of executing it
  #[arg(short, long, value_name = "OUTPUT")]
  assemble: Option<PathBuf>,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,
}

fn main() -> Result<()> {
  let args = Args::parse();

  let log_level = if args.verbose { "debug" } else { "info" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
    .format_timestamp(None)
    .init();

  if let Some(output) = args.assemble {
    return assemble_to_file(&args.program, &output);
  }

  let program = loader::load_program(&args.program)?;
  info!(
    "Loaded {} instruction words from {}",
    program.len(),
    args.program.display()
  );

  let mut machine = Machine::new(program);

  //  The per-cycle register dump: post-increment program counter, raw word, then
  //  the register file, all in fixed-width hex.
  #[cfg(feature = "trace_execution")]
  machine.set_tracer(Box::new(|cycle: &machine::Cycle| {
    print!("{:08x} {:016x} ", cycle.pc, cycle.word);
    for value in cycle.registers {
      print!("{:08x} ", value);
    }
    println!();
  }));

  match machine.run() {
    Ok(()) => {
      info!("Halted normally after {} cycles.", machine.cycles());
      Ok(())
    }
    Err(fault) => {
      error!("Machine faulted at pc {:#x}: {}", machine.pc(), fault);
      eprintln!("{}", machine);
      Err(fault.into())
    }
  }
}

fn assemble_to_file(source: &Path, output: &Path) -> Result<()> {
  let text = fs::read_to_string(source)
    .with_context(|| format!("cannot read assembly source `{}`", source.display()))?;
  let words = bytecode::assemble(&text)?;

  let mut bytes = Vec::with_capacity(words.len() * bytecode::WORD_BYTES);
  for word in &words {
    debug!("{:016x}  {}", word, decode_instruction(*word));
    bytes.extend_from_slice(&word.to_le_bytes());
  }
  fs::write(output, &bytes)
    .with_context(|| format!("cannot write program image `{}`", output.display()))?;

  info!("Assembled {} instructions to {}", words.len(), output.display());
  Ok(())
}

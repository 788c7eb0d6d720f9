use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use cvm::bytecode::disassemble;
use cvm::cvm::DEFAULT_MEMORY_SIZE;
use cvm::{Assembler, AssemblerConfig, Cvm, CvmConfig};

/// CVM - assembler and virtual machine for the CPRL teaching computer
#[derive(Parser, Debug)]
#[command(name = "cvm")]
#[command(about = "Assemble, run, and disassemble CVM programs", long_about = None)]
struct Args {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Assemble a source file, writing the object code next to it with an .obj extension
  Assemble {
    /// Run the peephole optimizer
    #[arg(long, value_enum, default_value_t = Switch::On)]
    opt: Switch,

    file: PathBuf,
  },

  /// Load an object file into the virtual machine and run it
  Run {
    /// Bytes of memory for code and stack together
    #[arg(long, default_value_t = DEFAULT_MEMORY_SIZE)]
    memory: usize,

    file: PathBuf,
  },

  /// Print an object file as an assembly listing
  Disassemble {
    file: PathBuf,
  },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Switch {
  On,
  Off,
}

fn read_file(path: &Path) -> Result<Vec<u8>, String> {
  fs::read(path).map_err(|error| format!("*** File {} not found: {} ***", path.display(), error))
}

fn assemble(path: &Path, optimize: bool) -> Result<(), String> {
  let bytes = read_file(path)?;
  let text  = String::from_utf8(bytes)
    .map_err(|_| format!("*** File {} is not UTF-8 text ***", path.display()))?;

  println!("Starting CVM Assembler on {} ...", path.display());

  let config   = AssemblerConfig { optimize, ..AssemblerConfig::default() };
  let assembly = Assembler::new(config).assemble(&text).map_err(|error| {
    format!("{}\n\nErrors detected in {} -- assembly terminated.", error, path.display())
  })?;

  let target = path.with_extension("obj");
  fs::write(&target, &assembly.code)
    .map_err(|error| format!("*** Unable to write {}: {} ***", target.display(), error))?;

  println!("Assembly complete: {} bytes written to {}.", assembly.code.len(), target.display());
  Ok(())
}

fn run(path: &Path, memory_size: usize) -> Result<(), String> {
  let code = read_file(path)?;

  #[cfg(feature = "trace_computation")]
  eprintln!("Computation Tracing ENABLED");

  let mut machine = Cvm::new(CvmConfig { memory_size });
  machine.load(&code).map_err(|fault| fault.to_string())?;
  machine.run().map_err(|fault| fault.to_string())
}

fn main() -> ExitCode {
  let args = Args::parse();

  let result = match args.command {
    Command::Assemble { opt, file } => assemble(&file, opt == Switch::On),
    Command::Run { memory, file }   => run(&file, memory),
    Command::Disassemble { file }   => {
      read_file(&file).and_then(|code| {
        disassemble(&code).map_err(|error| error.to_string())
      })
      .map(|listing| print!("{}", listing))
    }
  };

  match result {
    Ok(())       => ExitCode::SUCCESS,
    Err(message) => {
      eprintln!("{}", message);
      ExitCode::FAILURE
    }
  }
}

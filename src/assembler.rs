/*!
  An assembly job: parse, optimize, resolve addresses, check constraints, emit.

  An `Assembler` owns the label and identifier tables for exactly one job. Constraint errors
  are collected rather than returned one at a time, so a single run reports as many problems
  as possible, up to `AssemblerConfig::max_errors`. Code is only emitted when there are none.
*/

use crate::bytecode::{emit_program, parse_assembly, Argument, Instruction, Opcode};
use crate::error::{AssemblyError, ConstraintError};
use crate::optimize::optimize;
use crate::symboltable::{IdTable, LabelTable};

/// The number of errors collected before the assembler stops reporting more.
pub const MAX_ERRORS: usize = 15;

#[derive(Clone, Debug)]
pub struct AssemblerConfig {
  /// Run the peephole optimizer before resolving addresses.
  pub optimize   : bool,
  pub max_errors : usize,
}

impl Default for AssemblerConfig {
  fn default() -> AssemblerConfig {
    AssemblerConfig {
      optimize   : true,
      max_errors : MAX_ERRORS,
    }
  }
}

/// The product of a successful assembly job.
#[derive(Clone, Debug)]
pub struct Assembly {
  /// The object code, ready to be loaded at address 0.
  pub code    : Vec<u8>,
  /// The program as emitted, after optimization and with addresses assigned.
  pub program : Vec<Instruction>,
  pub labels  : LabelTable,
  pub ids     : IdTable,
}

pub struct Assembler {
  config : AssemblerConfig,
  labels : LabelTable,
  ids    : IdTable,
  errors : Vec<ConstraintError>,
}

impl Default for Assembler {
  fn default() -> Assembler {
    Assembler::new(AssemblerConfig::default())
  }
}

impl Assembler {

  pub fn new(config: AssemblerConfig) -> Assembler {
    Assembler {
      config,
      labels : LabelTable::new(),
      ids    : IdTable::new(),
      errors : Vec::new(),
    }
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn ids(&self) -> &IdTable {
    &self.ids
  }

  pub fn errors(&self) -> &[ConstraintError] {
    &self.errors
  }

  fn report(&mut self, error: ConstraintError) {
    if self.errors.len() < self.config.max_errors {
      self.errors.push(error);
    }
  }

  /**
    Assigns each instruction its address and binds its labels, declaring `DEFINT`
    identifiers along the way. Returns the total size of the code in bytes.
  */
  pub fn resolve_addresses(&mut self, program: &mut [Instruction]) -> i32 {
    let mut address = 0;

    for instruction in program.iter_mut() {
      if let Err(error) = instruction.set_address(address, &mut self.labels) {
        self.report(error);
      }

      if let (Opcode::DefInt, Some(Argument::Id(id))) = (instruction.opcode, &instruction.arg) {
        if self.ids.declare_int(id).is_err() {
          let error = ConstraintError::new(
            instruction.line,
            format!("The identifier \"{}\" has already been defined.", id)
          );
          self.report(error);
        }
      }

      address += instruction.size();
    }

    #[cfg(feature = "trace_computation")]
    eprintln!(
      "RESOLVE: {} bytes, {} labels, {} identifiers",
      address, self.labels.len(), self.ids.len()
    );

    address
  }

  /// Checks every instruction against the completed symbol tables.
  pub fn check_constraints(&mut self, program: &[Instruction]) {
    for instruction in program {
      if let Err(error) = instruction.check_constraints(&self.labels, &self.ids) {
        self.report(error);
      }
    }
  }

  /// Assembles assembly source text.
  pub fn assemble(self, text: &str) -> Result<Assembly, AssemblyError> {
    let max_errors = self.config.max_errors;
    let program = parse_assembly(text).map_err(|mut errors| {
      errors.truncate(max_errors);
      AssemblyError::Syntax(errors)
    })?;

    #[cfg(feature = "trace_computation")]
    eprintln!("PARSE: {} instructions", program.len());

    self.assemble_program(program)
  }

  /// Assembles a program that has already been parsed or built in memory.
  pub fn assemble_program(mut self, mut program: Vec<Instruction>)
    -> Result<Assembly, AssemblyError>
  {
    if self.config.optimize {
      let _rewrites = optimize(&mut program);
      #[cfg(feature = "trace_computation")]
      eprintln!("OPTIMIZE: {} rewrites, {} instructions remain", _rewrites, program.len());
    }

    self.resolve_addresses(&mut program);
    self.check_constraints(&program);
    if !self.errors.is_empty() {
      return Err(AssemblyError::Constraints(self.errors));
    }

    let code = emit_program(&program, &self.labels, &self.ids)?;

    #[cfg(feature = "trace_computation")]
    eprintln!("EMIT: {} bytes", code.len());

    Ok(Assembly {
      code,
      program,
      labels : self.labels,
      ids    : self.ids,
    })
  }
}

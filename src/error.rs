//! Error types for the three phases of the toolchain: parsing assembly source, checking and
//! emitting a program, and running it on the virtual machine.

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Malformed assembly text, detected by the front end.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("*** Syntax error detected near line {line}:\n    {message}")]
pub struct SyntaxError {
  pub line    : u32,
  pub message : String,
}

/**
  A violated contextual constraint: wrong argument type, undefined or duplicate label,
  out-of-range immediate. These are collected rather than reported one at a time.
*/
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("*** Constraint error detected near line {line}:\n    {message}")]
pub struct ConstraintError {
  pub line    : u32,
  pub message : String,
}

impl ConstraintError {
  pub fn new(line: u32, message: impl Into<String>) -> ConstraintError {
    ConstraintError { line, message: message.into() }
  }
}

/// Inconsistencies found while serializing a program that passed its constraint checks.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EmitError {
  #[error("label \"{0}\" was never resolved to an address")]
  UnresolvedLabel(String),
  #[error("identifier \"{0}\" was never declared")]
  UndeclaredIdentifier(String),
  #[error("{opcode} has an argument of the wrong type")]
  WrongArgument { opcode: &'static str },
}

/// Malformed object code.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DecodeError {
  #[error("unknown opcode {opcode} at address {address}")]
  UnknownOpcode { opcode: u8, address: usize },
  #[error("object code ends in the middle of the instruction at address {address}")]
  Truncated { address: usize },
}

/// The ways an assembly job can fail. No code is produced in any of these cases.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum AssemblyError {
  #[error("{}", ErrorList(.0))]
  Syntax(Vec<SyntaxError>),
  #[error("{}", ErrorList(.0))]
  Constraints(Vec<ConstraintError>),
  #[error(transparent)]
  Emit(#[from] EmitError),
}

impl AssemblyError {
  pub fn error_count(&self) -> usize {
    match self {
      AssemblyError::Syntax(errors)      => errors.len(),
      AssemblyError::Constraints(errors) => errors.len(),
      AssemblyError::Emit(_)             => 1,
    }
  }
}

// Renders one error per line.
struct ErrorList<'a, E>(&'a Vec<E>);

impl<'a, E: Display> Display for ErrorList<'a, E> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let lines = self.0
                    .iter()
                    .map(E::to_string)
                    .collect::<Vec<String>>()
                    .join("\n");
    write!(f, "{}", lines)
  }
}

/**
  A runtime fault. Faults are fatal: the machine stops at the faulting instruction and the
  run is over. There is no instruction for catching them.
*/
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum Fault {
  #[error("*** FAULT:  Divide by zero ***")]
  DivideByZero,
  #[error("*** Out of memory ***")]
  OutOfMemory,
  #[error("*** FAULT:  Memory access out of range at address {0} ***")]
  MemoryAccess(i64),
  #[error("Invalid input: {0}")]
  InvalidInput(String),
  #[error("invalid machine instruction {opcode} at address {address}")]
  InvalidOpcode { opcode: u8, address: i32 },
  #[error("I/O error: {0}")]
  Io(String),
}

impl From<std::io::Error> for Fault {
  fn from(error: std::io::Error) -> Fault {
    Fault::Io(error.to_string())
  }
}

/*!
  An assembler and virtual machine for the CPRL teaching computer.

  Assembly text flows one way through the crate: `bytecode::parse_assembly` builds a list of
  `Instruction`s, `optimize` rewrites it in place, the `Assembler` resolves addresses and
  checks constraints before emitting object code, and the `Cvm` loads and runs that code.
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod assembler;
pub mod bytecode;
pub mod cvm;
pub mod error;
pub mod optimize;
pub mod symboltable;

pub use assembler::{Assembler, AssemblerConfig, Assembly};
pub use bytecode::{Argument, Instruction, Opcode};
pub use cvm::{Cvm, CvmConfig};
pub use error::{AssemblyError, ConstraintError, DecodeError, EmitError, Fault, SyntaxError};

use super::{window, Optimization};
use crate::bytecode::{Argument, Instruction, Opcode};

/// Combines `ALLOC n, ALLOC m` into `ALLOC n+m` when the second is unlabeled.
pub struct Allocate;

impl Optimization for Allocate {
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool {
    let total = match window(instructions, n, 2) {
      Some([first, second]) if !second.is_labeled() => {
        match (first.int_arg_of(Opcode::Alloc), second.int_arg_of(Opcode::Alloc)) {
          (Some(a), Some(b)) => Some(a.wrapping_add(b)),
          _                  => None
        }
      }
      _ => None
    };

    match total {
      Some(total) => {
        instructions[n].arg = Some(Argument::Int(total));
        instructions.remove(n + 1);
        true
      }
      None => false
    }
  }

  fn name(&self) -> &'static str {
    "Allocate"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::optimize::tests::parse;
  use pretty_assertions::assert_eq;

  #[test]
  fn coalesces_allocations() {
    let mut program = parse("L1: ALLOC 4\nALLOC 8\nHALT");
    assert!(Allocate.apply(&mut program, 0));
    assert_eq!(program, parse("L1: ALLOC 12\nHALT"));

    let mut labeled = parse("ALLOC 4\nL2: ALLOC 8");
    assert!(!Allocate.apply(&mut labeled, 0));
    assert_eq!(labeled.len(), 2);
  }
}

//! Optimizations that evaluate or specialize constant loads.

use super::{collapse, window, Optimization};
use crate::bytecode::{Argument, Instruction, Opcode};

/**
  Folds `LDCINT a, LDCINT b, op` into `LDCINT (a op b)` for the five binary arithmetic
  operators. Integer arithmetic wraps like the machine's. Division or remainder by zero is
  left in place so the program still faults at run time.
*/
pub struct ConstFolding;

impl Optimization for ConstFolding {
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool {
    let folded = match window(instructions, n, 3) {
      Some([first, second, operator]) if !second.is_labeled() && !operator.is_labeled() => {
        match (first.int_arg_of(Opcode::LdcInt), second.int_arg_of(Opcode::LdcInt)) {
          (Some(a), Some(b)) => fold(a, b, operator.opcode),
          _                  => None
        }
      }
      _ => None
    };

    match folded {
      Some(value) => {
        collapse(instructions, n, 3, Opcode::LdcInt, Some(Argument::Int(value)));
        true
      }
      None => false
    }
  }

  fn name(&self) -> &'static str {
    "ConstFolding"
  }
}

fn fold(a: i32, b: i32, operator: Opcode) -> Option<i32> {
  match operator {
    Opcode::Add            => Some(a.wrapping_add(b)),
    Opcode::Sub            => Some(a.wrapping_sub(b)),
    Opcode::Mul            => Some(a.wrapping_mul(b)),
    Opcode::Div if b != 0  => Some(a.wrapping_div(b)),
    Opcode::Mod if b != 0  => Some(a.wrapping_rem(b)),
    _                      => None
  }
}

/// Replaces `LDCINT x, NEG` with `LDCINT -x`.
pub struct ConstNeg;

impl Optimization for ConstNeg {
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool {
    let negated = match window(instructions, n, 2) {
      Some([load, neg]) if neg.opcode == Opcode::Neg && !neg.is_labeled() => {
        load.int_arg_of(Opcode::LdcInt).map(i32::wrapping_neg)
      }
      _ => None
    };

    match negated {
      Some(value) => {
        collapse(instructions, n, 2, Opcode::LdcInt, Some(Argument::Int(value)));
        true
      }
      None => false
    }
  }

  fn name(&self) -> &'static str {
    "ConstNeg"
  }
}

/// Replaces loads of 0 and 1 with the opcodes that have the constant built in.
pub struct LoadSpecialConstants;

impl Optimization for LoadSpecialConstants {
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool {
    let instruction = match instructions.get_mut(n) {
      Some(instruction) => instruction,
      None              => return false
    };

    let special = match (instruction.opcode, &instruction.arg) {
      (Opcode::LdcInt, Some(Argument::Int(0))) => Opcode::LdcInt0,
      (Opcode::LdcInt, Some(Argument::Int(1))) => Opcode::LdcInt1,
      (Opcode::Ldcb,   Some(Argument::Int(0))) => Opcode::Ldcb0,
      (Opcode::Ldcb,   Some(Argument::Int(1))) => Opcode::Ldcb1,
      _                                        => return false
    };
    instruction.opcode = special;
    instruction.arg    = None;
    true
  }

  fn name(&self) -> &'static str {
    "LoadSpecialConstants"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::optimize::tests::parse;
  use pretty_assertions::assert_eq;

  fn run(optimization: &dyn Optimization, text: &str) -> (bool, Vec<Instruction>) {
    let mut program = parse(text);
    let changed = optimization.apply(&mut program, 0);
    (changed, program)
  }

  #[test]
  fn folds_each_operator() {
    let cases = [("ADD", 9), ("SUB", 5), ("MUL", 14), ("DIV", 3), ("MOD", 1)];
    for (operator, expected) in cases {
      let (changed, program) = run(&ConstFolding, &format!("L0: LDCINT 7 LDCINT 2 {}", operator));
      assert!(changed);
      assert_eq!(program, parse(&format!("L0: LDCINT {}", expected)));
    }
  }

  #[test]
  fn folding_wraps_and_leaves_division_by_zero() {
    let (_, program) = run(&ConstFolding, "LDCINT 2147483647 LDCINT 1 ADD");
    assert_eq!(program, parse("LDCINT -2147483648"));

    let (changed, program) = run(&ConstFolding, "LDCINT 4 LDCINT 0 DIV");
    assert!(!changed);
    assert_eq!(program.len(), 3);
  }

  #[test]
  fn labels_block_folding() {
    assert!(!run(&ConstFolding, "LDCINT 1 L1: LDCINT 2 ADD").0);
    assert!(!run(&ConstFolding, "LDCINT 1 LDCINT 2 L1: ADD").0);
  }

  #[test]
  fn negates_constants() {
    let (changed, program) = run(&ConstNeg, "L1: LDCINT 5 NEG");
    assert!(changed);
    assert_eq!(program, parse("L1: LDCINT -5"));
    assert!(!run(&ConstNeg, "LDCINT 5 L2: NEG").0);
  }

  #[test]
  fn specializes_zero_and_one() {
    assert_eq!(run(&LoadSpecialConstants, "L1: LDCINT 0").1, parse("L1: LDCINT0"));
    assert_eq!(run(&LoadSpecialConstants, "LDCINT 1").1, parse("LDCINT1"));
    assert_eq!(run(&LoadSpecialConstants, "LDCB 0").1, parse("LDCB0"));
    assert_eq!(run(&LoadSpecialConstants, "LDCB 1").1, parse("LDCB1"));
    assert!(!run(&LoadSpecialConstants, "LDCINT 2").0);
  }
}

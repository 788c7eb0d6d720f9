//! Strength reductions: increments, decrements, and shifts in place of general arithmetic.

use super::{collapse, remove_into_next, shift_amount, unlabeled, window, Optimization};
use crate::bytecode::{Argument, Instruction, Opcode};

/// Replaces `LDCINT 1, ADD` with `INC` and `LDCINT 1, SUB` with `DEC`.
pub struct IncDec;

impl Optimization for IncDec {
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool {
    let replacement = match window(instructions, n, 2) {
      Some([load, operator]) if load.int_arg_of(Opcode::LdcInt) == Some(1)
                             && !operator.is_labeled() => {
        match operator.opcode {
          Opcode::Add => Some(Opcode::Inc),
          Opcode::Sub => Some(Opcode::Dec),
          _           => None
        }
      }
      _ => None
    };

    match replacement {
      Some(opcode) => {
        collapse(instructions, n, 2, opcode, None);
        true
      }
      None => false
    }
  }

  fn name(&self) -> &'static str {
    "IncDec"
  }
}

/// True if the window is `LDCINT _, LDLADDR _, LOADW, operator` with only the first labeled.
fn is_constant_times_variable(window: &[Instruction], operator: Opcode) -> bool {
  match window {
    [load, address, value, op] => {
      load.int_arg_of(Opcode::LdcInt).is_some()
        && address.opcode == Opcode::LdlAddr
        && value.opcode == Opcode::LoadW
        && op.opcode == operator
        && unlabeled(&window[1..])
    }
    _ => false
  }
}

/**
  Replaces `LDCINT 1, LDLADDR x, LOADW, ADD` with `LDLADDR x, LOADW, INC`. The constant is
  moved past the variable load, which is only sound for a commutative operator, so the
  subtraction form is left alone.
*/
pub struct IncDec2;

impl Optimization for IncDec2 {
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool {
    let matched = match window(instructions, n, 4) {
      Some(window) => {
        is_constant_times_variable(window, Opcode::Add)
          && window[0].int_arg_of(Opcode::LdcInt) == Some(1)
      }
      None => false
    };
    if !matched {
      return false;
    }

    instructions[n + 3].opcode = Opcode::Inc;
    remove_into_next(instructions, n);
    true
  }

  fn name(&self) -> &'static str {
    "IncDec2"
  }
}

/**
  Replaces `LDCINT 2^k, MUL` with `SHL k` and `LDCINT 2^k, DIV` with `SHR k`, for `k > 0`.
  `SHR` is an arithmetic shift, so a negative dividend rounds toward negative infinity
  rather than toward zero as `DIV` does.
*/
pub struct ShiftLeftRight;

impl Optimization for ShiftLeftRight {
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool {
    let replacement = match window(instructions, n, 2) {
      Some([load, operator]) if !operator.is_labeled() => {
        let amount = load.int_arg_of(Opcode::LdcInt).map_or(0, shift_amount);
        match (operator.opcode, amount > 0) {
          (Opcode::Mul, true) => Some((Opcode::Shl, amount)),
          (Opcode::Div, true) => Some((Opcode::Shr, amount)),
          _                   => None
        }
      }
      _ => None
    };

    match replacement {
      Some((opcode, amount)) => {
        collapse(instructions, n, 2, opcode, Some(Argument::Int(amount)));
        true
      }
      None => false
    }
  }

  fn name(&self) -> &'static str {
    "ShiftLeftRight"
  }
}

/**
  Replaces `LDCINT 2^k, LDLADDR x, LOADW, MUL` with `LDLADDR x, LOADW, SHL k`, for `k > 0`.
  There is no right shift counterpart since division is not commutative.
*/
pub struct ShiftLeft;

impl Optimization for ShiftLeft {
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool {
    let amount = match window(instructions, n, 4) {
      Some(window) if is_constant_times_variable(window, Opcode::Mul) => {
        window[0].int_arg_of(Opcode::LdcInt).map_or(0, shift_amount)
      }
      _ => 0
    };
    if amount <= 0 {
      return false;
    }

    let multiply = &mut instructions[n + 3];
    multiply.opcode = Opcode::Shl;
    multiply.arg    = Some(Argument::Int(amount));
    remove_into_next(instructions, n);
    true
  }

  fn name(&self) -> &'static str {
    "ShiftLeft"
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
  fn increments_and_decrements() {
    assert_eq!(run(&IncDec, "L1: LDCINT 1 ADD").1, parse("L1: INC"));
    assert_eq!(run(&IncDec, "LDCINT 1 SUB").1, parse("DEC"));
    assert!(!run(&IncDec, "LDCINT 2 ADD").0);
    assert!(!run(&IncDec, "LDCINT 1 L2: ADD").0);
  }

  #[test]
  fn increments_a_variable() {
    let (changed, program) = run(&IncDec2, "L1: LDCINT 1 LDLADDR x LOADW ADD");
    assert!(changed);
    assert_eq!(program, parse("L1: LDLADDR x LOADW INC"));

    assert!(!run(&IncDec2, "LDCINT 1 LDLADDR x LOADW SUB").0);
    assert!(!run(&IncDec2, "LDCINT 1 LDLADDR x L3: LOADW ADD").0);
    assert!(!run(&IncDec2, "LDCINT 2 LDLADDR x LOADW ADD").0);
  }

  #[test]
  fn shifts_for_powers_of_two() {
    assert_eq!(run(&ShiftLeftRight, "LDCINT 8 MUL").1, parse("SHL 3"));
    assert_eq!(run(&ShiftLeftRight, "L1: LDCINT 4 DIV").1, parse("L1: SHR 2"));
    assert!(!run(&ShiftLeftRight, "LDCINT 6 MUL").0);
    assert!(!run(&ShiftLeftRight, "LDCINT 1 MUL").0);
    assert!(!run(&ShiftLeftRight, "LDCINT 8 MOD").0);
  }

  #[test]
  fn shifts_a_variable_left() {
    let (changed, program) = run(&ShiftLeft, "L0: LDCINT 8 LDLADDR x LOADW MUL");
    assert!(changed);
    assert_eq!(program, parse("L0: LDLADDR x LOADW SHL 3"));

    assert!(!run(&ShiftLeft, "LDCINT 8 LDLADDR x LOADW DIV").0);
    assert!(!run(&ShiftLeft, "LDCINT 7 LDLADDR x LOADW MUL").0);
  }
}

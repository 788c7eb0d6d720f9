/*!
  Peephole optimizations over an assembled program.

  Each optimization looks at a small window of adjacent instructions beginning at a cursor
  and rewrites the window in place when it matches a pattern. Rewrites only ever delete or
  replace instructions, never reorder them, and a labeled instruction is only absorbed into
  a rewrite when its labels can be carried onto the replacement. Labels are jump targets, so
  no label is ever dropped or duplicated.

  `optimize` runs the whole ordered list of optimizations at each cursor position, repeating
  the list at that position for as long as something changes, then moves the cursor forward.
  The cursor never moves back, even after a deletion shifts later instructions toward it.
*/

mod allocate;
mod arithmetic;
mod branching;
mod constants;

pub use allocate::Allocate;
pub use arithmetic::{IncDec, IncDec2, ShiftLeft, ShiftLeftRight};
pub use branching::{BranchingReduction, DeadCodeElimination};
pub use constants::{ConstFolding, ConstNeg, LoadSpecialConstants};

use crate::bytecode::{Argument, Instruction, Opcode};

pub trait Optimization {
  /// Rewrites the window starting at `n` if it matches. Returns whether anything changed.
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool;

  fn name(&self) -> &'static str;
}

/// The optimizations in the order they are tried. Later entries rely on earlier ones having
/// already seen the window, e.g. `LoadSpecialConstants` must not hide an `LDCINT 1` from
/// `IncDec`.
pub static OPTIMIZATIONS: [&(dyn Optimization + Sync); 10] = [
  &ConstFolding,
  &IncDec,
  &IncDec2,
  &ShiftLeftRight,
  &ShiftLeft,
  &BranchingReduction,
  &ConstNeg,
  &LoadSpecialConstants,
  &Allocate,
  &DeadCodeElimination,
];

/// Runs every optimization over `instructions`. Returns the number of rewrites performed.
pub fn optimize(instructions: &mut Vec<Instruction>) -> usize {
  let mut rewrites = 0;
  let mut n = 0;

  while n < instructions.len() {
    loop {
      let mut changed = false;
      for optimization in OPTIMIZATIONS.iter() {
        if optimization.apply(instructions, n) {
          #[cfg(feature = "trace_computation")]
          eprintln!("OPTIMIZE: {} at instruction {}", optimization.name(), n);
          rewrites += 1;
          changed = true;
        }
      }
      if !changed {
        break;
      }
    }
    n += 1;
  }

  rewrites
}

/**
  Returns `k` if `value` is `2^k`, and 0 otherwise. Callers only rewrite for `k > 0`, so
  multiplying by one is left alone.
*/
pub fn shift_amount(value: i32) -> i32 {
  match value > 0 && value.count_ones() == 1 {
    true  => value.trailing_zeros() as i32,
    false => 0
  }
}

// region Window helpers

/// The `len` instructions starting at `n`, or `None` if the list is shorter.
pub(crate) fn window(instructions: &[Instruction], n: usize, len: usize) -> Option<&[Instruction]> {
  instructions.get(n..n + len)
}

/// True if none of the instructions in `window` define a label.
pub(crate) fn unlabeled(window: &[Instruction]) -> bool {
  window.iter().all(|instruction| !instruction.is_labeled())
}

/**
  Replaces the `len` instructions starting at `n` with a single instruction that carries all
  of their labels, in order. The replacement keeps the source line of the first.
*/
pub(crate) fn collapse(
  instructions : &mut Vec<Instruction>,
  n            : usize,
  len          : usize,
  opcode       : Opcode,
  arg          : Option<Argument>
) {
  let line   = instructions[n].line;
  let labels = instructions.drain(n..n + len)
                           .flat_map(|instruction| instruction.labels)
                           .collect::<Vec<_>>();
  let mut replacement = Instruction::new(opcode, arg).at_line(line);
  replacement.labels = labels;
  instructions.insert(n, replacement);
}

/// Deletes the instruction at `n`, moving its labels onto the instruction that follows it.
pub(crate) fn remove_into_next(instructions: &mut Vec<Instruction>, n: usize) {
  let removed = instructions.remove(n);
  if let Some(next) = instructions.get_mut(n) {
    let mut labels = removed.labels;
    labels.append(&mut next.labels);
    next.labels = labels;
  }
}

// endregion

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::bytecode::parse_assembly;
  use pretty_assertions::assert_eq;

  pub(crate) fn parse(text: &str) -> Vec<Instruction> {
    parse_assembly(text).unwrap()
  }

  fn label_names(program: &[Instruction]) -> Vec<String> {
    let mut names: Vec<String> = program
      .iter()
      .flat_map(|instruction| instruction.labels.iter().map(|label| label.to_string()))
      .collect();
    names.sort();
    names
  }

  const SAMPLE: &str = "
        PROGRAM 8
        DEFINT x
        LDCINT 8
        LDLADDR x
        LOADW
        MUL
        LDCINT 1
        LDCINT 2
        ADD
        LDCINT 3
        ADD
        LDCINT 5
        NEG
        L1: LDCINT 1
        LDLADDR x
        LOADW
        ADD
        BZ L2
        BR L1
    L2: ALLOC 4
        ALLOC 8
        LDCINT 16
        DIV
        RET 0
        LDCINT 0
        L3: LDCB 1
        HALT
  ";

  #[test]
  fn shift_amounts() {
    assert_eq!(shift_amount(8), 3);
    assert_eq!(shift_amount(1), 0);
    assert_eq!(shift_amount(6), 0);
    assert_eq!(shift_amount(0), 0);
    assert_eq!(shift_amount(-8), 0);
    assert_eq!(shift_amount(1 << 30), 30);
  }

  #[test]
  fn optimizes_a_whole_program() {
    let mut program = parse(SAMPLE);
    optimize(&mut program);
    assert_eq!(
      program,
      parse("
            PROGRAM 8
            DEFINT x
            LDLADDR x
            LOADW
            SHL 3
            LDCINT 6
            LDCINT -5
        L1: LDLADDR x
            LOADW
            INC
            BNZ L1
        L2: ALLOC 12
            SHR 4
            RET 0
        L3: LDCB1
            HALT
      ")
    );
  }

  #[test]
  fn optimizing_twice_changes_nothing() {
    let mut once = parse(SAMPLE);
    optimize(&mut once);
    let mut twice = once.clone();
    assert_eq!(optimize(&mut twice), 0);
    assert_eq!(twice, once);
  }

  #[test]
  fn earlier_positions_are_not_revisited() {
    // Folding 3 + 4 at the second instruction exposes 2 * 7 at the first, which a single
    // forward sweep has already passed.
    let mut program = parse("LDCINT 2\nLDCINT 3\nLDCINT 4\nADD\nMUL");
    assert_eq!(optimize(&mut program), 1);
    assert_eq!(program, parse("LDCINT 2\nLDCINT 7\nMUL"));

    assert_eq!(optimize(&mut program), 1);
    assert_eq!(program, parse("LDCINT 14"));
  }

  #[test]
  fn optimization_preserves_labels_and_never_grows() {
    let before = parse(SAMPLE);
    let mut after = before.clone();
    optimize(&mut after);
    assert!(after.len() <= before.len());
    assert_eq!(label_names(&after), label_names(&before));
  }
}

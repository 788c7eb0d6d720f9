//! Optimizations over control flow.

use super::{window, Optimization};
use crate::bytecode::{Argument, Instruction, Opcode};

/**
  Replaces a conditional branch over an unconditional one,

  ```text
      BZ L1
      BR L0
  L1: ...
  ```

  with the opposite conditional branch to the unconditional branch's target, `BNZ L0`. The
  new branch carries the labels of both branches it replaces.
*/
pub struct BranchingReduction;

impl Optimization for BranchingReduction {
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool {
    let dual = match window(instructions, n, 3) {
      Some([conditional, jump, next]) if jump.opcode == Opcode::Br => {
        match (conditional.opcode.negated_branch(), &conditional.arg) {
          (Some(dual), Some(Argument::Id(target))) if next.defines_label(target) => Some(dual),
          _ => None
        }
      }
      _ => None
    };
    let dual = match dual {
      Some(dual) => dual,
      None       => return false
    };

    let jump = instructions.remove(n + 1);
    let branch = &mut instructions[n];
    branch.opcode = dual;
    branch.arg    = jump.arg;
    branch.labels.extend(jump.labels);
    true
  }

  fn name(&self) -> &'static str {
    "BranchingReduction"
  }
}

/**
  Deletes an unlabeled instruction that follows `BR` or `RET`, since nothing can reach it.
  Unlabeled `DEFINT` declarations in between are stepped over and kept, as they emit no code
  and later instructions may name them.
*/
pub struct DeadCodeElimination;

impl Optimization for DeadCodeElimination {
  fn apply(&self, instructions: &mut Vec<Instruction>, n: usize) -> bool {
    match instructions.get(n) {
      Some(exit) if matches!(exit.opcode, Opcode::Br | Opcode::Ret) => {}
      _ => return false
    }

    let follower = instructions[n + 1..]
      .iter()
      .position(|instruction| instruction.is_labeled() || !instruction.opcode.is_pseudo())
      .map(|offset| n + 1 + offset);
    match follower {
      Some(dead) if !instructions[dead].is_labeled() => {
        instructions.remove(dead);
        true
      }
      _ => false
    }
  }

  fn name(&self) -> &'static str {
    "DeadCodeElimination"
  }
}

use std::collections::HashMap;

use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::bytecode::{BYTES_PER_FRAME, BYTES_PER_INTEGER};

/**
  Maps label text to the address of the instruction the label is attached to. Label text
  always includes the colon at the end (`L1:`); lookups on behalf of a branch argument
  (which is written without the colon) go through `LabelTable::resolve`.

  Several labels may name the same address, so unlike the identifier table this is not a
  bijection. Entries are write-once.
*/
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
  table: HashMap<DefaultAtom, i32>
}

impl LabelTable {

  pub fn new() -> LabelTable {
    LabelTable::default()
  }

  /// Binds `label` to `address`. Returns the existing address if `label` is already bound.
  pub fn define(&mut self, label: &DefaultAtom, address: i32) -> Result<(), i32> {
    match self.table.get(label) {
      Some(existing) => Err(*existing),
      None           => {
        self.table.insert(label.clone(), address);
        Ok(())
      }
    }
  }

  /// Looks up a label by its full text, colon included.
  pub fn get(&self, label: &str) -> Option<i32> {
    self.table.get(&DefaultAtom::from(label)).copied()
  }

  /// Looks up the label referenced by a branch or call argument.
  pub fn resolve(&self, reference: &str) -> Option<i32> {
    self.get(&format!("{}:", reference))
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }
}

/**
  Maps identifiers declared with `DEFINT` to a stack displacement relative to the frame
  base. Displacements start just past the frame header and grow by the size of each
  declaration, so both sides of the map are unique and a `BiMap` lets the disassembler and
  diagnostics go from a displacement back to its name.
*/
#[derive(Clone, Debug)]
pub struct IdTable {
  table       : BiMap<DefaultAtom, i32>,
  next_offset : i32
}

impl Default for IdTable {
  fn default() -> IdTable {
    IdTable {
      table       : BiMap::new(),
      next_offset : BYTES_PER_FRAME
    }
  }
}

impl IdTable {

  pub fn new() -> IdTable {
    IdTable::default()
  }

  /**
    Reserves `size` bytes for `identifier` and returns its displacement. Returns the
    existing displacement as the error if `identifier` was already declared.
  */
  pub fn declare(&mut self, identifier: &DefaultAtom, size: i32) -> Result<i32, i32> {
    if let Some(existing) = self.table.get_by_left(identifier) {
      return Err(*existing);
    }
    let offset = self.next_offset;
    // Offsets are strictly increasing, so neither side can collide.
    let _ = self.table.insert_no_overwrite(identifier.clone(), offset);
    self.next_offset += size;
    Ok(offset)
  }

  /// Declares a four byte integer slot, the only kind `DEFINT` makes.
  pub fn declare_int(&mut self, identifier: &DefaultAtom) -> Result<i32, i32> {
    self.declare(identifier, BYTES_PER_INTEGER)
  }

  pub fn get_offset(&self, identifier: &str) -> Option<i32> {
    self.table.get_by_left(&DefaultAtom::from(identifier)).copied()
  }

  pub fn get_identifier(&self, offset: i32) -> Option<&DefaultAtom> {
    self.table.get_by_right(&offset)
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_are_write_once() {
    let mut labels = LabelTable::new();
    let l1 = DefaultAtom::from("L1:");

    assert_eq!(labels.define(&l1, 12), Ok(()));
    assert_eq!(labels.define(&l1, 40), Err(12));
    assert_eq!(labels.get("L1:"), Some(12));
    assert_eq!(labels.resolve("L1"), Some(12));
    assert_eq!(labels.resolve("L2"), None);
  }

  #[test]
  fn identifiers_grow_from_the_frame_header() {
    let mut ids = IdTable::new();
    let x = DefaultAtom::from("x");
    let y = DefaultAtom::from("y");

    assert_eq!(ids.declare_int(&x), Ok(8));
    assert_eq!(ids.declare_int(&y), Ok(12));
    assert_eq!(ids.declare_int(&x), Err(8));
    assert_eq!(ids.get_offset("y"), Some(12));
    assert_eq!(ids.get_identifier(8), Some(&x));
    assert_eq!(ids.len(), 2);
  }
}

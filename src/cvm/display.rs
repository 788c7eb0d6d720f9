//! Renders the machine state as tables, for tracing and for debugging sessions.

use std::fmt::{Display, Formatter};

use prettytable::{format as TableFormat, Table};

use super::Cvm;
#[cfg(feature = "trace_computation")]
use crate::bytecode::try_decode_instruction;

/// At most this many bytes from the top of the stack are shown.
const STACK_ROWS: i32 = 24;

impl Cvm {

  // region Display methods

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for (name, value) in [("PC", self.pc), ("BP", self.bp), ("SP", self.sp), ("SB", self.sb)] {
      table.add_row(row![r->format!("{} =", name), format!("{}", value)]);
    }
    table
  }

  /// The top of the stack, one byte per row, with the frame base and top marked.
  fn make_stack_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    let start = self.sp.saturating_sub(STACK_ROWS - 1).max(self.sb);
    for address in (start..=self.sp).rev() {
      let marker = match (address == self.sp, address == self.bp) {
        (true,  true)  => "SP,BP --> ",
        (true,  false) => "SP --> ",
        (false, true)  => "BP --> ",
        (false, false) => ""
      };
      let contents = match self.byte_at(address) {
        Ok(byte) => format!("{:>4}", byte as i8),
        Err(_)   => "?".to_string()
      };
      table.add_row(row![r->format!("{}S[{}] =", marker, address), contents]);
    }
    table
  }

  /// Prints the state of the machine and the instruction about to execute.
  #[cfg(feature = "trace_computation")]
  pub(crate) fn trace(&self) {
    let pc = self.pc.max(0) as usize;
    match try_decode_instruction(&self.memory[..self.sb as usize], pc) {
      Ok((instruction, _)) => eprintln!("{}\nNext: {:>4}:  {}\n", self, self.pc, instruction),
      Err(_)               => eprintln!("{}\nNext: {:>4}:  ???\n", self, self.pc)
    }
  }

  // endregion
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Cvm {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let register_table = self.make_register_table();
    let stack_table    = self.make_stack_table();

    let mut combined_table = table!([register_table, stack_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    let state = match self.running {
      true  => "Running.",
      false => "Stopped."
    };

    write!(f, "{}\n{}", state, combined_table)
  }
}

#[cfg(test)]
mod tests {
  use super::super::CvmConfig;
  use super::*;

  #[test]
  fn shows_registers_and_stack() {
    let mut cvm = Cvm::new(CvmConfig { memory_size: 64 });
    cvm.load(&[16, 0, 0, 0, 3, 0]).unwrap();
    cvm.run_with("".as_bytes(), Vec::new()).unwrap();

    let text = cvm.to_string();
    assert!(text.starts_with("Stopped."));
    assert!(text.contains("SB ="));
    assert!(text.contains("SP --> S[9] ="));
    assert!(text.contains("BP --> S[6] ="));
  }
}

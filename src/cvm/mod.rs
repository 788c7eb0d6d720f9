/*!
  The CVM, a stack machine for running assembled object code.

  Memory is a single flat array of bytes. The program is loaded at address 0 and the stack
  grows upward from the first byte past the code. Four registers index into memory:

    pc   address of the next byte of code to fetch
    sb   stack base, the first byte of the stack (fixed once the program is loaded)
    bp   base of the current frame
    sp   address of the byte on top of the stack (sb - 1 when the stack is empty)

  A frame starts with a two word header written by `CALL`: the caller's `bp` (the dynamic
  link) and the return address. Locals live at positive displacements from `bp`, parameters
  at negative ones. All multi-byte values are big-endian, as in the object code.

  Nothing protects the code from the program. Any access outside of memory is a fault, as is
  growing the stack past the end of it.
*/

mod console;
mod display;

pub use console::Console;

use std::convert::TryFrom;
use std::io::{self, BufRead, Write};
use std::ops::Range;

use crate::bytecode::{Opcode, BYTES_PER_FRAME, BYTES_PER_INTEGER};
use crate::error::Fault;

/// 1K = 2**10
const K: usize = 1024;
pub const DEFAULT_MEMORY_SIZE: usize = 8 * K;

#[derive(Clone, Debug)]
pub struct CvmConfig {
  /// The number of bytes of memory, code and stack together.
  pub memory_size: usize,
}

impl Default for CvmConfig {
  fn default() -> CvmConfig {
    CvmConfig {
      memory_size: DEFAULT_MEMORY_SIZE
    }
  }
}

pub struct Cvm {
  memory  : Vec<u8>,

  // Registers
  pc      : i32,
  bp      : i32,
  sp      : i32,
  sb      : i32,

  running : bool,
}

impl Cvm {

  pub fn new(config: CvmConfig) -> Cvm {
    Cvm {
      memory  : vec![0; config.memory_size],
      pc      : 0,
      bp      : 0,
      sp      : -1,
      sb      : 0,
      running : false,
    }
  }

  // region Accessors

  pub fn pc(&self) -> i32 {
    self.pc
  }

  pub fn bp(&self) -> i32 {
    self.bp
  }

  pub fn sp(&self) -> i32 {
    self.sp
  }

  pub fn sb(&self) -> i32 {
    self.sb
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  pub fn memory(&self) -> &[u8] {
    &self.memory
  }

  /// The bytes currently on the stack, bottom first.
  pub fn stack(&self) -> &[u8] {
    let start = self.sb as usize;
    let end   = (self.sp + 1).max(self.sb) as usize;
    self.memory.get(start..end).unwrap_or(&[])
  }

  /// The integer in the top four bytes of the stack.
  pub fn stack_top_int(&self) -> Option<i32> {
    match self.sp - self.sb + 1 >= BYTES_PER_INTEGER {
      true  => self.int_at(self.sp - BYTES_PER_INTEGER + 1).ok(),
      false => None
    }
  }

  pub fn stack_top_byte(&self) -> Option<u8> {
    match self.sp >= self.sb {
      true  => self.byte_at(self.sp).ok(),
      false => None
    }
  }

  // endregion

  // region Memory access

  fn range(&self, address: i32, length: usize) -> Result<Range<usize>, Fault> {
    let start = usize::try_from(address).map_err(|_| Fault::MemoryAccess(address as i64))?;
    match start.checked_add(length) {
      Some(end) if end <= self.memory.len() => Ok(start..end),
      _ => Err(Fault::MemoryAccess(address as i64))
    }
  }

  fn bytes_at(&self, address: i32, length: usize) -> Result<&[u8], Fault> {
    let range = self.range(address, length)?;
    Ok(&self.memory[range])
  }

  fn byte_at(&self, address: i32) -> Result<u8, Fault> {
    Ok(self.bytes_at(address, 1)?[0])
  }

  fn char_at(&self, address: i32) -> Result<u16, Fault> {
    let bytes = self.bytes_at(address, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
  }

  fn int_at(&self, address: i32) -> Result<i32, Fault> {
    let bytes = self.bytes_at(address, 4)?;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
  }

  fn set_bytes(&mut self, address: i32, bytes: &[u8]) -> Result<(), Fault> {
    let range = self.range(address, bytes.len())?;
    self.memory[range].copy_from_slice(bytes);
    Ok(())
  }

  // endregion

  // region Stack

  /**
    Moves `sp` to `new_sp`, faulting if that would put the top of the stack past memory or
    below address 0. Every change to `sp` keeps it at or above -1.
  */
  fn set_sp(&mut self, new_sp: i64) -> Result<(), Fault> {
    if new_sp < -1 {
      return Err(Fault::MemoryAccess(new_sp));
    }
    match new_sp < self.memory.len() as i64 {
      true  => {
        self.sp = i32::try_from(new_sp).map_err(|_| Fault::OutOfMemory)?;
        Ok(())
      }
      false => Err(Fault::OutOfMemory)
    }
  }

  /// The address of the lowest of the top `length` bytes of the stack.
  fn top_address(&self, length: usize) -> Result<i32, Fault> {
    let address = self.sp as i64 - length as i64 + 1;
    i32::try_from(address).map_err(|_| Fault::MemoryAccess(address))
  }

  fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Fault> {
    let top = self.sp as i64 + bytes.len() as i64;
    if top >= self.memory.len() as i64 {
      return Err(Fault::OutOfMemory);
    }
    self.set_bytes(self.sp + 1, bytes)?;
    self.sp = top as i32;
    Ok(())
  }

  fn push_byte(&mut self, value: u8) -> Result<(), Fault> {
    self.push_bytes(&[value])
  }

  fn push_char(&mut self, value: u16) -> Result<(), Fault> {
    self.push_bytes(&value.to_be_bytes())
  }

  fn push_int(&mut self, value: i32) -> Result<(), Fault> {
    self.push_bytes(&value.to_be_bytes())
  }

  fn pop_bytes(&mut self, length: usize) -> Result<Vec<u8>, Fault> {
    let start = self.top_address(length)?;
    let bytes = self.bytes_at(start, length)?.to_vec();
    self.sp = start - 1;
    Ok(bytes)
  }

  fn pop_byte(&mut self) -> Result<u8, Fault> {
    let value = self.byte_at(self.sp)?;
    self.sp -= 1;
    Ok(value)
  }

  fn pop_char(&mut self) -> Result<u16, Fault> {
    let start = self.top_address(2)?;
    let value = self.char_at(start)?;
    self.sp = start - 1;
    Ok(value)
  }

  fn pop_int(&mut self) -> Result<i32, Fault> {
    let start = self.top_address(4)?;
    let value = self.int_at(start)?;
    self.sp = start - 1;
    Ok(value)
  }

  // endregion

  // region Fetch

  fn fetch_byte(&mut self) -> Result<u8, Fault> {
    let value = self.byte_at(self.pc)?;
    self.pc += 1;
    Ok(value)
  }

  fn fetch_char(&mut self) -> Result<u16, Fault> {
    let value = self.char_at(self.pc)?;
    self.pc += 2;
    Ok(value)
  }

  fn fetch_int(&mut self) -> Result<i32, Fault> {
    let value = self.int_at(self.pc)?;
    self.pc += 4;
    Ok(value)
  }

  // endregion

  /**
    Loads object code at address 0 and resets the registers so that `run` starts at the
    first instruction with an empty stack.
  */
  pub fn load(&mut self, code: &[u8]) -> Result<(), Fault> {
    if code.len() > self.memory.len() {
      return Err(Fault::OutOfMemory);
    }
    self.memory.iter_mut().for_each(|byte| *byte = 0);
    self.memory[..code.len()].copy_from_slice(code);

    let end = i32::try_from(code.len()).map_err(|_| Fault::OutOfMemory)?;
    self.pc      = 0;
    self.sb      = end;
    self.bp      = end;
    self.sp      = end - 1;
    self.running = false;
    Ok(())
  }

  /// Runs the loaded program on the process's standard input and output.
  pub fn run(&mut self) -> Result<(), Fault> {
    let stdin  = io::stdin();
    let stdout = io::stdout();
    self.run_with(stdin.lock(), stdout.lock())
  }

  /// Runs the loaded program until it halts or faults.
  pub fn run_with<R: BufRead, W: Write>(&mut self, input: R, output: W) -> Result<(), Fault> {
    let mut console = Console::new(input, output);
    self.running = true;

    while self.running {
      #[cfg(feature = "trace_computation")]
      self.trace();

      if let Err(fault) = self.step(&mut console) {
        self.running = false;
        // The fault is what gets reported, not a failure to flush.
        let _ = console.flush();
        return Err(fault);
      }
    }

    console.flush()
  }

  /// Fetches, decodes, and executes one instruction.
  pub fn step<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> Result<(), Fault> {
    let opcode_address = self.pc;
    let byte = self.fetch_byte()?;
    let opcode = match Opcode::try_from(byte) {
      Ok(opcode) if !opcode.is_pseudo() => opcode,
      _ => return Err(Fault::InvalidOpcode { opcode: byte, address: opcode_address })
    };

    match opcode {
      Opcode::Halt => {
        self.running = false;
      }

      // region Loads

      Opcode::Load => {
        let length  = self.fetch_int()?;
        let length  = usize::try_from(length).map_err(|_| Fault::MemoryAccess(length as i64))?;
        let address = self.pop_int()?;
        let bytes   = self.bytes_at(address, length)?.to_vec();
        self.push_bytes(&bytes)?;
      }
      Opcode::LoadB => {
        let address = self.pop_int()?;
        let value   = self.byte_at(address)?;
        self.push_byte(value)?;
      }
      Opcode::Load2B => {
        let address = self.pop_int()?;
        let value   = self.char_at(address)?;
        self.push_char(value)?;
      }
      Opcode::LoadW => {
        let address = self.pop_int()?;
        let value   = self.int_at(address)?;
        self.push_int(value)?;
      }

      Opcode::Ldcb => {
        let value = self.fetch_byte()?;
        self.push_byte(value)?;
      }
      Opcode::LdcCh => {
        let value = self.fetch_char()?;
        self.push_char(value)?;
      }
      Opcode::LdcInt => {
        let value = self.fetch_int()?;
        self.push_int(value)?;
      }
      Opcode::LdcStr => {
        // Push the length, then the address of the first character.
        let length = self.fetch_int()?;
        self.push_int(length)?;
        self.push_int(self.pc)?;
        self.pc = self.pc.wrapping_add(length.wrapping_mul(2));
      }
      Opcode::LdlAddr => {
        let displacement = self.fetch_int()?;
        self.push_int(self.bp.wrapping_add(displacement))?;
      }
      Opcode::LdgAddr => {
        let displacement = self.fetch_int()?;
        self.push_int(self.sb.wrapping_add(displacement))?;
      }

      Opcode::Ldcb0   => self.push_byte(0)?,
      Opcode::Ldcb1   => self.push_byte(1)?,
      Opcode::LdcInt0 => self.push_int(0)?,
      Opcode::LdcInt1 => self.push_int(1)?,

      // endregion

      // region Stores

      Opcode::Store => {
        let length  = self.fetch_int()?;
        let length  = usize::try_from(length).map_err(|_| Fault::MemoryAccess(length as i64))?;
        let data    = self.pop_bytes(length)?;
        let address = self.pop_int()?;
        self.set_bytes(address, &data)?;
      }
      Opcode::StoreB => {
        let value   = self.pop_byte()?;
        let address = self.pop_int()?;
        self.set_bytes(address, &[value])?;
      }
      Opcode::Store2B => {
        let value   = self.pop_char()?;
        let address = self.pop_int()?;
        self.set_bytes(address, &value.to_be_bytes())?;
      }
      Opcode::StoreW => {
        let value   = self.pop_int()?;
        let address = self.pop_int()?;
        self.set_bytes(address, &value.to_be_bytes())?;
      }

      // endregion

      // region Compare and branch

      Opcode::Cmp => {
        let right = self.pop_int()?;
        let left  = self.pop_int()?;
        let ordering = left.cmp(&right) as i8;
        self.push_byte(ordering as u8)?;
      }

      Opcode::Br => {
        let displacement = self.fetch_int()?;
        self.pc = opcode_address.wrapping_add(displacement);
      }
      Opcode::Call => {
        let displacement = self.fetch_int()?;
        self.push_int(self.bp)?; // dynamic link
        self.push_int(self.pc)?; // return address
        self.bp = self.sp - BYTES_PER_FRAME + 1;
        self.pc = opcode_address.wrapping_add(displacement);
      }

      Opcode::Bnz | Opcode::Bz | Opcode::Bg | Opcode::Bge | Opcode::Bl | Opcode::Ble => {
        let displacement = self.fetch_int()?;
        let value = self.pop_byte()? as i8;
        let taken = match opcode {
          Opcode::Bnz => value != 0,
          Opcode::Bz  => value == 0,
          Opcode::Bg  => value > 0,
          Opcode::Bge => value >= 0,
          Opcode::Bl  => value < 0,
          _           => value <= 0,
        };
        if taken {
          self.pc = opcode_address.wrapping_add(displacement);
        }
      }

      // endregion

      // region Shifts, logic, arithmetic

      Opcode::Shl => {
        let amount = (self.fetch_byte()? & 0x1F) as u32;
        let value  = self.pop_int()?;
        self.push_int(value.wrapping_shl(amount))?;
      }
      Opcode::Shr => {
        let amount = (self.fetch_byte()? & 0x1F) as u32;
        let value  = self.pop_int()?;
        self.push_int(value.wrapping_shr(amount))?;
      }

      Opcode::Not => {
        let value = self.pop_byte()?;
        self.push_byte(if value == 0 { 1 } else { 0 })?;
      }

      Opcode::Add | Opcode::Sub | Opcode::Mul => {
        let right = self.pop_int()?;
        let left  = self.pop_int()?;
        let value = match opcode {
          Opcode::Add => left.wrapping_add(right),
          Opcode::Sub => left.wrapping_sub(right),
          _           => left.wrapping_mul(right),
        };
        self.push_int(value)?;
      }
      Opcode::Div | Opcode::Mod => {
        // Check the divisor before touching the stack.
        if self.int_at(self.top_address(4)?)? == 0 {
          return Err(Fault::DivideByZero);
        }
        let right = self.pop_int()?;
        let left  = self.pop_int()?;
        let value = match opcode {
          Opcode::Div => left.wrapping_div(right),
          _           => left.wrapping_rem(right),
        };
        self.push_int(value)?;
      }
      Opcode::Neg => {
        let value = self.pop_int()?;
        self.push_int(value.wrapping_neg())?;
      }
      Opcode::Inc => {
        let value = self.pop_int()?;
        self.push_int(value.wrapping_add(1))?;
      }
      Opcode::Dec => {
        let value = self.pop_int()?;
        self.push_int(value.wrapping_sub(1))?;
      }

      // endregion

      // region I/O

      Opcode::GetCh => {
        let c = console.read_char()?;
        let unit = u16::try_from(c as u32)
          .map_err(|_| Fault::InvalidInput(format!("'{}' is not a 16 bit character", c)))?;
        self.push_char(unit)?;
      }
      Opcode::GetInt => {
        let value = console.read_int()?;
        self.push_int(value)?;
      }

      Opcode::PutByte => {
        let value = self.pop_byte()? as i8;
        write!(console.out(), "{}", value)?;
      }
      Opcode::PutCh => {
        let unit = self.pop_char()?;
        let c = char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
        write!(console.out(), "{}", c)?;
      }
      Opcode::PutInt => {
        let value = self.pop_int()?;
        write!(console.out(), "{}", value)?;
      }
      Opcode::PutEol => {
        writeln!(console.out())?;
      }
      Opcode::PutStr => {
        let address = self.pop_int()?;
        let length  = self.pop_int()?;
        let length  = usize::try_from(length).map_err(|_| Fault::MemoryAccess(length as i64))?;
        let bytes   = self.bytes_at(address, 2 * length)?;
        let units: Vec<u16> = bytes.chunks_exact(2)
                                   .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                                   .collect();
        write!(console.out(), "{}", String::from_utf16_lossy(&units))?;
      }

      // endregion

      // region Program and procedures

      Opcode::Program => {
        let length = self.fetch_int()?;
        self.bp = self.sb;
        self.set_sp(self.bp as i64 + length as i64 - 1)?;
      }
      Opcode::Proc | Opcode::Alloc => {
        let length = self.fetch_int()?;
        self.set_sp(self.sp as i64 + length as i64)?;
      }
      Opcode::Ret => {
        let parameters = self.fetch_int()?;
        let frame = self.bp;
        let link = self.int_at(frame)?;
        let return_address = self.int_at(frame.wrapping_add(BYTES_PER_INTEGER))?;
        self.set_sp(frame as i64 - parameters as i64 - 1)?;
        self.bp = link;
        self.pc = return_address;
      }

      // endregion

      Opcode::DefInt => {
        return Err(Fault::InvalidOpcode { opcode: byte, address: opcode_address });
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assembler::{Assembler, AssemblerConfig};

  fn assemble(text: &str) -> Vec<u8> {
    Assembler::new(AssemblerConfig { optimize: false, ..AssemblerConfig::default() })
      .assemble(text)
      .unwrap()
      .code
  }

  fn run(text: &str, input: &str) -> (Cvm, Result<(), Fault>, String) {
    let mut cvm = Cvm::new(CvmConfig::default());
    cvm.load(&assemble(text)).unwrap();
    let mut output = Vec::new();
    let result = cvm.run_with(input.as_bytes(), &mut output);
    (cvm, result, String::from_utf8(output).unwrap())
  }

  #[test]
  fn loading_sets_up_an_empty_stack() {
    let mut cvm = Cvm::new(CvmConfig::default());
    cvm.load(&[16, 0, 0, 0, 3, 0]).unwrap();
    assert_eq!((cvm.pc(), cvm.sb(), cvm.bp(), cvm.sp()), (0, 6, 6, 5));
    assert!(cvm.stack().is_empty());

    let mut small = Cvm::new(CvmConfig { memory_size: 4 });
    assert_eq!(small.load(&[0; 5]), Err(Fault::OutOfMemory));
  }

  #[test]
  fn arithmetic_and_comparison() {
    let (cvm, result, _) = run("LDCINT 7\nLDCINT 3\nSUB\nLDCINT -2\nMUL\nHALT", "");
    assert_eq!(result, Ok(()));
    assert_eq!(cvm.stack_top_int(), Some(-8));

    let (cvm, _, _) = run("LDCINT 2\nLDCINT 5\nCMP\nHALT", "");
    assert_eq!(cvm.stack_top_byte(), Some(0xFF));
    assert_eq!(cvm.stack().len(), 1);

    let (cvm, _, _) = run("LDCINT -7\nLDCINT 2\nMOD\nLDCINT -16\nSHR 2\nHALT", "");
    assert_eq!(cvm.stack(), &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC][..]);
  }

  #[test]
  fn division_by_zero_faults_without_popping() {
    let (cvm, result, _) = run("LDCINT 4\nLDCINT 0\nDIV\nHALT", "");
    assert_eq!(result, Err(Fault::DivideByZero));
    assert_eq!(cvm.sp() - cvm.sb() + 1, 8);
    assert_eq!(cvm.pc(), 11);
    assert!(!cvm.is_running());
  }

  #[test]
  fn branches_are_relative_to_the_opcode() {
    let text = "
          LDCINT 3
      L1: DEC
          LDCINT 0
          LDLADDR 0
          LOADW
          CMP
          BL L1
          HALT
    ";
    // Counts down from 3, comparing 0 with the counter until it is no longer smaller.
    let (cvm, result, _) = run(text, "");
    assert_eq!(result, Ok(()));
    assert_eq!(cvm.stack_top_int(), Some(0));
  }

  #[test]
  fn strings_and_console_output() {
    let (_, result, output) = run(
      "LDCSTR \"Hi, \"\nPUTSTR\nGETINT\nINC\nPUTINT\nLDCCH '!'\nPUTCH\nLDCB -3\nPUTBYTE\nPUTEOL\nHALT",
      "41\n"
    );
    assert_eq!(result, Ok(()));
    assert_eq!(output, "Hi, 42!-3\n");
  }

  #[test]
  fn reading_past_the_input_faults() {
    let (_, result, _) = run("GETCH\nHALT", "");
    assert_eq!(result, Err(Fault::InvalidInput("EOF".to_string())));
    let (_, result, _) = run("GETINT\nHALT", "twelve");
    assert!(matches!(result, Err(Fault::InvalidInput(_))));
  }

  #[test]
  fn call_and_return_restore_the_frame() {
    let text = "
          PROGRAM 4
          LDCINT 10
          CALL P
          HALT
      P:  PROC 4
          LDLADDR -4
          LOADW
          PUTINT
          RET 4
    ";
    let (cvm, result, output) = run(text, "");
    assert_eq!(result, Ok(()));
    assert_eq!(output, "10");
    assert_eq!(cvm.bp(), cvm.sb());
    // The parameter is popped by RET, leaving only the program's variables.
    assert_eq!(cvm.sp(), cvm.sb() + 3);
  }

  #[test]
  fn stack_overflow_is_out_of_memory() {
    let mut cvm = Cvm::new(CvmConfig { memory_size: 64 });
    cvm.load(&assemble("PROGRAM 100\nHALT")).unwrap();
    assert_eq!(cvm.run_with("".as_bytes(), Vec::new()), Err(Fault::OutOfMemory));

    let mut cvm = Cvm::new(CvmConfig { memory_size: 16 });
    cvm.load(&assemble("L1: LDCINT 1\nBR L1")).unwrap();
    assert_eq!(cvm.run_with("".as_bytes(), Vec::new()), Err(Fault::OutOfMemory));
  }

  #[test]
  fn stack_pointer_never_drops_below_memory() {
    // 18 bytes of code, so the frame of RET starts at 18.
    let (cvm, result, _) = run("LDCINT 0\nLDCINT 16\nRET -2147483632\nHALT\nADD\nHALT", "");
    assert_eq!(result, Err(Fault::OutOfMemory));
    assert_eq!(cvm.sp(), 25);

    let (cvm, result, _) = run("LDCINT 0\nLDCINT 16\nRET 100\nHALT\nADD\nHALT", "");
    assert_eq!(result, Err(Fault::MemoryAccess(18 - 100 - 1)));
    assert_eq!(cvm.sp(), 25);

    let (cvm, result, _) = run("ALLOC -100\nHALT", "");
    assert_eq!(result, Err(Fault::MemoryAccess(5 - 100)));
    assert_eq!(cvm.sp(), 5);
  }

  #[test]
  fn unknown_opcodes_fault() {
    let mut cvm = Cvm::new(CvmConfig::default());
    cvm.load(&[1]).unwrap();
    assert_eq!(
      cvm.run_with("".as_bytes(), Vec::new()),
      Err(Fault::InvalidOpcode { opcode: 1, address: 0 })
    );
  }
}

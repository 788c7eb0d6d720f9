/*!

  The CVM is a byte-addressed stack machine. Instructions are variable length: a one byte
  opcode followed by zero or one argument. All multi-byte values are big-endian. The sizes of
  instruction components are as follows:

    Opcode:        8 bits
    Byte:          8 bits   (LDCB, SHL, SHR)
    Char:         16 bits   (LDCCH, a UTF-16 code unit)
    Int/Address:  32 bits   (everything else with an argument)
    String:       32 bit length followed by 16 bits per code unit (LDCSTR)

  Labels do not appear in the bytecode. They are symbolic names for locations in code
  memory. Branch and call instructions store the *displacement* from their own opcode
  address to the label's address, so the code is position independent.

  The assembler represents an instruction as a struct holding its labels, its `Opcode`, and
  an optional typed `Argument`; the argument's layout in binary is determined entirely by
  the opcode (see `Opcode::arg_kind`).

*/

mod assembly;
mod binary;
mod instruction;

pub use assembly::parse_assembly;
pub use binary::{
  decode_program, disassemble, emit_program, encode_instruction, try_decode_instruction,
};
pub use instruction::{Argument, Instruction};

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const BYTES_PER_OPCODE  : i32 = 1;
pub const BYTES_PER_INTEGER : i32 = 4;
pub const BYTES_PER_ADDRESS : i32 = 4;
pub const BYTES_PER_CHAR    : i32 = 2;
pub const BYTES_PER_BOOLEAN : i32 = 1;
/// A frame header holds two addresses: the dynamic link and the return address.
pub const BYTES_PER_FRAME   : i32 = 2 * BYTES_PER_ADDRESS;

/**
  Opcodes of the virtual machine.

  The discriminant of each variant is the byte written to the object file, so the values
  below are part of the binary format and must not be renumbered. Mnemonics are the upper
  case variant names (`LdcInt` is written `LDCINT`) and are parsed case-insensitively.

  `DefInt` is a pseudo-opcode. It reserves a named stack slot in the assembler and never
  appears in a binary; the decoder and the VM both reject its byte value.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,            Hash
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[repr(u8)]
pub enum Opcode {
  // halt opcode
  Halt    = 0,

  // load opcodes (move data from memory to top of stack)
  Load    = 10,
  LoadB   = 11,
  Load2B  = 12,
  LoadW   = 13,
  Ldcb    = 14,
  LdcCh   = 15,
  LdcInt  = 16,
  LdcStr  = 17,
  LdlAddr = 18,
  LdgAddr = 19,

  // optimized loads for special constants
  Ldcb0   = 20,
  Ldcb1   = 21,
  LdcInt0 = 22,
  LdcInt1 = 23,

  // store opcodes (move data from top of stack to memory)
  Store   = 30,
  StoreB  = 31,
  Store2B = 32,
  StoreW  = 33,

  // compare/branch opcodes
  Cmp     = 40,
  Br      = 41,
  Bnz     = 42,
  Bz      = 43,
  Bg      = 44,
  Bge     = 45,
  Bl      = 46,
  Ble     = 47,

  // shift opcodes
  Shl     = 50,
  Shr     = 51,

  // logical not opcode
  Not     = 60,

  // arithmetic opcodes
  Add     = 70,
  Sub     = 71,
  Mul     = 72,
  Div     = 73,
  Mod     = 74,
  Neg     = 75,
  Inc     = 76,
  Dec     = 77,

  // I/O opcodes
  GetCh   = 80,
  GetInt  = 81,
  PutByte = 82,
  PutCh   = 83,
  PutInt  = 84,
  PutEol  = 85,
  PutStr  = 86,

  // program/procedure opcodes
  Program = 90,
  Proc    = 91,
  Call    = 92,
  Ret     = 93,
  Alloc   = 94,

  // pseudo opcodes
  DefInt  = 100,
}

/// The binary layout and the accepted source form of an opcode's argument.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ArgKind {
  None,
  /// An integer literal stored in one byte.
  Byte,
  /// A character literal stored as one UTF-16 code unit.
  Char,
  /// An integer literal stored in four bytes.
  Int,
  /// A string literal: four byte length followed by the UTF-16 payload.
  Str,
  /// A label reference stored as a four byte displacement.
  Label,
  /// An integer literal or a `DEFINT`-declared identifier, stored in four bytes.
  Offset,
  /// An identifier being declared. Occupies no space.
  Declaration,
}

impl Opcode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn mnemonic(&self) -> &'static str {
    (*self).into()
  }

  pub fn arg_kind(&self) -> ArgKind {
    use Opcode::*;
    match self {
      Ldcb | Shl | Shr                                     => ArgKind::Byte,
      LdcCh                                                => ArgKind::Char,
      LdcStr                                               => ArgKind::Str,
      Load | LdcInt | Store | Program | Proc | Ret | Alloc => ArgKind::Int,
      LdlAddr | LdgAddr                                    => ArgKind::Offset,
      Br | Bnz | Bz | Bg | Bge | Bl | Ble | Call           => ArgKind::Label,
      DefInt                                               => ArgKind::Declaration,
      _                                                    => ArgKind::None,
    }
  }

  /// The number of arguments written after the mnemonic in assembly source.
  pub fn arity(&self) -> usize {
    match self.arg_kind() {
      ArgKind::None => 0,
      _             => 1
    }
  }

  /// Pseudo-opcodes exist only in assembly source.
  pub fn is_pseudo(&self) -> bool {
    *self == Opcode::DefInt
  }

  pub fn is_conditional_branch(&self) -> bool {
    matches!(self, Opcode::Bnz | Opcode::Bz | Opcode::Bg | Opcode::Bge | Opcode::Bl | Opcode::Ble)
  }

  /**
    Returns the conditional branch taken exactly when `self` is not taken, e.g. `BLE` for
    `BG`. Returns `None` for anything that is not a conditional branch.
  */
  pub fn negated_branch(&self) -> Option<Opcode> {
    match self {
      Opcode::Bnz => Some(Opcode::Bz),
      Opcode::Bz  => Some(Opcode::Bnz),
      Opcode::Bg  => Some(Opcode::Ble),
      Opcode::Bge => Some(Opcode::Bl),
      Opcode::Bl  => Some(Opcode::Bge),
      Opcode::Ble => Some(Opcode::Bg),
      _           => None
    }
  }
}

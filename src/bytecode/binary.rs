/*!
  This module is responsible for the encoding and decoding of binary instructions.

  Encoding needs the symbol tables built by the resolver: label arguments are written as the
  displacement from the instruction's own address, and identifier arguments as their stack
  displacement. Decoding goes the other way only as far as the binary allows. Labels and
  identifier names are not recoverable, so branch and address arguments decode to
  `Argument::Int`.
*/
use std::convert::TryFrom;

use super::{ArgKind, Argument, Instruction, Opcode};
use crate::error::{DecodeError, EmitError};
use crate::symboltable::{IdTable, LabelTable};

/**
  Appends the binary form of `instruction` to `out`. Pseudo-opcodes emit nothing. It is the
  caller's responsibility to have checked the instruction's constraints; an argument of the
  wrong type is reported but not diagnosed in detail.
*/
pub fn encode_instruction(
  instruction : &Instruction,
  labels      : &LabelTable,
  ids         : &IdTable,
  out         : &mut Vec<u8>
) -> Result<(), EmitError>
{
  let opcode = instruction.opcode;
  if opcode.is_pseudo() {
    return Ok(());
  }
  let wrong_argument = || EmitError::WrongArgument { opcode: opcode.mnemonic() };

  out.push(opcode.code());

  match (opcode.arg_kind(), &instruction.arg) {
    (ArgKind::None, None) => {}

    (ArgKind::Byte, Some(Argument::Int(value))) => {
      // [OpCode:8][Byte:8]
      out.push(*value as i8 as u8);
    }

    (ArgKind::Char, Some(Argument::Char(c))) => {
      // [OpCode:8][Char:16]
      let unit = u16::try_from(*c as u32).map_err(|_| wrong_argument())?;
      out.extend_from_slice(&unit.to_be_bytes());
    }

    (ArgKind::Int, Some(Argument::Int(value)))
    | (ArgKind::Offset, Some(Argument::Int(value))) => {
      // [OpCode:8][Int:32]
      out.extend_from_slice(&value.to_be_bytes());
    }

    (ArgKind::Offset, Some(Argument::Id(id))) => {
      let offset = ids.get_offset(id)
                      .ok_or_else(|| EmitError::UndeclaredIdentifier(id.to_string()))?;
      out.extend_from_slice(&offset.to_be_bytes());
    }

    (ArgKind::Label, Some(Argument::Id(reference))) => {
      // [OpCode:8][Displacement:32]
      let unresolved = || EmitError::UnresolvedLabel(reference.to_string());
      let target  = labels.resolve(reference).ok_or_else(unresolved)?;
      let address = instruction.address().ok_or_else(unresolved)?;
      out.extend_from_slice(&(target - address).to_be_bytes());
    }

    (ArgKind::Str, Some(Argument::Str(text))) => {
      // [OpCode:8][Length:32][Char:16]*
      let units: Vec<u16> = text.encode_utf16().collect();
      out.extend_from_slice(&(units.len() as i32).to_be_bytes());
      for unit in units {
        out.extend_from_slice(&unit.to_be_bytes());
      }
    }

    _ => return Err(wrong_argument())
  }

  Ok(())
}

/// Emits an entire program whose addresses have been resolved.
pub fn emit_program(program: &[Instruction], labels: &LabelTable, ids: &IdTable)
  -> Result<Vec<u8>, EmitError>
{
  let mut code = Vec::with_capacity(
    program.iter().map(|instruction| instruction.size() as usize).sum()
  );
  for instruction in program {
    encode_instruction(instruction, labels, ids, &mut code)?;
  }
  Ok(code)
}

fn read_bytes<const N: usize>(code: &[u8], at: usize, address: usize)
  -> Result<[u8; N], DecodeError>
{
  code.get(at..at + N)
      .and_then(|slice| <[u8; N]>::try_from(slice).ok())
      .ok_or(DecodeError::Truncated { address })
}

/**
  Decodes the instruction beginning at `address`. Returns the instruction and the address of
  the next one.
*/
pub fn try_decode_instruction(code: &[u8], address: usize)
  -> Result<(Instruction, usize), DecodeError>
{
  let byte   = *code.get(address).ok_or(DecodeError::Truncated { address })?;
  let opcode = match Opcode::try_from(byte) {
    Ok(opcode) if !opcode.is_pseudo() => opcode,
    _ => return Err(DecodeError::UnknownOpcode { opcode: byte, address })
  };
  let at = address + 1;

  let (arg, next) = match opcode.arg_kind() {
    ArgKind::None | ArgKind::Declaration => (None, at),

    ArgKind::Byte => {
      let [value] = read_bytes::<1>(code, at, address)?;
      (Some(Argument::Int(value as i8 as i32)), at + 1)
    }

    ArgKind::Char => {
      let unit = u16::from_be_bytes(read_bytes::<2>(code, at, address)?);
      let c = char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
      (Some(Argument::Char(c)), at + 2)
    }

    ArgKind::Int | ArgKind::Offset | ArgKind::Label => {
      let value = i32::from_be_bytes(read_bytes::<4>(code, at, address)?);
      (Some(Argument::Int(value)), at + 4)
    }

    ArgKind::Str => {
      let length = i32::from_be_bytes(read_bytes::<4>(code, at, address)?);
      let length = usize::try_from(length).map_err(|_| DecodeError::Truncated { address })?;
      let mut units = Vec::with_capacity(length);
      let mut cursor = at + 4;
      for _ in 0..length {
        units.push(u16::from_be_bytes(read_bytes::<2>(code, cursor, address)?));
        cursor += 2;
      }
      (Some(Argument::Str(String::from_utf16_lossy(&units))), cursor)
    }
  };

  Ok((Instruction::new(opcode, arg), next))
}

/// Decodes a whole object file, pairing each instruction with its address.
pub fn decode_program(code: &[u8]) -> Result<Vec<(usize, Instruction)>, DecodeError> {
  let mut program = Vec::new();
  let mut address = 0;
  while address < code.len() {
    let (instruction, next) = try_decode_instruction(code, address)?;
    program.push((address, instruction));
    address = next;
  }
  Ok(program)
}

/**
  Renders object code as a listing, one instruction per line preceded by its address. Branch
  targets are given as an absolute address in a trailing comment so the listing stays valid
  assembly text.
*/
pub fn disassemble(code: &[u8]) -> Result<String, DecodeError> {
  let mut listing = String::new();
  for (address, instruction) in decode_program(code)? {
    let line = match (instruction.opcode.arg_kind(), &instruction.arg) {
      (ArgKind::Label, Some(Argument::Int(displacement))) => {
        format!(
          "{:>4}:  {}   ; -> {}",
          address,
          instruction,
          address as i64 + *displacement as i64
        )
      }
      _ => format!("{:>4}:  {}", address, instruction)
    };
    listing.push_str(&line);
    listing.push('\n');
  }
  Ok(listing)
}

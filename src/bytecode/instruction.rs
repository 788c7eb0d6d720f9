use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use super::{ArgKind, Opcode, BYTES_PER_CHAR, BYTES_PER_INTEGER, BYTES_PER_OPCODE};
use crate::error::ConstraintError;
use crate::symboltable::{IdTable, LabelTable};

/// The argument of an instruction as written in assembly source.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Argument {
  Int(i32),
  Char(char),
  /// The body of a string literal, without the quotes.
  Str(String),
  /// A bare identifier: a label reference or a `DEFINT`-declared stack slot.
  Id(DefaultAtom),
}

impl Argument {
  pub fn as_int(&self) -> Option<i32> {
    match self {
      Argument::Int(value) => Some(*value),
      _                    => None
    }
  }

  pub fn as_id(&self) -> Option<&DefaultAtom> {
    match self {
      Argument::Id(id) => Some(id),
      _                => None
    }
  }

  fn type_name(&self) -> &'static str {
    match self {
      Argument::Int(_)  => "intLiteral",
      Argument::Char(_) => "charLiteral",
      Argument::Str(_)  => "stringLiteral",
      Argument::Id(_)   => "identifier",
    }
  }
}

/// Writes `c` the way it would appear between quotes in assembly source.
fn write_escaped(f: &mut Formatter<'_>, c: char) -> std::fmt::Result {
  match c {
    '\u{8}'  => write!(f, "\\b"),
    '\t'     => write!(f, "\\t"),
    '\n'     => write!(f, "\\n"),
    '\u{c}'  => write!(f, "\\f"),
    '\r'     => write!(f, "\\r"),
    '"'      => write!(f, "\\\""),
    '\''     => write!(f, "\\'"),
    '\\'     => write!(f, "\\\\"),
    _        => write!(f, "{}", c),
  }
}

impl Display for Argument {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Argument::Int(value) => write!(f, "{}", value),
      Argument::Char(c)    => {
        write!(f, "'")?;
        write_escaped(f, *c)?;
        write!(f, "'")
      }
      Argument::Str(text)  => {
        write!(f, "\"")?;
        for c in text.chars() {
          write_escaped(f, c)?;
        }
        write!(f, "\"")
      }
      Argument::Id(id)     => write!(f, "{}", id),
    }
  }
}

/**
  One assembly language instruction: the labels defined at its address, its opcode, and its
  argument if the opcode takes one.

  The address is unset until the resolver assigns it with `set_address`, which also binds
  the labels. Equality ignores the address and source line, so an optimized program can be
  compared with a hand-written expectation.
*/
#[derive(Clone, Debug)]
pub struct Instruction {
  pub labels : Vec<DefaultAtom>,
  pub opcode : Opcode,
  pub arg    : Option<Argument>,
  /// The source line, or 0 for instructions synthesized by the optimizer.
  pub line   : u32,
  address    : Option<i32>,
}

impl PartialEq for Instruction {
  fn eq(&self, other: &Instruction) -> bool {
    self.labels == other.labels && self.opcode == other.opcode && self.arg == other.arg
  }
}

impl Eq for Instruction {}

impl Instruction {

  pub fn new(opcode: Opcode, arg: Option<Argument>) -> Instruction {
    Instruction {
      labels  : Vec::new(),
      opcode,
      arg,
      line    : 0,
      address : None
    }
  }

  pub fn nullary(opcode: Opcode) -> Instruction {
    Instruction::new(opcode, None)
  }

  pub fn with_int(opcode: Opcode, value: i32) -> Instruction {
    Instruction::new(opcode, Some(Argument::Int(value)))
  }

  pub fn with_id(opcode: Opcode, id: &str) -> Instruction {
    Instruction::new(opcode, Some(Argument::Id(DefaultAtom::from(id))))
  }

  /// Adds a label; `label` may be given with or without its trailing colon.
  pub fn labeled(mut self, label: &str) -> Instruction {
    let text = match label.ends_with(':') {
      true  => label.to_string(),
      false => format!("{}:", label)
    };
    self.labels.push(DefaultAtom::from(text));
    self
  }

  pub fn at_line(mut self, line: u32) -> Instruction {
    self.line = line;
    self
  }

  pub fn is_labeled(&self) -> bool {
    !self.labels.is_empty()
  }

  /// True if one of this instruction's labels is the target of `reference`.
  pub fn defines_label(&self, reference: &str) -> bool {
    self.labels
        .iter()
        .any(|label| label.strip_suffix(':') == Some(reference))
  }

  /// The integer argument, if this is `opcode` with an integer literal.
  pub fn int_arg_of(&self, opcode: Opcode) -> Option<i32> {
    match self.opcode == opcode {
      true  => self.arg.as_ref().and_then(Argument::as_int),
      false => None
    }
  }

  pub fn address(&self) -> Option<i32> {
    self.address
  }

  /**
    Returns the number of bytes in memory occupied by the argument. For `LDCSTR` this counts
    both the length word and the UTF-16 payload that the single source argument expands to.
  */
  pub fn arg_size(&self) -> i32 {
    match self.opcode.arg_kind() {
      ArgKind::None                                  => 0,
      ArgKind::Byte                                  => 1,
      ArgKind::Char                                  => BYTES_PER_CHAR,
      ArgKind::Int | ArgKind::Label | ArgKind::Offset => BYTES_PER_INTEGER,
      ArgKind::Declaration                           => BYTES_PER_INTEGER,
      ArgKind::Str                                   => {
        let length = match &self.arg {
          Some(Argument::Str(text)) => text.encode_utf16().count() as i32,
          _                         => 0
        };
        BYTES_PER_INTEGER + BYTES_PER_CHAR * length
      }
    }
  }

  /// Returns the number of bytes in memory occupied by the instruction.
  pub fn size(&self) -> i32 {
    match self.opcode.is_pseudo() {
      // Pseudo-opcodes only make symbol table entries.
      true  => 0,
      false => BYTES_PER_OPCODE + self.arg_size()
    }
  }

  /**
    Sets the memory address of this instruction and defines its labels at that address.
    Fails on the first label that is already bound.
  */
  pub fn set_address(&mut self, address: i32, labels: &mut LabelTable)
    -> Result<(), ConstraintError>
  {
    self.address = Some(address);
    for label in self.labels.iter() {
      if labels.define(label, address).is_err() {
        return Err(ConstraintError::new(
          self.line,
          format!("The label \"{}\" has already been defined.", label)
        ));
      }
    }
    Ok(())
  }

  /**
    Checks the contextual constraints on this instruction. Must only be called after every
    instruction of the program has its address, since label arguments are checked against
    the completed label table.
  */
  pub fn check_constraints(&self, labels: &LabelTable, ids: &IdTable)
    -> Result<(), ConstraintError>
  {
    let kind = self.opcode.arg_kind();
    let arg = match (&self.arg, kind) {
      (None, ArgKind::None) => return Ok(()),
      (Some(arg), ArgKind::None) => {
        return Err(self.error(format!("No arguments allowed for {}, found {}.", self.opcode, arg)));
      }
      (None, _) => {
        return Err(self.error(format!("One argument is required for {}.", self.opcode)));
      }
      (Some(arg), _) => arg,
    };

    match (kind, arg) {
      (ArgKind::Int, Argument::Int(_)) => Ok(()),

      (ArgKind::Byte, Argument::Int(value)) => {
        match self.opcode {
          Opcode::Shl | Opcode::Shr if !(0..=31).contains(value) => {
            Err(self.error("Shift amount must be in the range 0..31"))
          }
          _ if i8::try_from(*value).is_err() => {
            Err(self.error(format!("Byte value {} is out of the range -128..127", value)))
          }
          _ => Ok(())
        }
      }

      (ArgKind::Char, Argument::Char(c)) => {
        match c.len_utf16() {
          1 => Ok(()),
          _ => Err(self.error("Character not in Unicode Basic Multilingual Plane (BMP)"))
        }
      }

      (ArgKind::Str, Argument::Str(text)) => {
        match text.chars().all(|c| c.len_utf16() == 1) {
          true  => Ok(()),
          false => Err(self.error("Character not in Unicode Basic Multilingual Plane (BMP)"))
        }
      }

      (ArgKind::Label, Argument::Id(reference)) => {
        match labels.resolve(reference) {
          Some(_) => Ok(()),
          None    => Err(self.error(format!("label \"{}\" has not been defined.", reference)))
        }
      }

      (ArgKind::Offset, Argument::Int(_)) => Ok(()),

      (ArgKind::Offset, Argument::Id(id)) => {
        match ids.get_offset(id) {
          Some(_) => Ok(()),
          None    => Err(self.error(format!("identifier \"{}\" has not been defined.", id)))
        }
      }

      (ArgKind::Declaration, Argument::Id(_)) => Ok(()),

      (kind, arg) => {
        Err(self.error(format!(
          "Invalid type for argument -- should be {} but found {}",
          expected_type(kind),
          arg.type_name()
        )))
      }
    }
  }

  fn error(&self, message: impl Into<String>) -> ConstraintError {
    ConstraintError::new(self.line, message)
  }
}

fn expected_type(kind: ArgKind) -> &'static str {
  match kind {
    ArgKind::Int | ArgKind::Byte           => "intLiteral",
    ArgKind::Char                          => "charLiteral",
    ArgKind::Str                           => "stringLiteral",
    ArgKind::Label | ArgKind::Declaration  => "identifier",
    ArgKind::Offset                        => "intLiteral or identifier",
    ArgKind::None                          => "nothing",
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for label in self.labels.iter() {
      write!(f, "{} ", label)?;
    }
    match &self.arg {
      Some(arg) => write!(f, "{} {}", self.opcode, arg),
      None      => write!(f, "{}", self.opcode)
    }
  }
}

/*!
  The human readable textual form of bytecode is called assembly. This module parses assembly
  text into a list of `Instruction`s, relying on the `strum` derives of `Opcode` to recognize
  mnemonics.

  Parsing happens in two steps. A `nom` tokenizer splits the text into labels, words, and
  literals, skipping whitespace and `;` comments and remembering the line each token started
  on. A small grammar loop then groups tokens into `(label ':')* mnemonic argument?`. Line
  breaks carry no meaning beyond error reporting and recovery: after a syntax error the rest
  of the offending line is discarded and parsing resumes, so one pass reports every bad line.

  The parser guarantees argument *count* only. Whether the argument has the right type for
  the opcode is a constraint check done later by the assembler.
*/

use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::tag,
  character::complete::{
    alpha1,
    alphanumeric1,
    char as one_char,
    digit1,
    multispace1,
    none_of,
    not_line_ending,
    one_of
  },
  combinator::{map, opt, recognize, value},
  multi::{fold_many0, many0_count},
  sequence::{delimited, pair, preceded, terminated},
  IResult
};
use string_cache::DefaultAtom;

use super::{Argument, Instruction, Opcode};
use crate::error::SyntaxError;

#[derive(Clone, Debug, PartialEq)]
enum Token<'a> {
  /// An identifier immediately followed by a colon. The text includes the colon.
  Label(&'a str),
  Word(&'a str),
  /// The digits of an integer literal, sign included. Converted once the range is checked.
  Int(&'a str),
  Char(char),
  Str(String),
}

impl<'a> Token<'a> {
  fn describe(&self) -> String {
    match self {
      Token::Label(text) => format!("label \"{}\"", text),
      Token::Word(text)  => format!("\"{}\"", text),
      Token::Int(text)   => format!("integer {}", text),
      Token::Char(_)     => "a character literal".to_string(),
      Token::Str(_)      => "a string literal".to_string(),
    }
  }
}

// region Tokenizer

fn identifier(input: &str) -> IResult<&str, &str> {
  recognize(
    pair(
      alt((alpha1, tag("_"))),
      many0_count(alt((alphanumeric1, tag("_"))))
    )
  )(input)
}

fn label(input: &str) -> IResult<&str, &str> {
  recognize(terminated(identifier, one_char(':')))(input)
}

fn int_literal(input: &str) -> IResult<&str, &str> {
  recognize(pair(opt(one_char('-')), digit1))(input)
}

fn escape(input: &str) -> IResult<&str, char> {
  map(
    preceded(one_char('\\'), one_of("btnfr\"'\\")),
    |c| match c {
      'b' => '\u{8}',
      't' => '\t',
      'n' => '\n',
      'f' => '\u{c}',
      'r' => '\r',
      c   => c
    }
  )(input)
}

fn char_literal(input: &str) -> IResult<&str, char> {
  delimited(
    one_char('\''),
    alt((escape, none_of("\\'\r\n"))),
    one_char('\'')
  )(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
  delimited(
    one_char('"'),
    fold_many0(
      alt((escape, none_of("\\\"\r\n"))),
      String::new,
      |mut body, c| {
        body.push(c);
        body
      }
    ),
    one_char('"')
  )(input)
}

fn token(input: &str) -> IResult<&str, Token> {
  alt((
    map(label, Token::Label),
    map(identifier, Token::Word),
    map(int_literal, Token::Int),
    map(char_literal, Token::Char),
    map(string_literal, Token::Str),
  ))(input)
}

/// Skips whitespace and comments.
fn filler(input: &str) -> IResult<&str, usize> {
  many0_count(
    alt((
      value((), multispace1),
      value((), pair(one_char(';'), not_line_ending))
    ))
  )(input)
}

// Counts the newlines consumed in going from `from` to `to`, both suffixes of the same text.
fn newlines_between(from: &str, to: &str) -> u32 {
  from[..from.len() - to.len()].matches('\n').count() as u32
}

fn tokenize(text: &str) -> (Vec<(u32, Token)>, Vec<SyntaxError>) {
  let mut tokens = Vec::new();
  let mut errors = Vec::new();
  let mut rest   = text;
  let mut line   = 1;

  loop {
    if let Ok((remaining, _)) = filler(rest) {
      line += newlines_between(rest, remaining);
      rest = remaining;
    }
    if rest.is_empty() {
      break;
    }

    match token(rest) {
      Ok((remaining, token)) => {
        tokens.push((line, token));
        line += newlines_between(rest, remaining);
        rest = remaining;
      }
      Err(_) => {
        let message = match rest.chars().next() {
          Some('\'') => "Invalid character literal".to_string(),
          Some('"')  => "Unterminated string literal".to_string(),
          Some(c)    => format!("Invalid character '{}'", c),
          None       => "Unexpected end of input".to_string(),
        };
        errors.push(SyntaxError { line, message });
        // Discard the rest of the line.
        rest = match rest.find('\n') {
          Some(end) => &rest[end..],
          None      => ""
        };
      }
    }
  }

  (tokens, errors)
}

// endregion

// region Grammar

/// Returns the index of the first token after `start` that is not on `line`.
fn next_line(tokens: &[(u32, Token)], start: usize, line: u32) -> usize {
  let mut i = start;
  while i < tokens.len() && tokens[i].0 == line {
    i += 1;
  }
  i
}

fn to_argument(token: &Token) -> Result<Argument, String> {
  match token {
    Token::Int(text)  => {
      text.parse::<i32>()
          .map(Argument::Int)
          .map_err(|_| format!("Integer literal {} is out of range", text))
    }
    Token::Char(c)    => Ok(Argument::Char(*c)),
    Token::Str(body)  => Ok(Argument::Str(body.clone())),
    Token::Word(text) => Ok(Argument::Id(DefaultAtom::from(*text))),
    Token::Label(text) => Err(format!("Expected an argument but found label \"{}\"", text)),
  }
}

/**
  Parses assembly text into a program. All syntax errors in the text are reported together;
  no instructions are returned if there are any.
*/
pub fn parse_assembly(text: &str) -> Result<Vec<Instruction>, Vec<SyntaxError>> {
  let (tokens, mut errors) = tokenize(text);
  let mut program = Vec::new();
  let mut i = 0;

  while i < tokens.len() {
    let mut labels = Vec::new();
    while let Some((_, Token::Label(text))) = tokens.get(i) {
      labels.push(DefaultAtom::from(*text));
      i += 1;
    }

    let (line, mnemonic) = match tokens.get(i) {
      Some((line, Token::Word(word))) => (*line, *word),
      Some((line, other)) => {
        errors.push(SyntaxError {
          line    : *line,
          message : format!("Expected a mnemonic but found {}", other.describe())
        });
        i = next_line(&tokens, i, *line);
        continue;
      }
      None => {
        let line = tokens.last().map_or(1, |(line, _)| *line);
        errors.push(SyntaxError {
          line,
          message : "Labels must be followed by an instruction".to_string()
        });
        break;
      }
    };

    let opcode = match Opcode::from_str(mnemonic) {
      Ok(opcode) => opcode,
      Err(_) => {
        errors.push(SyntaxError {
          line,
          message : format!("\"{}\" is not a valid mnemonic", mnemonic)
        });
        i = next_line(&tokens, i, line);
        continue;
      }
    };
    i += 1;

    let arg = match (opcode.arity(), tokens.get(i)) {
      (0, Some((_, Token::Int(_))))
      | (0, Some((_, Token::Char(_))))
      | (0, Some((_, Token::Str(_)))) => {
        errors.push(SyntaxError {
          line,
          message : format!("No arguments allowed for {}", opcode)
        });
        i = next_line(&tokens, i, line);
        continue;
      }

      (0, _) => None,

      // The argument must be on the same line as its mnemonic.
      (_, Some((arg_line, token))) if *arg_line == line && !matches!(token, Token::Label(_)) => {
        match to_argument(token) {
          Ok(arg) => {
            i += 1;
            Some(arg)
          }
          Err(message) => {
            errors.push(SyntaxError { line, message });
            i = next_line(&tokens, i, line);
            continue;
          }
        }
      }

      (_, _) => {
        errors.push(SyntaxError {
          line,
          message : format!("One argument is required for {}", opcode)
        });
        i = next_line(&tokens, i, line);
        continue;
      }
    };

    let mut instruction = Instruction::new(opcode, arg).at_line(line);
    instruction.labels = labels;
    program.push(instruction);
  }

  match errors.is_empty() {
    true  => Ok(program),
    false => {
      errors.sort_by_key(|error| error.line);
      // One report per line is enough.
      errors.dedup_by_key(|error| error.line);
      Err(errors)
    }
  }
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn tokens_cover_every_literal_form() {
    let (tokens, errors) = tokenize("L1: ldcint -42 ; comment\n  LDCCH '\\n' LDCSTR \"a\\\"b\"");
    assert!(errors.is_empty());
    assert_eq!(
      tokens,
      vec![
        (1, Token::Label("L1:")),
        (1, Token::Word("ldcint")),
        (1, Token::Int("-42")),
        (2, Token::Word("LDCCH")),
        (2, Token::Char('\n')),
        (2, Token::Word("LDCSTR")),
        (2, Token::Str("a\"b".to_string())),
      ]
    );
  }

  #[test]
  fn parses_labels_mnemonics_and_arguments() {
    let text = "PROGRAM 4\nL1: L2:\n  ldcint 7\n  BR L1\n  defint x\n  LDLADDR x\nHALT";
    let program = parse_assembly(text).unwrap();
    assert_eq!(
      program,
      vec![
        Instruction::with_int(Opcode::Program, 4),
        Instruction::with_int(Opcode::LdcInt, 7).labeled("L1").labeled("L2"),
        Instruction::with_id(Opcode::Br, "L1"),
        Instruction::with_id(Opcode::DefInt, "x"),
        Instruction::with_id(Opcode::LdlAddr, "x"),
        Instruction::nullary(Opcode::Halt),
      ]
    );
    assert_eq!(program[1].line, 3);
    assert_eq!(program[5].line, 7);
  }

  #[test]
  fn reports_every_bad_line() {
    let text = "LDCINT\nFOO 3\nADD 1\nLDCSTR \"open\nLDCINT 99999999999\nHALT";
    let errors = parse_assembly(text).unwrap_err();
    let lines: Vec<u32> = errors.iter().map(|error| error.line).collect();
    assert_eq!(lines, vec![1, 2, 3, 4, 5]);
    assert!(errors[1].message.contains("FOO"));
  }

  #[test]
  fn trailing_labels_are_an_error() {
    let errors = parse_assembly("HALT\nL9:").unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, 2);
  }
}

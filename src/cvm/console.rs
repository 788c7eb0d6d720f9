use std::io::{BufRead, Write};

use crate::error::Fault;

/**
  The machine's console: buffered character and integer input on a reader, plain text output
  on a writer. Input is read a line at a time, so `GETCH` and `GETINT` can be interleaved and
  see the same stream.
*/
pub struct Console<R, W> {
  input    : R,
  output   : W,
  line     : Vec<char>,
  position : usize,
}

impl<R: BufRead, W: Write> Console<R, W> {

  pub fn new(input: R, output: W) -> Console<R, W> {
    Console {
      input,
      output,
      line     : Vec::new(),
      position : 0,
    }
  }

  /// Refills the line buffer if it is used up. Returns false at end of input.
  fn fill(&mut self) -> Result<bool, Fault> {
    if self.position < self.line.len() {
      return Ok(true);
    }
    // Whatever was written so far is the prompt for what is about to be read.
    self.output.flush()?;

    let mut text = String::new();
    if self.input.read_line(&mut text)? == 0 {
      return Ok(false);
    }
    self.line     = text.chars().collect();
    self.position = 0;
    Ok(true)
  }

  pub fn read_char(&mut self) -> Result<char, Fault> {
    if !self.fill()? {
      return Err(Fault::InvalidInput("EOF".to_string()));
    }
    let c = self.line[self.position];
    self.position += 1;
    Ok(c)
  }

  /// Reads a whitespace delimited token and parses it as an integer.
  pub fn read_int(&mut self) -> Result<i32, Fault> {
    loop {
      if !self.fill()? {
        return Err(Fault::InvalidInput("EOF".to_string()));
      }
      while self.position < self.line.len() && self.line[self.position].is_whitespace() {
        self.position += 1;
      }
      if self.position < self.line.len() {
        break;
      }
    }

    let start = self.position;
    while self.position < self.line.len() && !self.line[self.position].is_whitespace() {
      self.position += 1;
    }
    let token: String = self.line[start..self.position].iter().collect();
    token.parse::<i32>()
         .map_err(|_| Fault::InvalidInput(format!("\"{}\" is not an integer", token)))
  }

  pub fn out(&mut self) -> &mut W {
    &mut self.output
  }

  pub fn flush(&mut self) -> Result<(), Fault> {
    self.output.flush()?;
    Ok(())
  }
}

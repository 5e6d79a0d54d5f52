//! Terminal collaborators for `READ` and `WRITE`

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use tracing::debug;

use crate::vm::Error;
use crate::{in_range, Word};

/// Where the machine gets its input words from, and sends its output words to
pub trait Io {
  /// Block until the next input word is available
  fn read(&mut self) -> Result<Word, Error>;

  /// Emit a single word
  fn write(&mut self, word: Word) -> Result<(), Error>;
}

/// Line-based console, one integer per line
pub struct Console<R, W> {
  input: R,
  output: W,
}

impl<R, W> Console<R, W>
where
  R: BufRead,
  W: Write,
{
  pub fn new(input: R, output: W) -> Self {
    Self { input, output }
  }
}

impl<R, W> Io for Console<R, W>
where
  R: BufRead,
  W: Write,
{
  fn read(&mut self) -> Result<Word, Error> {
    let mut line = String::new();
    loop {
      write!(self.output, "Enter an integer: ")?;
      self.output.flush()?;
      line.clear();
      if self.input.read_line(&mut line)? == 0 {
        return Err(Error::InputExhausted);
      }
      match line.trim().parse::<Word>() {
        Ok(word) if in_range(word as i64) => return Ok(word),
        _ => {
          debug!(input = line.trim(), "rejected console input");
          writeln!(self.output, "*** Please enter a value between -9999 and 9999 ***")?;
        }
      }
    }
  }

  fn write(&mut self, word: Word) -> Result<(), Error> {
    writeln!(self.output, "Output: {word}")?;
    Ok(())
  }
}

/// Canned inputs, captured outputs
#[derive(Debug, Default, Clone)]
pub struct Scripted {
  inputs: VecDeque<Word>,
  outputs: Vec<Word>,
}

impl Scripted {
  pub fn new<I>(inputs: I) -> Self
  where
    I: IntoIterator<Item = Word>,
  {
    Self {
      inputs: inputs.into_iter().collect(),
      outputs: Vec::new(),
    }
  }

  pub fn outputs(&self) -> &[Word] {
    &self.outputs
  }
}

impl Io for Scripted {
  fn read(&mut self) -> Result<Word, Error> {
    self.inputs.pop_front().ok_or(Error::InputExhausted)
  }

  fn write(&mut self, word: Word) -> Result<(), Error> {
    self.outputs.push(word);
    Ok(())
  }
}

//! Building a memory image out of program text
//!
//! A program is one word per line, location `00` first:
//!
//! ```text
//! +1007   # read A
//! +1008   # read B
//! +2007   # load A
//! -99999  # end of program
//! ```

use tracing::debug;

use crate::memory::{Memory, MEMORY_SIZE};
use crate::{in_range, Word};

/// Entering this value ends a program
pub const SENTINEL: i64 = -99999;

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("line {line}: `{text}` is not a word")]
  Parse { line: usize, text: String },

  #[error("line {line}: {value} does not fit in a word (-9999 to 9999)")]
  OutOfRange { line: usize, value: i64 },

  #[error("program does not fit in {max} words", max = MEMORY_SIZE)]
  TooLong,

  #[error("could not read program: {0}")]
  Io(#[from] std::io::Error),
}

/// Outcome of handing one more value to a [`Loader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
  /// Stored; the next word goes to this location
  Stored(usize),
  /// The sentinel was seen
  Done,
}

/// Lays words into memory one location at a time
#[derive(Debug, Default)]
pub struct Loader {
  memory: Memory,
  next: usize,
}

impl Loader {
  pub fn new() -> Self {
    Self::default()
  }

  /// Location the next word will be stored at
  pub fn next_location(&self) -> usize {
    self.next
  }

  /// Store `value` at the next location, or recognise the sentinel
  pub fn push(&mut self, value: i64, line: usize) -> Result<Entry, Error> {
    if value == SENTINEL {
      return Ok(Entry::Done);
    }
    if !in_range(value) {
      return Err(Error::OutOfRange { line, value });
    }
    if self.next >= MEMORY_SIZE {
      return Err(Error::TooLong);
    }
    self
      .memory
      .write(self.next, value as Word)
      .map_err(|_| Error::OutOfRange { line, value })?;
    self.next += 1;
    Ok(Entry::Stored(self.next))
  }

  /// Parse and store a single line of program text. Lines holding only a
  /// comment or whitespace store nothing.
  pub fn push_line(&mut self, text: &str, line: usize) -> Result<Option<Entry>, Error> {
    let code = text.split('#').next().unwrap_or_default().trim();
    if code.is_empty() {
      return Ok(None);
    }
    let value = code.parse::<i64>().map_err(|_| Error::Parse {
      line,
      text: code.to_owned(),
    })?;
    self.push(value, line).map(Some)
  }

  pub fn finish(self) -> Memory {
    debug!(words = self.next, "program loaded");
    self.memory
  }
}

/// Load a whole program from text
pub fn parse(source: &str) -> Result<Memory, Error> {
  let mut loader = Loader::new();
  for (index, text) in source.lines().enumerate() {
    if let Some(Entry::Done) = loader.push_line(text, index + 1)? {
      break;
    }
  }
  Ok(loader.finish())
}

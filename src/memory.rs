use std::ops::Index;

use crate::vm::Error;
use crate::{in_range, Word};

/// Number of addressable words, locations `00` through `99`
pub const MEMORY_SIZE: usize = 100;

/// The Simpletron's flat word store.
///
/// Every cell starts out as `0`, and every value that gets written is kept
/// within the four-digit word range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
  cells: [Word; MEMORY_SIZE],
}

impl Memory {
  /// Create a zero-filled memory
  pub fn new() -> Self {
    Self {
      cells: [0; MEMORY_SIZE],
    }
  }

  pub fn read(&self, address: usize) -> Result<Word, Error> {
    self
      .cells
      .get(address)
      .copied()
      .ok_or(Error::AddressOutOfRange(address))
  }

  pub fn write(&mut self, address: usize, word: Word) -> Result<(), Error> {
    if !in_range(word as i64) {
      return Err(Error::Overflow(word as i64));
    }
    let cell = self
      .cells
      .get_mut(address)
      .ok_or(Error::AddressOutOfRange(address))?;
    *cell = word;
    Ok(())
  }

  pub fn words(&self) -> &[Word] {
    &self.cells
  }
}

impl Default for Memory {
  fn default() -> Self {
    Self::new()
  }
}

impl Index<usize> for Memory {
  type Output = Word;

  fn index(&self, address: usize) -> &Word {
    &self.cells[address]
  }
}

/// Lay a program image out from location `00`, zero-filling the rest
impl TryFrom<Vec<Word>> for Memory {
  type Error = Error;

  fn try_from(image: Vec<Word>) -> Result<Self, Self::Error> {
    if image.len() > MEMORY_SIZE {
      return Err(Error::AddressOutOfRange(MEMORY_SIZE));
    }
    let mut memory = Self::new();
    for (address, word) in image.into_iter().enumerate() {
      memory.write(address, word)?;
    }
    Ok(memory)
  }
}

//! Implementation of the Simpletron, a single-accumulator decimal machine
//!
//! Programs are written in Simpletron Machine Language (SML): every word is a
//! signed four-digit decimal number, and an instruction word packs a two digit
//! opcode in front of a two digit memory address, i.e. `2107` is "store the
//! accumulator at location 07".

pub mod io;
pub mod loader;
pub mod memory;
pub mod opcode;
pub mod vm;

/// The machine's unit of storage and computation
pub type Word = i32;

/// Largest magnitude a [`Word`] may hold
pub const WORD_MAX: Word = 9999;

/// Check whether a value fits in a four-digit signed word
pub fn in_range(value: i64) -> bool {
  (-(WORD_MAX as i64)..=WORD_MAX as i64).contains(&value)
}

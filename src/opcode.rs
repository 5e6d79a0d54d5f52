use crate::vm::Error;
use crate::Word;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
  /// Reads a word from the terminal into memory.
  ///
  /// | Operation | Semantics/RTL     | Word   |
  /// |-----------|-------------------|--------|
  /// | Read      | `m[aa] ← input`   | `10aa` |
  Read = 10,

  /// Writes a word from memory to the terminal.
  ///
  /// | Operation | Semantics/RTL     | Word   |
  /// |-----------|-------------------|--------|
  /// | Write     | `output ← m[aa]`  | `11aa` |
  Write = 11,

  /// Loads a word from memory into the accumulator.
  ///
  /// | Operation | Semantics/RTL     | Word   |
  /// |-----------|-------------------|--------|
  /// | Load      | `acc ← m[aa]`     | `20aa` |
  Load = 20,

  /// Stores the accumulator into memory.
  ///
  /// | Operation | Semantics/RTL     | Word   |
  /// |-----------|-------------------|--------|
  /// | Store     | `m[aa] ← acc`     | `21aa` |
  Store = 21,

  /// | Operation | Semantics/RTL        | Word   |
  /// |-----------|----------------------|--------|
  /// | Add       | `acc ← acc + m[aa]`  | `30aa` |
  Add = 30,

  /// | Operation | Semantics/RTL        | Word   |
  /// |-----------|----------------------|--------|
  /// | Subtract  | `acc ← acc − m[aa]`  | `31aa` |
  Subtract = 31,

  /// Divides the accumulator, truncating toward zero. A zero divisor is a
  /// fatal fault.
  ///
  /// | Operation | Semantics/RTL        | Word   |
  /// |-----------|----------------------|--------|
  /// | Divide    | `acc ← acc ÷ m[aa]`  | `32aa` |
  Divide = 32,

  /// | Operation | Semantics/RTL        | Word   |
  /// |-----------|----------------------|--------|
  /// | Multiply  | `acc ← acc × m[aa]`  | `33aa` |
  Multiply = 33,

  /// Unconditional jump.
  ///
  /// | Operation | Semantics/RTL     | Word   |
  /// |-----------|-------------------|--------|
  /// | Branch    | `pc ← aa`         | `40aa` |
  Branch = 40,

  /// | Operation  | Semantics/RTL                 | Word   |
  /// |------------|-------------------------------|--------|
  /// | Branch Neg | `if acc < 0 : pc ← aa`        | `41aa` |
  BranchNeg = 41,

  /// | Operation   | Semantics/RTL                | Word   |
  /// |-------------|------------------------------|--------|
  /// | Branch Zero | `if acc == 0 : pc ← aa`      | `42aa` |
  BranchZero = 42,

  /// | Operation | Semantics/RTL      | Word   |
  /// |-----------|--------------------|--------|
  /// | Halt      | `(stop execution)` | `43aa` |
  Halt = 43,
}

impl TryFrom<Word> for Opcode {
  type Error = Word;

  /// Maps a decoded opcode number back to the operation, handing the number
  /// back when it names nothing
  fn try_from(code: Word) -> Result<Self, Self::Error> {
    let op = match code {
      10 => Self::Read,
      11 => Self::Write,
      20 => Self::Load,
      21 => Self::Store,
      30 => Self::Add,
      31 => Self::Subtract,
      32 => Self::Divide,
      33 => Self::Multiply,
      40 => Self::Branch,
      41 => Self::BranchNeg,
      42 => Self::BranchZero,
      43 => Self::Halt,
      other => return Err(other),
    };
    Ok(op)
  }
}

/// A single decoded word, as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
  pub opcode: Opcode,
  pub operand: usize,
}

impl Instruction {
  /// Split `word` into its leading opcode digits and trailing address digits.
  ///
  /// `address` is only used to point the error at the offending cell.
  pub fn decode(word: Word, address: usize) -> Result<Self, Error> {
    let code = word / 100;
    let operand = word % 100;
    let opcode =
      Opcode::try_from(code).map_err(|opcode| Error::InvalidOpcode { opcode, address })?;
    // every recognized opcode is positive, so the remainder is too
    Ok(Self {
      opcode,
      operand: operand as usize,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decode_store() {
    let instr = Instruction::decode(2107, 0).unwrap();
    assert_eq!(instr.opcode, Opcode::Store);
    assert_eq!(instr.operand, 7);
  }

  #[test]
  fn decode_halt_ignores_operand() {
    let instr = Instruction::decode(4399, 0).unwrap();
    assert_eq!(instr.opcode, Opcode::Halt);
    assert_eq!(instr.operand, 99);
  }

  #[test]
  fn decode_every_opcode() {
    for code in [10, 11, 20, 21, 30, 31, 32, 33, 40, 41, 42, 43] {
      let op = Opcode::try_from(code).unwrap();
      assert_eq!(op as Word, code);
    }
  }

  #[test]
  fn decode_unknown() {
    let err = Instruction::decode(9999, 3).unwrap_err();
    assert!(matches!(
      err,
      Error::InvalidOpcode {
        opcode: 99,
        address: 3
      }
    ));
  }

  #[test]
  fn decode_data_word_zero() {
    assert!(matches!(
      Instruction::decode(0, 5),
      Err(Error::InvalidOpcode {
        opcode: 0,
        address: 5
      })
    ));
  }

  #[test]
  fn decode_negative() {
    // -1007 / 100 == -10, which names nothing
    assert!(matches!(
      Instruction::decode(-1007, 0),
      Err(Error::InvalidOpcode { opcode: -10, .. })
    ));
  }
}

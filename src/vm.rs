use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::io::Io;
use crate::memory::{Memory, MEMORY_SIZE};
use crate::opcode::{Instruction, Opcode};
use crate::{in_range, Word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  Active,
  Halted,
  Faulted,
}

/// A flag that stops a running machine before its next fetch.
///
/// Clones share the same flag, so one can be handed to another thread while
/// the machine runs.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
  pub fn raise(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn reset(&self) {
    self.0.store(false, Ordering::SeqCst);
  }

  pub fn is_raised(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// The Simpletron: one accumulator, one instruction pointer and a hundred
/// words of memory.
///
/// Memory is handed over already loaded; the registers belong to a single
/// [`Vm::run`] and start from zero every time it is called.
#[derive(Debug)]
pub struct Vm {
  // address of the next instruction to fetch
  ip: usize,
  accumulator: Word,
  memory: Memory,
  state: State,
  interrupt: Interrupt,
}

impl Vm {
  /// Create a machine over a loaded memory image
  pub fn new(memory: Memory) -> Self {
    Self {
      ip: 0,
      accumulator: 0,
      memory,
      state: State::Active,
      interrupt: Interrupt::default(),
    }
  }

  /// Run the program from location `00` until it halts or faults
  pub fn run<I>(&mut self, io: &mut I) -> Result<(), Error>
  where
    I: Io,
  {
    self.ip = 0;
    self.accumulator = 0;
    self.state = State::Active;
    debug!("execution begins");
    while self.step(io)? == State::Active {}
    debug!(ip = self.ip, accumulator = self.accumulator, "execution halted");
    Ok(())
  }

  /// Step through a single instruction, reporting whether the machine can
  /// keep going
  pub fn step<I>(&mut self, io: &mut I) -> Result<State, Error>
  where
    I: Io,
  {
    if self.state != State::Active {
      return Err(Error::MachineHalted);
    }
    if self.interrupt.is_raised() {
      self.state = State::Faulted;
      warn!(ip = self.ip, "execution interrupted");
      return Err(Error::Interrupted);
    }
    let mut task = Task::new(self, io);
    if let Err(err) = task.run() {
      warn!(ip = self.ip, %err, "execution faulted");
      self.state = State::Faulted;
      return Err(err);
    }
    Ok(self.state)
  }

  /// A handle that stops this machine from elsewhere
  pub fn interrupt(&self) -> Interrupt {
    self.interrupt.clone()
  }

  pub fn ip(&self) -> usize {
    self.ip
  }

  pub fn accumulator(&self) -> Word {
    self.accumulator
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn state(&self) -> State {
    self.state
  }

  /// Hand the memory image back, e.g. to run it again on a fresh machine
  pub fn into_memory(self) -> Memory {
    self.memory
  }
}

/// Register and memory dump
impl fmt::Display for Vm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let register = self.memory.read(self.ip).unwrap_or(0);
    writeln!(f, "REGISTERS:")?;
    writeln!(f, "{:<20}{:+05}", "accumulator", self.accumulator)?;
    writeln!(f, "{:<20}{:>5}", "instructionCounter", format!("{:02}", self.ip))?;
    writeln!(f, "{:<20}{:+05}", "instructionRegister", register)?;
    writeln!(f, "{:<20}{:>5}", "operationCode", format!("{:02}", register / 100))?;
    writeln!(f, "{:<20}{:>5}", "operand", format!("{:02}", register % 100))?;
    writeln!(f)?;
    writeln!(f, "MEMORY:")?;
    write!(f, "  ")?;
    for column in 0..10 {
      write!(f, "{:>6}", column)?;
    }
    writeln!(f)?;
    for (row, words) in self.memory.words().chunks(10).enumerate() {
      write!(f, "{:>2}", row * 10)?;
      for word in words {
        write!(f, " {:+05}", word)?;
      }
      writeln!(f)?;
    }
    Ok(())
  }
}

/// A fault that ends execution of the current program
#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("attempt to divide by zero (divisor at location {address:02})")]
  DivideByZero { address: usize },

  #[error("invalid operation code {opcode} at location {address:02}")]
  InvalidOpcode { opcode: Word, address: usize },

  #[error("address {0} is outside of memory (00-{max})", max = MEMORY_SIZE - 1)]
  AddressOutOfRange(usize),

  #[error("value {0} does not fit in a word (-9999 to 9999)")]
  Overflow(i64),

  #[error("ran out of input")]
  InputExhausted,

  #[error("terminal error: {0}")]
  Io(#[from] std::io::Error),

  #[error("execution interrupted")]
  Interrupted,

  #[error("machine is halted")]
  MachineHalted,
}

struct Task<'vm, 'io, I> {
  vm: &'vm mut Vm,
  io: &'io mut I,
}

impl<'vm, 'io, I> Task<'vm, 'io, I>
where
  I: Io,
{
  fn new(vm: &'vm mut Vm, io: &'io mut I) -> Self {
    Self { vm, io }
  }

  #[inline]
  fn fetch(&self) -> Result<Instruction, Error> {
    let word = self.vm.memory.read(self.vm.ip)?;
    Instruction::decode(word, self.vm.ip)
  }

  #[inline]
  fn advance(&mut self) {
    self.vm.ip += 1;
  }

  fn operand(&self, address: usize) -> Result<i64, Error> {
    self.vm.memory.read(address).map(i64::from)
  }

  fn set_accumulator(&mut self, value: i64) -> Result<(), Error> {
    if !in_range(value) {
      return Err(Error::Overflow(value));
    }
    self.vm.accumulator = value as Word;
    Ok(())
  }

  fn run(&mut self) -> Result<(), Error> {
    let Instruction { opcode, operand } = self.fetch()?;
    trace!(
      ip = self.vm.ip,
      ?opcode,
      operand,
      accumulator = self.vm.accumulator,
      "execute"
    );
    match opcode {
      Opcode::Read => read(self, operand)?,
      Opcode::Write => write(self, operand)?,
      Opcode::Load => load(self, operand)?,
      Opcode::Store => store(self, operand)?,
      Opcode::Add => add(self, operand)?,
      Opcode::Subtract => subtract(self, operand)?,
      Opcode::Divide => divide(self, operand)?,
      Opcode::Multiply => multiply(self, operand)?,
      Opcode::Branch => branch(self, operand),
      Opcode::BranchNeg => branch_neg(self, operand),
      Opcode::BranchZero => branch_zero(self, operand),
      Opcode::Halt => halt(self),
    }
    Ok(())
  }
}

// m[aa] ← input
fn read<I>(task: &mut Task<'_, '_, I>, address: usize) -> Result<(), Error>
where
  I: Io,
{
  let word = task.io.read()?;
  task.vm.memory.write(address, word)?;
  task.advance();
  Ok(())
}

// output ← m[aa]
fn write<I>(task: &mut Task<'_, '_, I>, address: usize) -> Result<(), Error>
where
  I: Io,
{
  let word = task.vm.memory.read(address)?;
  task.io.write(word)?;
  task.advance();
  Ok(())
}

// acc ← m[aa]
fn load<I>(task: &mut Task<'_, '_, I>, address: usize) -> Result<(), Error>
where
  I: Io,
{
  let value = task.operand(address)?;
  task.set_accumulator(value)?;
  task.advance();
  Ok(())
}

// m[aa] ← acc
fn store<I>(task: &mut Task<'_, '_, I>, address: usize) -> Result<(), Error>
where
  I: Io,
{
  let acc = task.vm.accumulator;
  task.vm.memory.write(address, acc)?;
  task.advance();
  Ok(())
}

// acc ← acc + m[aa]
fn add<I>(task: &mut Task<'_, '_, I>, address: usize) -> Result<(), Error>
where
  I: Io,
{
  let value = i64::from(task.vm.accumulator) + task.operand(address)?;
  task.set_accumulator(value)?;
  task.advance();
  Ok(())
}

// acc ← acc − m[aa]
fn subtract<I>(task: &mut Task<'_, '_, I>, address: usize) -> Result<(), Error>
where
  I: Io,
{
  let value = i64::from(task.vm.accumulator) - task.operand(address)?;
  task.set_accumulator(value)?;
  task.advance();
  Ok(())
}

// acc ← acc ÷ m[aa], truncating toward zero
fn divide<I>(task: &mut Task<'_, '_, I>, address: usize) -> Result<(), Error>
where
  I: Io,
{
  let divisor = task.operand(address)?;
  if divisor == 0 {
    return Err(Error::DivideByZero { address });
  }
  let value = i64::from(task.vm.accumulator) / divisor;
  task.set_accumulator(value)?;
  task.advance();
  Ok(())
}

// acc ← acc × m[aa]
fn multiply<I>(task: &mut Task<'_, '_, I>, address: usize) -> Result<(), Error>
where
  I: Io,
{
  let value = i64::from(task.vm.accumulator) * task.operand(address)?;
  task.set_accumulator(value)?;
  task.advance();
  Ok(())
}

// pc ← aa
fn branch<I>(task: &mut Task<'_, '_, I>, address: usize)
where
  I: Io,
{
  task.vm.ip = address;
}

// if acc < 0 : pc ← aa
fn branch_neg<I>(task: &mut Task<'_, '_, I>, address: usize)
where
  I: Io,
{
  if task.vm.accumulator < 0 {
    task.vm.ip = address;
  } else {
    task.advance();
  }
}

// if acc == 0 : pc ← aa
fn branch_zero<I>(task: &mut Task<'_, '_, I>, address: usize)
where
  I: Io,
{
  if task.vm.accumulator == 0 {
    task.vm.ip = address;
  } else {
    task.advance();
  }
}

// (stop execution)
fn halt<I>(task: &mut Task<'_, '_, I>)
where
  I: Io,
{
  task.vm.state = State::Halted;
}

#[cfg(test)]
mod tests {
  use super::*;

  use crate::io::Scripted;

  fn machine(image: Vec<Word>) -> Vm {
    Vm::new(Memory::try_from(image).unwrap())
  }

  mod vm {
    use super::*;

    #[test]
    fn new() {
      let vm = machine(vec![]);
      assert_eq!(vm.ip(), 0);
      assert_eq!(vm.accumulator(), 0);
      assert_eq!(vm.state(), State::Active);
      assert!(vm.memory().words().iter().all(|&w| w == 0));
    }

    #[test]
    fn step_read() {
      let mut vm = machine(vec![1005]);
      let mut io = Scripted::new([42]);
      assert_eq!(vm.step(&mut io).unwrap(), State::Active);
      assert_eq!(vm.memory()[5], 42);
      assert_eq!(vm.ip(), 1);
    }

    #[test]
    fn step_read_out_of_range() {
      let mut vm = machine(vec![1005]);
      let mut io = Scripted::new([12345]);
      assert!(matches!(vm.step(&mut io), Err(Error::Overflow(12345))));
      assert_eq!(vm.memory()[5], 0);
    }

    #[test]
    fn step_read_exhausted() {
      let mut vm = machine(vec![1005]);
      let mut io = Scripted::default();
      assert!(matches!(vm.step(&mut io), Err(Error::InputExhausted)));
    }

    #[test]
    fn step_write() {
      let mut vm = machine(vec![1102, 0, -17]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      assert_eq!(io.outputs(), &[-17]);
      assert_eq!(vm.ip(), 1);
    }

    #[test]
    fn step_load() {
      let mut vm = machine(vec![2003, 0, 0, 77]);
      vm.step(&mut Scripted::default()).unwrap();
      assert_eq!(vm.accumulator(), 77);
      assert_eq!(vm.ip(), 1);
    }

    #[test]
    fn step_store() {
      let mut vm = machine(vec![2003, 2104, 0, 77]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      vm.step(&mut io).unwrap();
      assert_eq!(vm.memory()[4], 77);
      assert_eq!(vm.ip(), 2);
    }

    #[test]
    fn step_add() {
      let mut vm = machine(vec![2004, 3005, 0, 0, 10, 20]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      vm.step(&mut io).unwrap();
      assert_eq!(vm.accumulator(), 30);
    }

    #[test]
    fn step_subtract() {
      let mut vm = machine(vec![2004, 3105, 0, 0, 10, 20]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      vm.step(&mut io).unwrap();
      assert_eq!(vm.accumulator(), -10);
    }

    #[test]
    fn step_multiply() {
      let mut vm = machine(vec![2004, 3305, 0, 0, -12, 11]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      vm.step(&mut io).unwrap();
      assert_eq!(vm.accumulator(), -132);
    }

    #[test]
    fn step_divide_truncates() {
      let mut vm = machine(vec![2004, 3205, 0, 0, -7, 2]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      vm.step(&mut io).unwrap();
      assert_eq!(vm.accumulator(), -3);
    }

    #[test]
    fn step_divide_by_zero() {
      let mut vm = machine(vec![2004, 3205, 0, 0, 9]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      let err = vm.step(&mut io).unwrap_err();
      assert!(matches!(err, Error::DivideByZero { address: 5 }));
      assert_eq!(vm.accumulator(), 9); // untouched
      assert_eq!(vm.ip(), 1); // still pointing at the divide
      assert_eq!(vm.state(), State::Faulted);
    }

    #[test]
    fn step_add_overflow() {
      let mut vm = machine(vec![2004, 3004, 0, 0, 9000]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      assert!(matches!(vm.step(&mut io), Err(Error::Overflow(18000))));
      assert_eq!(vm.accumulator(), 9000);
    }

    #[test]
    fn step_multiply_overflow() {
      let mut vm = machine(vec![2004, 3304, 0, 0, -9999]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      assert!(matches!(vm.step(&mut io), Err(Error::Overflow(99980001))));
    }

    #[test]
    fn step_branch() {
      let mut vm = machine(vec![4042]);
      vm.step(&mut Scripted::default()).unwrap();
      assert_eq!(vm.ip(), 42);
    }

    #[test]
    fn step_branch_neg_taken() {
      let mut vm = machine(vec![2003, 4150, 0, -1]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      vm.step(&mut io).unwrap();
      assert_eq!(vm.ip(), 50);
    }

    #[test]
    fn step_branch_neg_not_taken() {
      let mut vm = machine(vec![2003, 4150, 0, 0]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      vm.step(&mut io).unwrap();
      assert_eq!(vm.ip(), 2); // zero is not negative
    }

    #[test]
    fn step_branch_zero_taken() {
      let mut vm = machine(vec![4250]);
      vm.step(&mut Scripted::default()).unwrap();
      assert_eq!(vm.ip(), 50);
    }

    #[test]
    fn step_branch_zero_not_taken() {
      let mut vm = machine(vec![2003, 4250, 0, -1]);
      let mut io = Scripted::default();
      vm.step(&mut io).unwrap();
      vm.step(&mut io).unwrap();
      assert_eq!(vm.ip(), 2);
    }

    #[test]
    fn step_halt() {
      let mut vm = machine(vec![4300]);
      let mut io = Scripted::default();
      assert_eq!(vm.step(&mut io).unwrap(), State::Halted);
      assert_eq!(vm.ip(), 0);
      // cant progress
      assert!(matches!(vm.step(&mut io), Err(Error::MachineHalted)));
    }

    #[test]
    fn step_invalid_opcode() {
      let mut vm = machine(vec![9999]);
      let err = vm.step(&mut Scripted::default()).unwrap_err();
      assert!(matches!(
        err,
        Error::InvalidOpcode {
          opcode: 99,
          address: 0
        }
      ));
    }

    #[test]
    fn run_off_the_end() {
      let mut image = vec![0; MEMORY_SIZE];
      image[0] = 4099;
      image[99] = 2000;
      let mut vm = machine(image);
      let err = vm.run(&mut Scripted::default()).unwrap_err();
      assert!(matches!(err, Error::AddressOutOfRange(100)));
    }

    #[test]
    fn run_resets_registers() {
      let mut vm = machine(vec![2002, 4300, 5]);
      let mut io = Scripted::default();
      vm.run(&mut io).unwrap();
      assert_eq!(vm.accumulator(), 5);
      assert_eq!(vm.state(), State::Halted);
      vm.run(&mut io).unwrap();
      assert_eq!(vm.ip(), 1);
      assert_eq!(vm.accumulator(), 5);
    }

    #[test]
    fn run_interrupted() {
      // spins forever on location 00
      let mut vm = machine(vec![4000]);
      let interrupt = vm.interrupt();
      interrupt.raise();
      assert!(matches!(
        vm.run(&mut Scripted::default()),
        Err(Error::Interrupted)
      ));
      interrupt.reset();
      assert!(!interrupt.is_raised());
    }

    #[test]
    fn dump() {
      let vm = machine(vec![1007, -3]);
      let text = vm.to_string();
      assert!(text.contains("accumulator         +0000"));
      assert!(text.contains("instructionRegister +1007"));
      assert!(text.contains(" 0 +1007 -0003 +0000"));
      assert!(text.contains("90 +0000"));
    }
  }
}

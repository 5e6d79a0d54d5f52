use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use emulator::io::Console;
use emulator::loader::{self, Entry, Loader};
use emulator::memory::Memory;
use emulator::vm::Vm;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "simpletron")]
#[command(about = "Run a Simpletron Machine Language program")]
struct Cli {
  /// Program text, one word per line; omit to type the program in
  program: Option<PathBuf>,

  /// Print the registers and memory once execution stops
  #[arg(long)]
  dump: bool,
}

fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "emulator=warn,main=warn".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
    .init();

  let cli = Cli::parse();

  let memory = match &cli.program {
    Some(path) => {
      info!("loading program from {}", path.display());
      let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
      loader::parse(&source).with_context(|| format!("failed to load {}", path.display()))?
    }
    None => enter_program().context("failed to load program")?,
  };

  let stdin = io::stdin();
  let mut console = Console::new(stdin.lock(), io::stdout());
  let mut vm = Vm::new(memory);

  println!("*** Program loading completed ***");
  println!("*** Program execution begins  ***");
  let outcome = vm.run(&mut console);
  let code = match outcome {
    Ok(()) => {
      println!("*** Simpletron execution terminated ***");
      ExitCode::SUCCESS
    }
    Err(err) => {
      error!(%err, "execution faulted");
      println!("*** {err} ***");
      println!("*** Simpletron execution abnormally terminated ***");
      ExitCode::FAILURE
    }
  };
  if cli.dump {
    print!("{vm}");
  }
  Ok(code)
}

/// Prompt for one word per location until the sentinel or end of input
fn enter_program() -> Result<Memory, loader::Error> {
  println!("*** Welcome to Simpletron! ***");
  println!("*** Please enter your program one instruction ***");
  println!("*** (or data word) at a time. I will type the ***");
  println!("*** location number and a question mark (?).  ***");
  println!("*** You then type the word for that location. ***");
  println!("*** Type the sentinel {} to stop entering ***", loader::SENTINEL);
  println!("*** your program. ***");

  let mut loader = Loader::new();
  let mut stdout = io::stdout();
  let mut lines = io::stdin().lock().lines();
  let mut line = 0;
  loop {
    write!(stdout, "{:02} ? ", loader.next_location())?;
    stdout.flush()?;
    let Some(text) = lines.next().transpose()? else {
      break;
    };
    line += 1;
    match loader.push_line(&text, line) {
      Ok(Some(Entry::Done)) => break,
      Ok(_) => {}
      Err(err @ loader::Error::TooLong) => return Err(err),
      Err(err) => println!("*** {err}, try again ***"),
    }
  }
  Ok(loader.finish())
}

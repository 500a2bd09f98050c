mod cli;
mod compiler;

#[cfg(test)]
mod tests;

use clap::Parser as _;
use cli::{Cli, Command};
use compiler::{CompileError, Compiler};
use creek_session::diagnostics::PrettyDiagnosticEmitter;

#[derive(thiserror::Error, Debug)]
enum DriverError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), DriverError> {
    let cli = Cli::parse();

    let (input, source, execute) = match cli.command {
        Command::Run { input, source } => (input, source, true),
        Command::Check { input, source } => (input, source, false),
    };

    let source_text = if source {
        input
    } else {
        std::fs::read_to_string(&input)?
    };

    let mut compiler = Compiler::new(PrettyDiagnosticEmitter::default(), execute)?;
    compiler.compile(&source_text)?;

    Ok(())
}

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a script and execute its top-level expressions.
    Run {
        /// The input file.
        input: String,

        /// Whether the given input should be used directly as the source
        /// instead of as the source file path.
        #[clap(long, short, action)]
        source: bool,
    },

    /// Compile a script and check the entry-point contract without
    /// executing anything.
    Check {
        /// The input file.
        input: String,

        /// Whether the given input should be used directly as the source
        /// instead of as the source file path.
        #[clap(long, short, action)]
        source: bool,
    },
}

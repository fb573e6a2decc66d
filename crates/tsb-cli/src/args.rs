use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the tsb binary.
#[derive(Parser, Debug)]
#[command(name = "tsb", version, about = "tsb - TypeScript-to-bytecode compiler")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile source files into a loadable artifact.
    Build {
        /// Entry module.
        entry: PathBuf,

        /// Output artifact path.
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,

        /// Dump the compiled IL as JSON instead of writing the artifact.
        #[arg(long = "print-il")]
        print_il: bool,
    },
    /// Run an artifact (or compile and run a source file directly).
    Run {
        /// A `.tsbc` artifact or a source entry module.
        input: PathBuf,
    },
}

//! Command implementations.
//!
//! Each command returns the text to print so it can be tested without a
//! terminal.

pub mod generate;
pub mod kinds;

use std::path::PathBuf;

/// Output format of `kindling generate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// The full graph as pretty JSON
    Json,
    /// Task labels in dependency order, one per line
    Labels,
}

/// A parsed command.
#[derive(Debug)]
pub enum Command {
    Generate {
        root: PathBuf,
        params: Vec<(String, String)>,
        parameters_file: Option<PathBuf>,
        targets: Vec<String>,
        format: OutputFormat,
        serial: bool,
    },
    Kinds {
        root: PathBuf,
    },
}

/// Run a command and return its output.
pub fn execute(command: Command) -> miette::Result<String> {
    match command {
        Command::Generate {
            root,
            params,
            parameters_file,
            targets,
            format,
            serial,
        } => generate::execute(&generate::GenerateOptions {
            root,
            params,
            parameters_file,
            targets,
            format,
            serial,
        }),
        Command::Kinds { root } => kinds::execute(&root),
    }
}

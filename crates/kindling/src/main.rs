//! kindling command line interface.

mod cli;
mod commands;
mod tracing;

use crate::commands::Command;
use crate::tracing::TracingConfig;
use std::io::Write;

fn main() -> miette::Result<()> {
    let cli = cli::parse();

    crate::tracing::init_tracing(TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        ..Default::default()
    })?;

    let command: Command = cli.command.into();
    ::tracing::debug!(command = ?command, "Executing command");
    let output = commands::execute(command)?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(output.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|e| miette::miette!("Failed to write output: {e}"))
}

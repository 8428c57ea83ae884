use crate::commands::{Command, OutputFormat};
use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kindling")]
#[command(about = "Expand declarative kind definitions into a task graph")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub log_level: LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Generate the task graph of a project")]
    Generate {
        #[arg(help = "Project root containing config.yml and the kinds directory", default_value = ".")]
        root: PathBuf,
        #[arg(
            long = "param",
            short = 'p',
            help = "Set a parameter (KEY=VALUE), overriding config and parameter files",
            value_parser = parse_key_value
        )]
        params: Vec<(String, String)>,
        #[arg(long, help = "YAML or JSON file of parameters")]
        parameters: Option<PathBuf>,
        #[arg(long = "target", short = 't', help = "Only keep these tasks and their dependencies")]
        targets: Vec<String>,
        #[arg(long, help = "Output format", default_value = "json", value_enum)]
        format: OutputFormat,
        #[arg(long, help = "Process kinds one at a time")]
        serial: bool,
    },
    #[command(about = "List kinds in processing order, one level per line")]
    Kinds {
        #[arg(help = "Project root containing config.yml and the kinds directory", default_value = ".")]
        root: PathBuf,
    },
}

/// Parse a `KEY=VALUE` pair.
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

impl From<Commands> for Command {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Generate {
                root,
                params,
                parameters,
                targets,
                format,
                serial,
            } => Self::Generate {
                root,
                params,
                parameters_file: parameters,
                targets,
                format,
                serial,
            },
            Commands::Kinds { root } => Self::Kinds { root },
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

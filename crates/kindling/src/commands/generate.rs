//! `kindling generate`

use kindling_core::{
    Context, GeneratedGraph, GenerationConfig, TaskGraphGenerator, load_kinds, load_parameters,
};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{info, instrument};

use super::OutputFormat;

/// Options of one `generate` invocation.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub root: PathBuf,
    pub params: Vec<(String, String)>,
    pub parameters_file: Option<PathBuf>,
    pub targets: Vec<String>,
    pub format: OutputFormat,
    pub serial: bool,
}

/// Parameters from config, then the parameters file, then `--param`.
fn parameters(config: &GenerationConfig, options: &GenerateOptions) -> miette::Result<Context> {
    let mut parameters = config.parameters.clone();
    if let Some(path) = &options.parameters_file {
        parameters = parameters.layered(&load_parameters(path)?);
    }
    for (key, value) in &options.params {
        parameters.insert(key.clone(), value.clone());
    }
    Ok(parameters)
}

#[instrument(name = "generate_command", skip_all, fields(root = %options.root.display()))]
pub fn execute(options: &GenerateOptions) -> miette::Result<String> {
    let config = GenerationConfig::load(&options.root)?;
    let parameters = parameters(&config, options)?;
    let kinds = load_kinds(&config.kinds_path(&options.root))?;

    let mut graph = TaskGraphGenerator::new(parameters)
        .parallel(config.parallel && !options.serial)
        .generate(&kinds)?;
    if !options.targets.is_empty() {
        graph = graph.subgraph(options.targets.iter().map(String::as_str))?;
    }
    info!(tasks = graph.len(), "Task graph ready");

    render(&graph, options.format)
}

fn render(graph: &GeneratedGraph, format: OutputFormat) -> miette::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(graph)
            .map_err(|e| miette::miette!("Failed to serialize task graph: {e}")),
        OutputFormat::Labels => {
            let mut out = String::new();
            for label in graph.order() {
                let _ = writeln!(out, "{label}");
            }
            Ok(out)
        }
    }
}

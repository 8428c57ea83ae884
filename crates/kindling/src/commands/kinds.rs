//! `kindling kinds`

use kindling_core::{GenerationConfig, TaskGraphGenerator, load_kinds};
use std::fmt::Write as _;
use std::path::Path;

/// One line per level: kinds on the same line do not depend on each other.
pub fn execute(root: &Path) -> miette::Result<String> {
    let config = GenerationConfig::load(root)?;
    let kinds = load_kinds(&config.kinds_path(root))?;
    let levels = TaskGraphGenerator::kind_levels(&kinds)?;

    let mut out = String::new();
    for (index, level) in levels.iter().enumerate() {
        let _ = writeln!(out, "{index}: {}", level.join(" "));
    }
    Ok(out)
}

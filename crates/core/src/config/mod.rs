//! Generation configuration
//!
//! Read from `<root>/config.yml`; every key is optional.
//!
//! ```yaml
//! kinds-dir: taskcluster/kinds
//! parallel: true
//! parameters:
//!   level: 3
//!   build-type: beta
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::context::Context;
use crate::kind::yaml_to_json;
use crate::{Error, Result};

/// File name of the configuration inside a project root.
pub const CONFIG_FILE: &str = "config.yml";

const DEFAULT_KINDS_DIR: &str = "kinds";

/// Settings of one generation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GenerationConfig {
    /// Directory holding one subdirectory per kind, relative to the root.
    #[serde(default = "default_kinds_dir")]
    pub kinds_dir: PathBuf,

    /// Process independent kinds concurrently.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Global resolution context.
    #[serde(default)]
    pub parameters: Context,
}

fn default_kinds_dir() -> PathBuf {
    PathBuf::from(DEFAULT_KINDS_DIR)
}

const fn default_parallel() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            kinds_dir: default_kinds_dir(),
            parallel: default_parallel(),
            parameters: Context::new(),
        }
    }
}

impl GenerationConfig {
    /// Load `<root>/config.yml`, falling back to defaults when it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.is_file() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(&text, &path)
    }

    /// Parse configuration text; `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Yaml`] for invalid YAML and [`Error::Config`] for
    /// unknown keys or mistyped values.
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self> {
        let value = parse_yaml(text, path)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    /// Absolute location of the kinds directory.
    #[must_use]
    pub fn kinds_path(&self, root: &Path) -> PathBuf {
        root.join(&self.kinds_dir)
    }
}

/// Read a parameters file: a YAML (or JSON) mapping of scalar attributes.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid YAML or is not a
/// mapping.
pub fn load_parameters(path: &Path) -> Result<Context> {
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match parse_yaml(&text, path)? {
        serde_json::Value::Object(map) => Ok(Context::from_attributes(&map)),
        serde_json::Value::Null => Ok(Context::new()),
        _ => Err(Error::config(format!(
            "{}: parameters must be a mapping",
            path.display()
        ))),
    }
}

fn parse_yaml(text: &str, path: &Path) -> Result<serde_json::Value> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|source| Error::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    yaml_to_json(yaml).map_err(|reason| Error::config(format!("{}: {reason}", path.display())))
}

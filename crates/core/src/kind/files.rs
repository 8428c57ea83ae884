//! Reading kind declarations from disk.
//!
//! Each kind lives in its own directory: `<kinds-dir>/<kind>/kind.yml`.

use serde_json::{Map, Number, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, instrument};

use super::{Kind, KindDeclaration};
use crate::{Error, Result};

/// File name of a kind declaration inside its directory.
pub const KIND_FILE: &str = "kind.yml";

/// Convert a YAML value to JSON.
///
/// Non-string mapping keys (`3:` or `true:`) are stringified so that
/// conditional cases keyed by numbers match their string discriminants.
/// Tags are dropped.
///
/// # Errors
///
/// Returns a message when a mapping key is itself a sequence or mapping, or a
/// float is not finite.
pub fn yaml_to_json(value: serde_yaml::Value) -> std::result::Result<Value, String> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => yaml_number(&n)?,
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<std::result::Result<_, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(yaml_key(key)?, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn yaml_number(n: &serde_yaml::Number) -> std::result::Result<Value, String> {
    if let Some(i) = n.as_i64() {
        Ok(Value::from(i))
    } else if let Some(u) = n.as_u64() {
        Ok(Value::from(u))
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("unsupported number {n}"))
    }
}

fn yaml_key(key: serde_yaml::Value) -> std::result::Result<String, String> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        Yaml::Tagged(tagged) => yaml_key(tagged.value),
        Yaml::Sequence(_) | Yaml::Mapping(_) => {
            Err("mapping keys must be scalars".to_string())
        }
    }
}

/// Parse the text of a `kind.yml` into a validated [`Kind`].
///
/// # Errors
///
/// Returns [`Error::Yaml`] for unparseable YAML and
/// [`Error::InvalidKindDeclaration`] for a document that is not a valid
/// declaration.
pub fn parse_kind_yaml(name: &str, text: &str, path: &Path) -> Result<Kind> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|source| Error::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    let json = yaml_to_json(yaml).map_err(|reason| Error::invalid_kind(name, reason))?;
    if !json.is_object() {
        return Err(Error::invalid_kind(name, "kind.yml must contain a mapping"));
    }
    let declaration: KindDeclaration =
        serde_json::from_value(json).map_err(|e| Error::invalid_kind(name, e.to_string()))?;
    Kind::from_declaration(name, declaration)
}

/// Load one kind from its directory.
///
/// # Errors
///
/// Returns [`Error::Io`] if `kind.yml` cannot be read, otherwise as
/// [`parse_kind_yaml`].
pub fn load_kind_file(kind_dir: &Path) -> Result<Kind> {
    let name = kind_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::config(format!("{} has no kind name", kind_dir.display())))?;
    let path = kind_dir.join(KIND_FILE);
    let text = fs::read_to_string(&path).map_err(|source| Error::Io {
        path: path.clone(),
        source,
    })?;
    parse_kind_yaml(&name, &text, &path)
}

/// Load every kind under `kinds_dir`, sorted by name.
///
/// Subdirectories without a `kind.yml` are skipped.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be listed, or the first
/// error from [`load_kind_file`].
#[instrument(skip_all, fields(dir = %kinds_dir.display()))]
pub fn load_kinds(kinds_dir: &Path) -> Result<Vec<Kind>> {
    let io_err = |source| Error::Io {
        path: kinds_dir.to_path_buf(),
        source,
    };

    let mut dirs = Vec::new();
    for entry in fs::read_dir(kinds_dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_dir() {
            continue;
        }
        if path.join(KIND_FILE).is_file() {
            dirs.push(path);
        } else {
            debug!(dir = %path.display(), "Skipping directory without kind.yml");
        }
    }
    dirs.sort();

    let kinds = dirs
        .iter()
        .map(|dir| load_kind_file(dir))
        .collect::<Result<Vec<_>>>()?;
    debug!(count = kinds.len(), "Loaded kinds");
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::LoaderKind;
    use serde_json::json;
    use tempfile::TempDir;

    const BEETMOVER: &str = r"
loader: single-dep
transforms:
  - task
kind-dependencies:
  - build
task-template:
  description: Upload artifacts
";

    #[test]
    fn test_numeric_keys_are_stringified() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("by-level:\n  3: a\n  true: b\n").unwrap();
        let json = yaml_to_json(yaml).unwrap();
        assert_eq!(json, json!({"by-level": {"3": "a", "true": "b"}}));
    }

    #[test]
    fn test_key_order_is_preserved() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("z: 1\na: 2\nm: 3\n").unwrap();
        let json = yaml_to_json(yaml).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_sequence_keys_rejected() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("? [a, b]\n: c\n").unwrap();
        assert!(yaml_to_json(yaml).is_err());
    }

    #[test]
    fn test_parse_kind_yaml() {
        let kind = parse_kind_yaml("beetmover", BEETMOVER, Path::new("kind.yml")).unwrap();
        assert_eq!(kind.loader(), LoaderKind::SingleDep);
        assert_eq!(kind.kind_dependencies(), ["build"]);
    }

    #[test]
    fn test_parse_kind_yaml_rejects_scalar() {
        let err = parse_kind_yaml("x", "just a string", Path::new("kind.yml")).unwrap_err();
        assert!(matches!(err, Error::InvalidKindDeclaration { .. }));
    }

    #[test]
    fn test_parse_kind_yaml_rejects_bad_yaml() {
        let err = parse_kind_yaml("x", "a: [unclosed", Path::new("kind.yml")).unwrap_err();
        assert!(matches!(err, Error::Yaml { .. }));
    }

    #[test]
    fn test_load_kinds_sorted_and_skips_stray_dirs() {
        let temp = TempDir::new().unwrap();
        for name in ["zeta", "alpha"] {
            let dir = temp.path().join(name);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join(KIND_FILE), BEETMOVER).unwrap();
        }
        fs::create_dir(temp.path().join("empty")).unwrap();
        fs::write(temp.path().join("README"), "not a kind").unwrap();

        let kinds = load_kinds(temp.path()).unwrap();
        let names: Vec<&str> = kinds.iter().map(Kind::name).collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }

    #[test]
    fn test_load_kinds_missing_dir() {
        let temp = TempDir::new().unwrap();
        let err = load_kinds(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}

//! Conditional value resolution.
//!
//! A conditional value is a mapping with a single `by-<attribute>` key:
//!
//! ```yaml
//! github-project:
//!     by-level:
//!         '3': firefox-android
//!         default: staging-firefox-android
//! ```
//!
//! Resolving it against a [`Context`] looks up `level`, picks the matching
//! case (exact key, then anchored regular expression, then `default`) and
//! resolves the selected value again, so conditionals may nest to any depth.
//! Plain values resolve to themselves.
//!
//! A value that matches no key exactly but matches several keys as patterns
//! is ambiguous and rejected as [`Error::MalformedCondition`].

use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

use crate::context::Context;
use crate::document::Document;
use crate::{Error, Result};

/// Prefix shared by every discriminant class key.
pub const DISCRIMINANT_PREFIX: &str = "by-";

/// Reserved case key used when no other case matches.
pub const DEFAULT_CASE: &str = "default";

/// The discriminant class of a conditional value, e.g. `by-build-type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscriminantClass(String);

impl DiscriminantClass {
    /// Parse a mapping key as a discriminant class.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        key.strip_prefix(DISCRIMINANT_PREFIX)
            .filter(|attribute| !attribute.is_empty())
            .map(|_| Self(key.to_string()))
    }

    /// The full key, e.g. `by-level`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The context attribute this class switches on, e.g. `level`.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.0[DISCRIMINANT_PREFIX.len()..]
    }
}

/// One branch of a conditional value.
///
/// The key is compiled once as an anchored pattern; keys that are not valid
/// patterns only match exactly.
#[derive(Debug, Clone)]
pub struct Case {
    key: String,
    pattern: Option<Regex>,
    value: ConditionalValue,
}

impl Case {
    fn new(key: String, value: ConditionalValue) -> Self {
        let pattern = Regex::new(&format!("^(?:{key})$")).ok();
        Self {
            key,
            pattern,
            value,
        }
    }

    /// The case key as written.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value selected by this case.
    #[must_use]
    pub fn value(&self) -> &ConditionalValue {
        &self.value
    }

    fn matches_pattern(&self, value: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(value))
    }
}

impl PartialEq for Case {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}

/// A value that may contain conditional branches anywhere inside it.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalValue {
    /// A string, number, boolean or null.
    Scalar(Value),
    /// A list whose items may be conditional.
    Sequence(Vec<ConditionalValue>),
    /// A plain mapping whose values may be conditional.
    Mapping(Vec<(String, ConditionalValue)>),
    /// A value selected by a context attribute.
    ByDiscriminant {
        /// Which attribute selects the case.
        class: DiscriminantClass,
        /// Cases in declaration order, `default` excluded.
        cases: Vec<Case>,
        /// Fallback when no case matches.
        default: Option<Box<ConditionalValue>>,
    },
}

impl ConditionalValue {
    /// Parse a JSON value, recognising conditional mappings at any depth.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCondition`] when a `by-*` key shares its
    /// mapping with other keys or does not point at a mapping of cases.
    pub fn parse(value: &Value) -> Result<Self> {
        Self::parse_at(value, &mut FieldPath::default())
    }

    fn parse_at(value: &Value, path: &mut FieldPath) -> Result<Self> {
        match value {
            Value::Array(items) => {
                let mut parsed = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    path.push(&index.to_string());
                    parsed.push(Self::parse_at(item, path)?);
                    path.pop();
                }
                Ok(Self::Sequence(parsed))
            }
            Value::Object(map) => Self::parse_mapping(map, path),
            scalar => Ok(Self::Scalar(scalar.clone())),
        }
    }

    fn parse_mapping(map: &Map<String, Value>, path: &mut FieldPath) -> Result<Self> {
        let classes: Vec<&String> = map
            .keys()
            .filter(|key| DiscriminantClass::parse(key).is_some())
            .collect();

        match classes.as_slice() {
            [] => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, value) in map {
                    path.push(key);
                    entries.push((key.clone(), Self::parse_at(value, path)?));
                    path.pop();
                }
                Ok(Self::Mapping(entries))
            }
            [key] if map.len() == 1 => {
                let class = DiscriminantClass::parse(key)
                    .ok_or_else(|| Error::malformed(path.render(), "invalid discriminant class"))?;
                path.push(key);
                let parsed = Self::parse_cases(class, &map[key.as_str()], path);
                path.pop();
                parsed
            }
            [_] => Err(Error::malformed(
                path.render(),
                format!(
                    "'{}' must be the only key of its mapping, found: {}",
                    classes[0],
                    map.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            )),
            _ => Err(Error::malformed(
                path.render(),
                format!(
                    "exactly one discriminant class expected, found: {}",
                    classes
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
        }
    }

    fn parse_cases(class: DiscriminantClass, value: &Value, path: &mut FieldPath) -> Result<Self> {
        let Value::Object(case_map) = value else {
            return Err(Error::malformed(
                path.render(),
                format!("'{}' must map discriminant values to values", class.as_str()),
            ));
        };

        let mut cases = Vec::with_capacity(case_map.len());
        let mut default = None;
        for (key, case) in case_map {
            path.push(key);
            let parsed = Self::parse_at(case, path)?;
            path.pop();
            if key == DEFAULT_CASE {
                default = Some(Box::new(parsed));
            } else {
                cases.push(Case::new(key.clone(), parsed));
            }
        }

        Ok(Self::ByDiscriminant {
            class,
            cases,
            default,
        })
    }

    /// Whether this value or anything inside it is conditional.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Sequence(items) => items.iter().any(Self::is_conditional),
            Self::Mapping(entries) => entries.iter().any(|(_, v)| v.is_conditional()),
            Self::ByDiscriminant { .. } => true,
        }
    }

    /// Resolve every conditional branch against `context`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedConditionKind`] when a conditional has no
    /// case for the context value and no `default`, and
    /// [`Error::MalformedCondition`] when the value matches several case
    /// patterns.
    pub fn resolve(&self, context: &Context) -> Result<Value> {
        self.resolve_at(context, &mut FieldPath::default())
    }

    /// Like [`resolve`](Self::resolve), reporting errors relative to `root`.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub fn resolve_in(&self, context: &Context, root: &str) -> Result<Value> {
        self.resolve_at(context, &mut FieldPath::rooted(root))
    }

    fn resolve_at(&self, context: &Context, path: &mut FieldPath) -> Result<Value> {
        match self {
            Self::Scalar(value) => Ok(value.clone()),
            Self::Sequence(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    path.push(&index.to_string());
                    resolved.push(item.resolve_at(context, path)?);
                    path.pop();
                }
                Ok(Value::Array(resolved))
            }
            Self::Mapping(entries) => {
                let mut resolved = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    path.push(key);
                    resolved.insert(key.clone(), value.resolve_at(context, path)?);
                    path.pop();
                }
                Ok(Value::Object(resolved))
            }
            Self::ByDiscriminant {
                class,
                cases,
                default,
            } => {
                let value = context.get(class.attribute());
                let matched = match value {
                    Some(v) => select_case(cases, v).map_err(|keys| {
                        Error::malformed(
                            path.render(),
                            format!(
                                "'{v}' matches several cases of '{}': {}",
                                class.as_str(),
                                keys.join(", ")
                            ),
                        )
                    })?,
                    None => None,
                };
                let selected = matched
                    .or(default.as_deref())
                    .ok_or_else(|| Error::UnresolvedConditionKind {
                        path: path.render(),
                        class: class.as_str().to_string(),
                        value: value.map(str::to_string),
                    })?;
                trace!(
                    path = %path.render(),
                    class = class.as_str(),
                    value = ?value,
                    "Resolved conditional value"
                );
                selected.resolve_at(context, path)
            }
        }
    }
}

/// Pick the case for a discriminant value: an exact key first, then the
/// only key that matches as a pattern. Several matching patterns are
/// returned as an error listing their keys.
fn select_case<'a>(
    cases: &'a [Case],
    value: &str,
) -> std::result::Result<Option<&'a ConditionalValue>, Vec<&'a str>> {
    if let Some(case) = cases.iter().find(|case| case.key == value) {
        return Ok(Some(&case.value));
    }
    let matching: Vec<&Case> = cases
        .iter()
        .filter(|case| case.matches_pattern(value))
        .collect();
    match matching.as_slice() {
        [] => Ok(None),
        [case] => Ok(Some(&case.value)),
        _ => Err(matching.iter().map(|case| case.key.as_str()).collect()),
    }
}

/// Parse and resolve a JSON value in one step.
///
/// # Errors
///
/// See [`ConditionalValue::parse`] and [`ConditionalValue::resolve`].
pub fn resolve_value(value: &Value, context: &Context) -> Result<Value> {
    ConditionalValue::parse(value)?.resolve(context)
}

/// Resolve every conditional value in a document.
///
/// Errors report field paths prefixed with `root` (typically the task name).
///
/// # Errors
///
/// See [`ConditionalValue::parse`] and [`ConditionalValue::resolve`].
pub fn resolve_document(document: Document, context: &Context, root: &str) -> Result<Document> {
    let mut path = FieldPath::rooted(root);
    let parsed = ConditionalValue::parse_mapping(document.as_map(), &mut path)?;
    if !parsed.is_conditional() {
        return Ok(document);
    }
    match parsed.resolve_at(context, &mut path)? {
        Value::Object(map) => Ok(Document::from(map)),
        other => Err(Error::malformed(
            root,
            format!("document resolved to a non-mapping value: {other}"),
        )),
    }
}

/// Resolve a single dotted field of a document in place.
///
/// Missing fields are left alone.
///
/// # Errors
///
/// See [`ConditionalValue::parse`] and [`ConditionalValue::resolve`].
pub fn resolve_keyed_by(document: &mut Document, field: &str, context: &Context) -> Result<()> {
    let Some(value) = document.get_path(field) else {
        return Ok(());
    };
    let resolved = ConditionalValue::parse(value)?.resolve_in(context, field)?;
    document.set_path(field, resolved);
    Ok(())
}

/// Dotted field path used in error messages.
#[derive(Debug, Default)]
struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    fn rooted(root: &str) -> Self {
        Self {
            segments: if root.is_empty() {
                Vec::new()
            } else {
                vec![root.to_string()]
            },
        }
    }

    fn push(&mut self, segment: &str) {
        self.segments.push(segment.to_string());
    }

    fn pop(&mut self) {
        self.segments.pop();
    }

    fn render(&self) -> String {
        if self.segments.is_empty() {
            "<root>".to_string()
        } else {
            self.segments.join(".")
        }
    }
}

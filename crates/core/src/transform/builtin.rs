//! Built-in transforms.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::{Transform, TransformContext, TransformError};
use crate::document::Document;
use crate::expand::{DEPENDENT_TASKS_KEY, NAME_KEY, PRIMARY_DEPENDENCY_KEY};
use crate::resolve::resolve_keyed_by;

type TransformResult = std::result::Result<Document, TransformError>;

/// Derive identity and dependencies from the upstream tasks a skeleton was
/// grouped from.
///
/// Sets `label` to `<kind>-<name>`, `dependencies` to the labels of the
/// dependent tasks, copies the primary dependency's attributes that the
/// task does not set itself, and inherits `shipping-phase` from them.
#[must_use]
pub fn multi_dep() -> Transform {
    Transform::map("multi-dep", apply_multi_dep)
}

fn apply_multi_dep(mut doc: Document, ctx: &TransformContext<'_>) -> TransformResult {
    let name = doc
        .get_str(NAME_KEY)
        .ok_or_else(|| TransformError::missing_field(NAME_KEY))?
        .to_string();
    let dependencies: Vec<Value> = doc
        .get(DEPENDENT_TASKS_KEY)
        .and_then(Value::as_object)
        .filter(|tasks| !tasks.is_empty())
        .ok_or_else(|| TransformError::field(DEPENDENT_TASKS_KEY, "no upstream tasks to depend on"))?
        .keys()
        .cloned()
        .map(Value::String)
        .collect();
    let primary_attributes = doc
        .get_path(&format!("{PRIMARY_DEPENDENCY_KEY}.attributes"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    doc.set_default("label", format!("{}-{name}", ctx.kind()));
    doc.insert("dependencies", dependencies);

    let attributes = doc
        .object_mut("attributes")
        .ok_or_else(|| TransformError::field("attributes", "must be a mapping"))?;
    for (key, value) in &primary_attributes {
        if !attributes.contains_key(key) {
            attributes.insert(key.clone(), value.clone());
        }
    }
    if let Some(phase) = primary_attributes.get("shipping-phase") {
        doc.set_default("shipping-phase", phase.clone());
    }
    Ok(doc)
}

/// Validate and complete the worker payload of a GitHub release task.
///
/// `worker.github-project`, `worker.release-name` and `worker.is-prerelease`
/// may still be conditional; they are resolved against the task's
/// attributes. The sorted dependency labels become `worker.release-tasks`.
#[must_use]
pub fn github_release() -> Transform {
    Transform::map("github-release", apply_github_release)
}

const GITHUB_PROJECT: &str = "worker.github-project";
const RELEASE_NAME: &str = "worker.release-name";
const IS_PRERELEASE: &str = "worker.is-prerelease";

fn apply_github_release(mut doc: Document, ctx: &TransformContext<'_>) -> TransformResult {
    let resolution = ctx.resolution_context(&doc);
    for field in [GITHUB_PROJECT, RELEASE_NAME, IS_PRERELEASE] {
        resolve_keyed_by(&mut doc, field, &resolution)?;
    }

    for field in [GITHUB_PROJECT, RELEASE_NAME] {
        match doc.get_path(field) {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(_) => return Err(TransformError::field(field, "must be a non-empty string")),
            None => return Err(TransformError::missing_field(field)),
        }
    }
    match doc.get_path(IS_PRERELEASE) {
        Some(Value::Bool(_)) => {}
        Some(_) => return Err(TransformError::field(IS_PRERELEASE, "must be a boolean")),
        None => return Err(TransformError::missing_field(IS_PRERELEASE)),
    }

    let release_tasks: BTreeSet<&str> = doc
        .get("dependencies")
        .and_then(Value::as_array)
        .map(|deps| deps.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let release_tasks: Vec<Value> = release_tasks.into_iter().map(Value::from).collect();
    doc.set_path("worker.release-tasks", release_tasks);
    Ok(doc)
}

/// Fill in reporting metadata.
///
/// Must run after a transform that sets `shipping-phase`.
#[must_use]
pub fn treeherder() -> Transform {
    Transform::map("treeherder", apply_treeherder)
}

fn apply_treeherder(mut doc: Document, _ctx: &TransformContext<'_>) -> TransformResult {
    if doc.get_str("shipping-phase").is_none() {
        return Err(TransformError::field(
            "shipping-phase",
            "must be set before the treeherder transform runs",
        ));
    }
    let platform = doc
        .get_path("attributes.build-type")
        .and_then(Value::as_str)
        .map(|build_type| format!("{build_type}/opt"));

    let treeherder = doc
        .object_mut("treeherder")
        .ok_or_else(|| TransformError::field("treeherder", "must be a mapping"))?;
    if !treeherder.get("job-symbol").is_some_and(Value::is_string) {
        return Err(TransformError::missing_field("treeherder.job-symbol"));
    }
    set_default(treeherder, "kind", Value::from("build"));
    set_default(treeherder, "tier", Value::from(1));
    if let Some(platform) = platform {
        set_default(treeherder, "platform", Value::from(platform));
    }
    Ok(doc)
}

fn set_default(map: &mut Map<String, Value>, key: &str, value: Value) {
    if !map.contains_key(key) {
        map.insert(key.to_string(), value);
    }
}

/// Finalise a document into task shape.
///
/// Defaults `label` to `<kind>-<name>` and `dependencies` to the dependent
/// task labels, requires a `description`, stamps `kind` and
/// `attributes.kind`, and strips the keys only the loader uses.
#[must_use]
pub fn task() -> Transform {
    Transform::map("task", apply_task)
}

fn apply_task(mut doc: Document, ctx: &TransformContext<'_>) -> TransformResult {
    if !doc.contains_key("label") {
        let name = doc
            .get_str(NAME_KEY)
            .ok_or_else(|| TransformError::missing_field("label"))?;
        let label = format!("{}-{name}", ctx.kind());
        doc.insert("label", label);
    }
    if !doc.get_str("description").is_some_and(|d| !d.is_empty()) {
        return Err(TransformError::missing_field("description"));
    }
    if !doc.contains_key("dependencies") {
        let dependencies: Vec<Value> = doc
            .get(DEPENDENT_TASKS_KEY)
            .and_then(Value::as_object)
            .map(|tasks| tasks.keys().cloned().map(Value::String).collect())
            .unwrap_or_default();
        doc.insert("dependencies", dependencies);
    }

    doc.insert("kind", ctx.kind());
    doc.object_mut("attributes")
        .ok_or_else(|| TransformError::field("attributes", "must be a mapping"))?
        .insert("kind".to_string(), Value::from(ctx.kind()));

    for key in [NAME_KEY, PRIMARY_DEPENDENCY_KEY, DEPENDENT_TASKS_KEY] {
        doc.remove(key);
    }
    Ok(doc)
}

//! The conditional export map as a tree of tagged nodes.
//!
//! `package.json#exports` is heterogeneous: a value is either a file path, a
//! mapping from condition name to a nested value, `null`, or a fallback array.
//! It is normalized once into [`ExportNode`] so traversal can pattern-match
//! instead of probing JSON shapes.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ManifestError, Result};

/// The condition that is always consulted last.
pub const DEFAULT_CONDITION: &str = "default";

/// One node of a conditional export map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExportNode {
    /// A relative file path, e.g. `./dist/index.mjs`.
    Leaf(String),
    /// Condition name to child node, in declaration order.
    Conditional(IndexMap<String, ExportNode>),
    /// `null`: the subpath or condition is deliberately not exported.
    Excluded,
}

impl ExportNode {
    /// Normalize one JSON value of an export map.
    ///
    /// Fallback arrays collapse to their first non-null element.
    pub fn from_value(value: &Value, field: &FieldPath) -> Result<Self> {
        match value {
            Value::String(path) => Ok(ExportNode::Leaf(path.clone())),
            Value::Null => Ok(ExportNode::Excluded),
            Value::Object(map) => {
                let mut conditions = IndexMap::with_capacity(map.len());
                for (key, child) in map {
                    let node = ExportNode::from_value(child, &field.condition(key))?;
                    conditions.insert(key.clone(), node);
                }
                Ok(ExportNode::Conditional(conditions))
            }
            Value::Array(items) => items
                .iter()
                .find(|item| !item.is_null())
                .map_or(Ok(ExportNode::Excluded), |item| {
                    ExportNode::from_value(item, field)
                }),
            other => Err(ManifestError::InvalidField {
                field: field.to_string(),
                message: format!("expected a path, an object or null, found `{other}`"),
            }),
        }
    }

    /// Children of a conditional node in the order they are consulted:
    /// declaration order, except that `default` always comes last.
    pub fn consult_order(&self) -> Vec<(&str, &ExportNode)> {
        let ExportNode::Conditional(map) = self else {
            return Vec::new();
        };
        let mut ordered: Vec<(&str, &ExportNode)> = map
            .iter()
            .filter(|(key, _)| key.as_str() != DEFAULT_CONDITION)
            .map(|(key, node)| (key.as_str(), node))
            .collect();
        if let Some(node) = map.get(DEFAULT_CONDITION) {
            ordered.push((DEFAULT_CONDITION, node));
        }
        ordered
    }

    /// Every leaf path below this node, in consult order.
    pub fn leaves(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ExportNode::Leaf(path) => out.push(path),
            ExportNode::Conditional(_) => {
                for (_, child) in self.consult_order() {
                    child.collect_leaves(out);
                }
            }
            ExportNode::Excluded => {}
        }
    }

    /// Replace every `*` in leaf paths with `replacement`.
    pub fn substitute_wildcard(&self, replacement: &str) -> ExportNode {
        match self {
            ExportNode::Leaf(path) => ExportNode::Leaf(path.replace('*', replacement)),
            ExportNode::Conditional(map) => ExportNode::Conditional(
                map.iter()
                    .map(|(key, node)| (key.clone(), node.substitute_wildcard(replacement)))
                    .collect(),
            ),
            ExportNode::Excluded => ExportNode::Excluded,
        }
    }
}

/// The normalized `exports` field: subpath (`.`, `./shared`, `./*`) to node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExportsField {
    subpaths: IndexMap<String, ExportNode>,
}

impl ExportsField {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize the raw `exports` value.
    ///
    /// A bare string or a condition-only object is sugar for `{ ".": ... }`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let root = FieldPath::exports();
        let mut field = ExportsField::new();
        match value {
            Value::Object(map) => {
                let subpath_key = map.keys().find(|key| key.starts_with('.'));
                let condition_key = map.keys().find(|key| !key.starts_with('.'));
                match (subpath_key, condition_key) {
                    (Some(subpath), Some(condition)) => {
                        return Err(ManifestError::MixedExportKeys {
                            subpath: subpath.clone(),
                            condition: condition.clone(),
                        });
                    }
                    (Some(_), None) => {
                        for (subpath, child) in map {
                            let node = ExportNode::from_value(child, &root.subpath(subpath))?;
                            field.subpaths.insert(subpath.clone(), node);
                        }
                    }
                    (None, _) => {
                        let node = ExportNode::from_value(value, &root.subpath("."))?;
                        field.subpaths.insert(".".to_string(), node);
                    }
                }
            }
            Value::Null => {}
            other => {
                let node = ExportNode::from_value(other, &root.subpath("."))?;
                field.subpaths.insert(".".to_string(), node);
            }
        }
        Ok(field)
    }

    pub fn insert(&mut self, subpath: impl Into<String>, node: ExportNode) {
        self.subpaths.insert(subpath.into(), node);
    }

    pub fn get(&self, subpath: &str) -> Option<&ExportNode> {
        self.subpaths.get(subpath)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExportNode)> {
        self.subpaths.iter().map(|(key, node)| (key.as_str(), node))
    }

    pub fn is_empty(&self) -> bool {
        self.subpaths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subpaths.len()
    }
}

/// A printable location inside the manifest, e.g. `exports["."].require`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn exports() -> Self {
        FieldPath("exports".to_string())
    }

    /// A top-level field such as `main` or `bin`.
    pub fn field(name: &str) -> Self {
        FieldPath(name.to_string())
    }

    pub fn subpath(&self, subpath: &str) -> Self {
        FieldPath(format!("{}[{subpath:?}]", self.0))
    }

    /// Append a condition key. Identifier-like keys use dot notation.
    pub fn condition(&self, key: &str) -> Self {
        let is_ident = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            && !key.starts_with(|c: char| c.is_ascii_digit());
        if is_ident {
            FieldPath(format!("{}.{key}", self.0))
        } else {
            FieldPath(format!("{}[{key:?}]", self.0))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

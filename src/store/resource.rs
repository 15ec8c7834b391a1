//! Resource model exposed by a backing store.
//!
//! # Responsibilities
//! - Represent a node of the content tree (path + property bag)
//! - Decode loosely typed multi-value properties once, at the boundary
//! - Provide the path arithmetic shared by every index (parent, name, normalize)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single property value as stored by the backing store.
///
/// Alias and vanity properties may be written either as a single string or
/// as a list of strings; the engine only ever reads them through
/// [`ValueMap::strings`], which collapses both shapes into a `Vec<String>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Long(i64),
    String(String),
    Strings(Vec<String>),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<Vec<&str>> for PropertyValue {
    fn from(values: Vec<&str>) -> Self {
        PropertyValue::Strings(values.into_iter().map(str::to_string).collect())
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Long(value)
    }
}

/// Shape of a multi-valued string property after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiValue {
    Absent,
    Single(String),
    Multi(Vec<String>),
}

impl MultiValue {
    /// Collapse into the domain representation.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            MultiValue::Absent => Vec::new(),
            MultiValue::Single(value) => vec![value],
            MultiValue::Multi(values) => values,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, MultiValue::Absent)
    }
}

/// Property bag of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueMap(BTreeMap<String, PropertyValue>);

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Decode a string or string-array property.
    ///
    /// Non-string values are treated as absent.
    pub fn multi(&self, name: &str) -> MultiValue {
        match self.0.get(name) {
            Some(PropertyValue::String(value)) => MultiValue::Single(value.clone()),
            Some(PropertyValue::Strings(values)) => MultiValue::Multi(values.clone()),
            _ => MultiValue::Absent,
        }
    }

    /// All string values of a property, in declaration order.
    pub fn strings(&self, name: &str) -> Vec<String> {
        self.multi(name).into_vec()
    }

    /// First string value of a property.
    pub fn first(&self, name: &str) -> Option<String> {
        self.strings(name).into_iter().next()
    }

    /// Boolean property; accepts `true`/`false` strings as well.
    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(PropertyValue::Bool(value)) => Some(*value),
            Some(PropertyValue::String(value)) => value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer property; accepts numeric strings as well.
    pub fn long(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(PropertyValue::Long(value)) => Some(*value),
            Some(PropertyValue::String(value)) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A node of the content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    path: String,
    #[serde(default)]
    properties: ValueMap,
}

impl Resource {
    pub fn new(path: impl Into<String>, properties: ValueMap) -> Self {
        Self {
            path: path.into(),
            properties,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment; empty for the root.
    pub fn name(&self) -> &str {
        name_of(&self.path)
    }

    pub fn parent_path(&self) -> Option<&str> {
        parent_of(&self.path)
    }

    pub fn properties(&self) -> &ValueMap {
        &self.properties
    }
}

/// Parent of an absolute path. `None` for the root.
pub fn parent_of(path: &str) -> Option<&str> {
    if path == "/" || path.is_empty() {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Last segment of a path.
pub fn name_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Join a child name onto a parent path.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Normalize `.` and `..` segments and duplicate slashes.
///
/// Returns `None` when `..` would climb above the root.
pub fn normalize(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(format!("/{}", segments.join("/")))
}

/// True when `path` equals `ancestor` or lies below it.
pub fn is_same_or_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path.starts_with('/');
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

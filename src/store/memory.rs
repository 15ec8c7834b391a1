//! In-memory backing store.
//!
//! # Responsibilities
//! - Hold a content tree keyed by absolute path
//! - Execute the SQL-like statements of [`crate::store::query`]
//! - Load JSON fixtures and diff successive fixture versions into change events
//!
//! # Design Decisions
//! - Intermediate nodes are created implicitly with empty properties
//! - Removing a node removes its whole subtree
//! - Query support can be switched off per statement shape to emulate
//!   stores without ordered-range support

use parking_lot::RwLock;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::store::change::ResourceChange;
use crate::store::query::{like_to_regex, QueryError, QueryResult, Statement, SQL2};
use crate::store::resource::{
    is_same_or_descendant, normalize, parent_of, PropertyValue, Resource, ValueMap,
};
use crate::store::{ResourceIter, ResourceStore};

/// Errors raised while loading a fixture.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid path in fixture: {0}")]
    InvalidPath(String),
}

/// Thread-safe in-memory content tree.
#[derive(Debug)]
pub struct MemoryStore {
    nodes: RwLock<BTreeMap<String, ValueMap>>,
    range_queries: AtomicBool,
    equality_queries: AtomicBool,
    queries: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a store containing only the root node.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), ValueMap::new());
        Self {
            nodes: RwLock::new(nodes),
            range_queries: AtomicBool::new(true),
            equality_queries: AtomicBool::new(true),
            queries: AtomicUsize::new(0),
        }
    }

    /// Build a store from a flat JSON object of `path -> properties`.
    pub fn from_json(json: &str) -> Result<Self, FixtureError> {
        let store = Self::new();
        for (path, props) in parse_fixture(json)? {
            store.put(&path, props);
        }
        Ok(store)
    }

    /// Load a JSON fixture from disk.
    pub fn load_fixture(path: &Path) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Enable or disable `FIRST(...) >= ...` range queries.
    pub fn set_range_queries(&self, enabled: bool) {
        self.range_queries.store(enabled, Ordering::Relaxed);
    }

    /// Enable or disable equality queries.
    pub fn set_equality_queries(&self, enabled: bool) {
        self.equality_queries.store(enabled, Ordering::Relaxed);
    }

    /// Number of queries executed so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Insert or replace a node, creating missing ancestors.
    pub fn put(&self, path: &str, properties: ValueMap) {
        let mut nodes = self.nodes.write();
        let mut ancestor = parent_of(path);
        while let Some(p) = ancestor {
            nodes.entry(p.to_string()).or_default();
            ancestor = parent_of(p);
        }
        nodes.insert(path.to_string(), properties);
    }

    /// Set one property on an existing or new node.
    pub fn set_property(&self, path: &str, name: &str, value: impl Into<PropertyValue>) {
        let mut props = self.nodes.read().get(path).cloned().unwrap_or_default();
        props.insert(name, value);
        self.put(path, props);
    }

    /// Remove one property. Returns false when the node does not exist.
    pub fn remove_property(&self, path: &str, name: &str) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(path) {
            Some(props) => {
                props.remove(name);
                true
            }
            None => false,
        }
    }

    /// Remove a node and its subtree. Returns the number of removed nodes.
    pub fn remove(&self, path: &str) -> usize {
        let mut nodes = self.nodes.write();
        let doomed: Vec<String> = nodes
            .keys()
            .filter(|p| p.as_str() != "/" && is_same_or_descendant(p, path))
            .cloned()
            .collect();
        for p in &doomed {
            nodes.remove(p);
        }
        doomed.len()
    }

    /// Replace the whole tree, returning the changes needed to get there.
    pub fn replace_all(&self, json: &str) -> Result<Vec<ResourceChange>, FixtureError> {
        let incoming = Self::from_json(json)?;
        let next = incoming.nodes.into_inner();
        let mut nodes = self.nodes.write();

        let mut changes = Vec::new();
        for (path, props) in nodes.iter() {
            match next.get(path) {
                None => changes.push(ResourceChange::removed(path.clone())),
                Some(new_props) if new_props != props => {
                    changes.push(ResourceChange::changed(path.clone()))
                }
                Some(_) => {}
            }
        }
        for path in next.keys() {
            if !nodes.contains_key(path) {
                changes.push(ResourceChange::added(path.clone()));
            }
        }
        *nodes = next;
        Ok(changes)
    }

    fn execute(&self, statement: Statement) -> QueryResult<Vec<Resource>> {
        let nodes = self.nodes.read();
        let visible = |path: &str, exclude: Option<&str>| match exclude {
            Some(excluded) => !is_same_or_descendant(path, excluded),
            None => true,
        };

        match &statement {
            Statement::FirstValueRange {
                property, start, ..
            } => {
                if !self.range_queries.load(Ordering::Relaxed) {
                    return Err(QueryError::Unsupported(format!(
                        "FIRST([{}]) ordering is not supported",
                        property
                    )));
                }
                let mut hits: Vec<(String, Resource)> = nodes
                    .iter()
                    .filter(|(path, _)| visible(path.as_str(), statement.exclude()))
                    .filter_map(|(path, props)| {
                        let first = props.first(property)?;
                        (first.as_str() >= start.as_str())
                            .then(|| (first, Resource::new(path.clone(), props.clone())))
                    })
                    .collect();
                hits.sort_by(|a, b| a.0.cmp(&b.0));
                Ok(hits.into_iter().map(|(_, r)| r).collect())
            }
            Statement::AnyValueMatches {
                property,
                values,
                patterns,
                order_desc_by,
                ..
            } => {
                if !self.equality_queries.load(Ordering::Relaxed) {
                    return Err(QueryError::Unsupported(format!(
                        "equality on [{}] is not supported",
                        property
                    )));
                }
                let patterns = patterns
                    .iter()
                    .map(|p| Regex::new(&like_to_regex(p)))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|err| QueryError::Store(err.to_string()))?;
                let matches = |value: &String| values.contains(value) || patterns.iter().any(|re| re.is_match(value));
                let mut hits: Vec<Resource> = nodes
                    .iter()
                    .filter(|(path, _)| visible(path.as_str(), statement.exclude()))
                    .filter(|(_, props)| props.strings(property).iter().any(|v| matches(v)))
                    .map(|(path, props)| Resource::new(path.clone(), props.clone()))
                    .collect();
                if let Some(order) = order_desc_by {
                    hits.sort_by_key(|r| std::cmp::Reverse(r.properties().long(order).unwrap_or(0)));
                }
                Ok(hits)
            }
        }
    }
}

impl ResourceStore for MemoryStore {
    fn get_resource(&self, path: &str) -> Option<Resource> {
        self.nodes
            .read()
            .get(path)
            .map(|props| Resource::new(path, props.clone()))
    }

    fn list_children(&self, parent: &str) -> Vec<Resource> {
        let nodes = self.nodes.read();
        let prefix = if parent == "/" {
            "/".to_string()
        } else {
            format!("{}/", parent)
        };
        nodes
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| path.len() > prefix.len() && !path[prefix.len()..].contains('/'))
            .map(|(path, props)| Resource::new(path.clone(), props.clone()))
            .collect()
    }

    fn find_resources(&self, query: &str, language: &str) -> QueryResult<ResourceIter<'_>> {
        if language != SQL2 {
            return Err(QueryError::UnsupportedLanguage(language.to_string()));
        }
        self.queries.fetch_add(1, Ordering::Relaxed);
        let statement: Statement = query.parse()?;
        let results = self.execute(statement)?;
        Ok(Box::new(results.into_iter()))
    }
}

fn parse_fixture(json: &str) -> Result<Vec<(String, ValueMap)>, FixtureError> {
    let raw: BTreeMap<String, ValueMap> = serde_json::from_str(json)?;
    raw.into_iter()
        .map(|(path, props)| {
            if !path.starts_with('/') {
                return Err(FixtureError::InvalidPath(path));
            }
            let normalized = normalize(&path).ok_or(FixtureError::InvalidPath(path))?;
            Ok((normalized, props))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query::{quote_literal, START_PLACEHOLDER};

    fn fixture() -> MemoryStore {
        MemoryStore::from_json(
            r#"{
                "/content/a": {"sling:alias": "alpha"},
                "/content/b": {"sling:alias": ["beta", "bravo"]},
                "/content/c/jcr:content": {"sling:vanityPath": "/promo"},
                "/jcr:system/x": {"sling:alias": "hidden"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_implicit_ancestors_and_children() {
        let store = fixture();
        assert!(store.get_resource("/content").is_some());
        assert!(store.get_resource("/content/c").is_some());
        let names: Vec<String> = store
            .list_children("/content")
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        let roots: Vec<String> = store.list_children("/").iter().map(|r| r.path().to_string()).collect();
        assert_eq!(roots, vec!["/content", "/jcr:system"]);
    }

    #[test]
    fn test_range_query_order_and_exclusion() {
        let store = fixture();
        let query = Statement::range_template("sling:alias", Some("/jcr:system"))
            .replace(START_PLACEHOLDER, &quote_literal(""));
        let paths: Vec<String> = store
            .find_resources(&query, SQL2)
            .unwrap()
            .map(|r| r.path().to_string())
            .collect();
        assert_eq!(paths, vec!["/content/a", "/content/b"]);
        assert_eq!(store.query_count(), 1);
    }

    #[test]
    fn test_unsupported_queries() {
        let store = fixture();
        assert!(matches!(
            store.find_resources("SELECT 1", "xpath"),
            Err(QueryError::UnsupportedLanguage(_))
        ));
        store.set_range_queries(false);
        let query = Statement::range_template("sling:alias", None)
            .replace(START_PLACEHOLDER, &quote_literal(""));
        assert!(matches!(
            store.find_resources(&query, SQL2),
            Err(QueryError::Unsupported(_))
        ));
    }

    #[test]
    fn test_value_match_query() {
        let store = fixture();
        store.put(
            "/content/d",
            serde_json::from_str(r#"{"sling:vanityPath": "http://localhost:8080/promo.html"}"#).unwrap(),
        );
        let statement = Statement::AnyValueMatches {
            property: "sling:vanityPath".into(),
            values: vec!["/promo".into()],
            patterns: vec!["%://%/promo.%".into()],
            exclude: Some("/jcr:system".into()),
            order_desc_by: None,
        };
        let paths: Vec<String> = store
            .find_resources(&statement.to_string(), SQL2)
            .unwrap()
            .map(|r| r.path().to_string())
            .collect();
        assert_eq!(paths, vec!["/content/c/jcr:content", "/content/d"]);

        store.set_equality_queries(false);
        assert!(matches!(
            store.find_resources(&statement.to_string(), SQL2),
            Err(QueryError::Unsupported(_))
        ));
    }

    #[test]
    fn test_subtree_removal() {
        let store = fixture();
        assert_eq!(store.remove("/content/c"), 2);
        assert!(store.get_resource("/content/c/jcr:content").is_none());
        assert!(store.get_resource("/content/a").is_some());
    }

    #[test]
    fn test_replace_all_diff() {
        let store = fixture();
        let changes = store
            .replace_all(
                r#"{
                    "/content/a": {"sling:alias": "alpha2"},
                    "/content/b": {"sling:alias": ["beta", "bravo"]},
                    "/content/d": {}
                }"#,
            )
            .unwrap();
        assert!(changes.contains(&ResourceChange::changed("/content/a")));
        assert!(changes.contains(&ResourceChange::added("/content/d")));
        assert!(changes.contains(&ResourceChange::removed("/content/c/jcr:content")));
        assert!(!changes.iter().any(|c| c.path == "/content/b"));
    }
}

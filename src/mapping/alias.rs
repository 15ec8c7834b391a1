//! Alias index.
//!
//! # Responsibilities
//! - Map `parent path -> child name -> aliases`
//! - Merge aliases of a child's content node into the child's own list
//! - Reject invalid and conflicting alias values one value at a time
//!
//! # Design Decisions
//! - Optimized mode pre-builds the index from one paged scan and keeps it
//!   current through change hooks; a failing scan degrades the instance to
//!   non-optimized mode for good
//! - Non-optimized mode reads the store on every lookup
//! - Within one parent an alias belongs to the first child registering it

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::AliasConfig;
use crate::mapping::paged::PagedQuery;
use crate::observability::metrics;
use crate::store::resource::{child_path, is_same_or_descendant, name_of, parent_of};
use crate::store::{ResourceStore, Statement, ValueMap};

/// Aliases contributed to one child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ChildAliases {
    own: Vec<String>,
    content: Vec<String>,
}

impl ChildAliases {
    fn contains(&self, alias: &str) -> bool {
        self.own.iter().chain(&self.content).any(|a| a == alias)
    }

    fn is_empty(&self) -> bool {
        self.own.is_empty() && self.content.is_empty()
    }

    /// Own aliases first, then content-node aliases, without repeats.
    fn merged(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.own.len() + self.content.len());
        for alias in self.own.iter().chain(&self.content) {
            if !out.contains(alias) {
                out.push(alias.clone());
            }
        }
        out
    }
}

type AliasMap = HashMap<String, BTreeMap<String, ChildAliases>>;

/// Where a resource's aliases are filed.
struct Holder {
    parent: String,
    child: String,
    content: bool,
}

/// True for alias values that can address a child.
pub fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty()
        && !alias.chars().all(|c| c == '.')
        && !alias.contains(['/', '#', '?'])
}

/// Path-alias index over a backing store.
pub struct AliasIndex {
    store: Arc<dyn ResourceStore>,
    config: AliasConfig,
    excluded_prefix: String,
    optimized: AtomicBool,
    map: RwLock<AliasMap>,
    conflicts: AtomicU64,
    invalid: AtomicU64,
}

impl AliasIndex {
    pub fn new(store: Arc<dyn ResourceStore>, config: AliasConfig, excluded_prefix: String) -> Self {
        let optimized = config.optimized;
        Self {
            store,
            config,
            excluded_prefix,
            optimized: AtomicBool::new(optimized),
            map: RwLock::new(HashMap::new()),
            conflicts: AtomicU64::new(0),
            invalid: AtomicU64::new(0),
        }
    }

    /// Clear and, when optimized, repopulate the index from a full scan.
    ///
    /// Any scan failure switches this instance to non-optimized mode.
    pub fn initialize(&self) {
        self.map.write().clear();
        if !self.is_optimized() {
            return;
        }

        let started = Instant::now();
        let template = Statement::range_template(&self.config.property, Some(&self.excluded_prefix));
        let scan = PagedQuery::new(
            self.store.as_ref(),
            "alias",
            &self.config.property,
            template,
            self.config.page_size,
        );

        let mut fresh = AliasMap::new();
        let mut count = 0usize;
        for item in scan {
            match item {
                Ok(resource) => {
                    if let Some(holder) = self.holder_of(resource.path()) {
                        let values = resource.properties().strings(&self.config.property);
                        self.register(&mut fresh, &holder, values);
                        count += 1;
                    }
                }
                Err(err) => {
                    if err.is_recoverable_query_failure() {
                        tracing::warn!(
                            error = %err,
                            "Store cannot run the alias scan, falling back to non-optimized alias resolution"
                        );
                    } else {
                        tracing::error!(
                            error = %err,
                            "Alias index scan failed, falling back to non-optimized alias resolution"
                        );
                    }
                    self.optimized.store(false, Ordering::Release);
                    return;
                }
            }
        }

        *self.map.write() = fresh;
        tracing::info!(
            resources = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Alias index initialized"
        );
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized.load(Ordering::Acquire)
    }

    /// Number of rejected duplicate registrations.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Number of rejected invalid alias values.
    pub fn invalid_count(&self) -> u64 {
        self.invalid.load(Ordering::Relaxed)
    }

    /// Recompute the aliases of the node at `path`.
    ///
    /// A content node is recomputed through its parent. Returns true when
    /// the index changed.
    pub fn add_or_update(&self, path: &str) -> bool {
        if !self.is_optimized() {
            return false;
        }
        let Some(holder) = self.holder_of(path) else {
            return false;
        };
        let holder_path = child_path(&holder.parent, &holder.child);
        let own = self
            .store
            .get_resource(&holder_path)
            .map(|r| r.properties().strings(&self.config.property))
            .unwrap_or_default();
        let content = self
            .store
            .get_resource(&child_path(&holder_path, &self.config.content_node))
            .map(|r| r.properties().strings(&self.config.property))
            .unwrap_or_default();

        let mut map = self.map.write();
        let before = take_child(&mut map, &holder.parent, &holder.child);
        let own_holder = Holder {
            content: false,
            ..holder
        };
        self.register(&mut map, &own_holder, own);
        let content_holder = Holder {
            content: true,
            ..own_holder
        };
        self.register(&mut map, &content_holder, content);

        let after = map
            .get(&content_holder.parent)
            .and_then(|bucket| bucket.get(&content_holder.child));
        before.as_ref() != after
    }

    /// Drop the aliases contributed by `path` and its descendants.
    ///
    /// Removing a content node keeps the aliases of its parent node.
    pub fn remove(&self, path: &str) -> bool {
        if !self.is_optimized() {
            return false;
        }
        let mut map = self.map.write();
        let before = map.len();
        map.retain(|parent, _| !is_same_or_descendant(parent, path));
        let mut changed = map.len() != before;

        if let Some(holder) = self.holder_of(path) {
            if holder.content {
                if let Some(entry) = map
                    .get_mut(&holder.parent)
                    .and_then(|bucket| bucket.get_mut(&holder.child))
                {
                    changed |= !entry.content.is_empty();
                    entry.content.clear();
                }
                prune(&mut map, &holder.parent, &holder.child);
            } else {
                changed |= take_child(&mut map, &holder.parent, &holder.child).is_some();
            }
        }
        changed
    }

    /// Aliases of `child` below `parent`.
    pub fn lookup(&self, parent: &str, child: &str) -> Vec<String> {
        if self.is_optimized() {
            return self
                .map
                .read()
                .get(parent)
                .and_then(|bucket| bucket.get(child))
                .map(ChildAliases::merged)
                .unwrap_or_default();
        }
        self.read_aliases(&child_path(parent, child))
    }

    /// All aliased children of `parent`.
    pub fn aliases_of(&self, parent: &str) -> BTreeMap<String, Vec<String>> {
        if self.is_optimized() {
            return self
                .map
                .read()
                .get(parent)
                .map(|bucket| {
                    bucket
                        .iter()
                        .map(|(name, aliases)| (name.clone(), aliases.merged()))
                        .collect()
                })
                .unwrap_or_default();
        }
        self.store
            .list_children(parent)
            .into_iter()
            .filter(|child| child.name() != self.config.content_node)
            .filter_map(|child| {
                let aliases = self.read_aliases(child.path());
                (!aliases.is_empty()).then(|| (child.name().to_string(), aliases))
            })
            .collect()
    }

    /// Name of the child of `parent` registered under `alias`.
    pub fn find_child(&self, parent: &str, alias: &str) -> Option<String> {
        if self.is_optimized() {
            return self.map.read().get(parent).and_then(|bucket| {
                bucket
                    .iter()
                    .find(|(_, aliases)| aliases.contains(alias))
                    .map(|(name, _)| name.clone())
            });
        }
        self.store
            .list_children(parent)
            .into_iter()
            .filter(|child| child.name() != self.config.content_node)
            .find(|child| self.read_aliases(child.path()).iter().any(|a| a == alias))
            .map(|child| child.name().to_string())
    }

    /// Every parent with at least one aliased child.
    pub fn parents(&self) -> Vec<String> {
        let mut parents: Vec<String> = self.map.read().keys().cloned().collect();
        parents.sort();
        parents
    }

    fn read_aliases(&self, path: &str) -> Vec<String> {
        let valid = |props: &ValueMap| -> Vec<String> {
            props
                .strings(&self.config.property)
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| is_valid_alias(a))
                .collect()
        };
        let own = self
            .store
            .get_resource(path)
            .map(|r| valid(r.properties()))
            .unwrap_or_default();
        let content = self
            .store
            .get_resource(&child_path(path, &self.config.content_node))
            .map(|r| valid(r.properties()))
            .unwrap_or_default();
        ChildAliases { own, content }.merged()
    }

    fn holder_of(&self, path: &str) -> Option<Holder> {
        if is_same_or_descendant(path, &self.excluded_prefix) {
            return None;
        }
        let parent = parent_of(path)?;
        let name = name_of(path);
        if name == self.config.content_node {
            let grandparent = parent_of(parent)?;
            return Some(Holder {
                parent: grandparent.to_string(),
                child: name_of(parent).to_string(),
                content: true,
            });
        }
        Some(Holder {
            parent: parent.to_string(),
            child: name.to_string(),
            content: false,
        })
    }

    fn register(&self, map: &mut AliasMap, holder: &Holder, values: Vec<String>) {
        for raw in values {
            let alias = raw.trim();
            if !is_valid_alias(alias) {
                let total = self.invalid.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_alias_invalid();
                tracing::warn!(
                    alias = %raw,
                    parent = %holder.parent,
                    child = %holder.child,
                    total,
                    "Ignoring invalid alias"
                );
                continue;
            }

            let existing = map.get(&holder.parent).and_then(|bucket| {
                bucket
                    .iter()
                    .find(|(name, aliases)| **name != holder.child && aliases.contains(alias))
                    .map(|(name, _)| name.clone())
            });
            if let Some(existing) = existing {
                let total = self.conflicts.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_alias_conflict();
                tracing::warn!(
                    alias,
                    parent = %holder.parent,
                    existing = %existing,
                    rejected = %holder.child,
                    total,
                    "Duplicate alias rejected"
                );
                continue;
            }

            let entry = map
                .entry(holder.parent.clone())
                .or_default()
                .entry(holder.child.clone())
                .or_default();
            let list = if holder.content {
                &mut entry.content
            } else {
                &mut entry.own
            };
            if !list.iter().any(|a| a == alias) {
                list.push(alias.to_string());
            }
        }
    }
}

fn take_child(map: &mut AliasMap, parent: &str, child: &str) -> Option<ChildAliases> {
    let bucket = map.get_mut(parent)?;
    let removed = bucket.remove(child);
    if bucket.is_empty() {
        map.remove(parent);
    }
    removed
}

fn prune(map: &mut AliasMap, parent: &str, child: &str) {
    let Some(bucket) = map.get_mut(parent) else {
        return;
    };
    if bucket.get(child).is_some_and(ChildAliases::is_empty) {
        bucket.remove(child);
    }
    if bucket.is_empty() {
        map.remove(parent);
    }
}

//! Mapping table: owner of every mapping index.
//!
//! # Responsibilities
//! - Build the configured resolve and reverse map entries from the map root
//! - Own the alias and vanity path indexes
//! - Dispatch change batches to the indexes, one batch at a time
//! - Broadcast a [`MappingChange`] after every batch that changed something
//!
//! # Design Decisions
//! - Configured entries are rebuilt wholesale and swapped in atomically
//! - Readers never take the dispatch lock

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use crate::config::ResolverConfig;
use crate::error::MappingResult;
use crate::mapping::alias::AliasIndex;
use crate::mapping::entry::{map_entry_targets, resolve_entry, sort_entries, MappingEntry};
use crate::mapping::events::{ChangeKind, MappingChange, ResourceChange};
use crate::mapping::iter::MappingEntryIter;
use crate::mapping::vanity::VanityPathIndex;
use crate::store::resource::is_same_or_descendant;
use crate::store::ResourceStore;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Entries built from the configured mapping tree.
#[derive(Debug, Default)]
struct ConfiguredMaps {
    resolve: Arc<Vec<Arc<MappingEntry>>>,
    map: Vec<Arc<MappingEntry>>,
}

/// Counters and flags exposed for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub alias_optimized: bool,
    pub alias_conflicts: u64,
    pub alias_invalid: u64,
    pub vanity_ready: bool,
    pub vanity_entries: i64,
    pub vanity_overflowed: bool,
    pub vanity_temporary_hits: u64,
    pub vanity_temporary_misses: u64,
    pub vanity_bloom_negatives: u64,
    pub configured_resolve_entries: usize,
    pub configured_map_entries: usize,
}

/// Mapping indexes over one backing store.
pub struct MappingTable {
    store: Arc<dyn ResourceStore>,
    config: Arc<ResolverConfig>,
    aliases: AliasIndex,
    vanity: Arc<VanityPathIndex>,
    maps: ArcSwap<ConfiguredMaps>,
    dispatch: Mutex<()>,
    changes: broadcast::Sender<MappingChange>,
}

impl MappingTable {
    /// Create the table. Indexes stay empty until [`MappingTable::initialize`].
    pub fn new(store: Arc<dyn ResourceStore>, config: Arc<ResolverConfig>) -> Self {
        let aliases = AliasIndex::new(
            Arc::clone(&store),
            config.alias.clone(),
            config.mapping.excluded_prefix.clone(),
        );
        let vanity = Arc::new(VanityPathIndex::new(
            Arc::clone(&store),
            config.vanity.clone(),
            config.mapping.excluded_prefix.clone(),
            config.alias.content_node.clone(),
        ));
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store,
            config,
            aliases,
            vanity,
            maps: ArcSwap::from_pointee(ConfiguredMaps::default()),
            dispatch: Mutex::new(()),
            changes,
        }
    }

    /// Build the configured maps and populate both indexes.
    ///
    /// Vanity paths may keep loading in the background after this returns.
    pub fn initialize(&self) {
        let _guard = self.dispatch.lock();
        self.rebuild_configured_maps();
        self.aliases.initialize();
        self.vanity.initialize();
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn aliases(&self) -> &AliasIndex {
        &self.aliases
    }

    pub fn vanity(&self) -> &VanityPathIndex {
        &self.vanity
    }

    /// Merged resolve entries for a `scheme/host.port/path` lookup key.
    pub fn resolve_entries(
        &self,
        request_key: &str,
    ) -> MappingEntryIter<impl FnMut(&str) -> MappingResult<Vec<Arc<MappingEntry>>> + '_> {
        let path_key = request_key
            .find('/')
            .and_then(|first| request_key[first + 1..].find('/').map(|second| first + 1 + second))
            .map(|second| &request_key[second..]);
        let vanity = &self.vanity;
        MappingEntryIter::new(
            path_key,
            Arc::clone(&self.maps.load().resolve),
            move |key: &str| vanity.lookup(key),
            self.config.mapping.vanity_path_precedence,
        )
    }

    /// Configured resolve entries, most specific first.
    pub fn configured_resolve_entries(&self) -> Vec<Arc<MappingEntry>> {
        self.maps.load().resolve.as_ref().clone()
    }

    /// Reverse map entries, most specific first.
    pub fn map_entries(&self) -> Vec<Arc<MappingEntry>> {
        self.maps.load().map.clone()
    }

    /// Aliased children of `parent`.
    pub fn alias_map(&self, parent: &str) -> BTreeMap<String, Vec<String>> {
        self.aliases.aliases_of(parent)
    }

    /// Target path -> vanity paths.
    pub fn vanity_path_mappings(&self) -> BTreeMap<String, Vec<String>> {
        self.vanity.vanity_path_mappings()
    }

    /// Receive a [`MappingChange`] after every batch that changed the table.
    pub fn subscribe(&self) -> broadcast::Receiver<MappingChange> {
        self.changes.subscribe()
    }

    pub fn status(&self) -> TableStatus {
        let maps = self.maps.load();
        TableStatus {
            alias_optimized: self.aliases.is_optimized(),
            alias_conflicts: self.aliases.conflict_count(),
            alias_invalid: self.aliases.invalid_count(),
            vanity_ready: self.vanity.is_ready(),
            vanity_entries: self.vanity.entry_count(),
            vanity_overflowed: self.vanity.is_overflowed(),
            vanity_temporary_hits: self.vanity.temporary_hits(),
            vanity_temporary_misses: self.vanity.temporary_misses(),
            vanity_bloom_negatives: self.vanity.bloom_negatives(),
            configured_resolve_entries: maps.resolve.len(),
            configured_map_entries: maps.map.len(),
        }
    }

    /// Apply a batch of store changes.
    pub fn on_change(&self, changes: &[ResourceChange]) -> MappingChange {
        let _guard = self.dispatch.lock();
        let started = Instant::now();
        let map_root = self.config.mapping.map_root.as_str();
        let excluded = self.config.mapping.excluded_prefix.as_str();
        let mut summary = MappingChange::default();

        for change in changes {
            let path = change.path.as_str();
            if is_same_or_descendant(path, excluded) {
                continue;
            }
            if is_same_or_descendant(path, map_root)
                || (change.kind == ChangeKind::Removed && is_same_or_descendant(map_root, path))
            {
                summary.configured = true;
            }

            let alias_changed = match change.kind {
                ChangeKind::Added | ChangeKind::Changed => self.aliases.add_or_update(path),
                ChangeKind::Removed => self.aliases.remove(path),
            };
            if alias_changed {
                summary.alias_paths.push(change.path.clone());
            }
            if self.vanity.handle_change(change) {
                summary.vanity_paths.push(change.path.clone());
            }
        }

        if summary.configured {
            self.rebuild_configured_maps();
        }
        tracing::debug!(
            changes = changes.len(),
            configured = summary.configured,
            aliases = summary.alias_paths.len(),
            vanity = summary.vanity_paths.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Change batch applied"
        );
        if !summary.is_empty() {
            // No subscribers is fine.
            let _ = self.changes.send(summary.clone());
        }
        summary
    }

    fn rebuild_configured_maps(&self) {
        let map_root = self.config.mapping.map_root.as_str();
        let mut resolve: Vec<Arc<MappingEntry>> = Vec::new();
        let mut reverse: Vec<(String, String)> = Vec::new();
        if self.store.get_resource(map_root).is_some() {
            self.gather(map_root, "", &mut resolve, &mut reverse);
        }
        sort_entries(&mut resolve);

        let mut targets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (pattern, target) in reverse {
            let list = targets.entry(pattern).or_default();
            if !list.contains(&target) {
                list.push(target);
            }
        }
        let mut map: Vec<Arc<MappingEntry>> = Vec::new();
        for (pattern, redirects) in targets {
            match MappingEntry::internal(&pattern, redirects) {
                Ok(entry) => map.push(Arc::new(entry)),
                Err(err) => tracing::warn!(error = %err, "Skipping reverse mapping"),
            }
        }
        sort_entries(&mut map);

        tracing::info!(
            map_root,
            resolve_entries = resolve.len(),
            map_entries = map.len(),
            "Configured mappings loaded"
        );
        self.maps.store(Arc::new(ConfiguredMaps {
            resolve: Arc::new(resolve),
            map,
        }));
    }

    fn gather(
        &self,
        parent: &str,
        parent_url: &str,
        resolve: &mut Vec<Arc<MappingEntry>>,
        reverse: &mut Vec<(String, String)>,
    ) {
        let names = &self.config.configured_tree;
        for child in self.store.list_children(parent) {
            let props = child.properties();
            let (name, trailing_slash) = match props.first(&names.match_property) {
                Some(pattern) => (pattern, false),
                None => (format!("{}/", child.name()), true),
            };
            let url = format!("{}{}", parent_url, name);

            if !url.ends_with('$') {
                let child_url = if trailing_slash {
                    url.clone()
                } else {
                    format!("{}/", url)
                };
                self.gather(child.path(), &child_url, resolve, reverse);
            }

            match resolve_entry(&url, props, names, trailing_slash) {
                Ok(Some(entry)) => resolve.push(Arc::new(entry)),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(path = child.path(), error = %err, "Skipping configured mapping")
                }
            }
            reverse.extend(map_entry_targets(&url, props, names));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn table(json: &str) -> (Arc<MemoryStore>, MappingTable) {
        let store = Arc::new(MemoryStore::from_json(json).unwrap());
        let mut config = ResolverConfig::default();
        config.vanity.background_init = false;
        let table = MappingTable::new(store.clone(), Arc::new(config));
        table.initialize();
        (store, table)
    }

    const MAP: &str = r#"{
        "/etc/map/http/localhost.8080": {"sling:redirect": "/content/simple-node"},
        "/etc/map/http/example.com": {"sling:internalRedirect": "/content/site/"},
        "/etc/map/http/regex": {"sling:match": "[^.]+.example.org$", "sling:internalRedirect": "/content/org"},
        "/content/site/page": {"sling:vanityPath": "/promo", "sling:alias": "seite"}
    }"#;

    #[test]
    fn test_configured_entries() {
        let (_, table) = table(MAP);
        let patterns: Vec<String> = table
            .configured_resolve_entries()
            .iter()
            .map(|e| e.pattern().to_string())
            .collect();
        assert_eq!(
            patterns,
            vec![
                "^http/[^.]+.example.org$",
                "^http/example.com.80/",
                "^http/localhost.8080/",
            ]
        );

        let entries = table.configured_resolve_entries();
        let redirect = &entries[2];
        assert_eq!(redirect.redirects(), ["/content/simple-node/"]);
        assert_eq!(redirect.status(), Some(302));

        // the regex host cannot be reversed
        let maps = table.map_entries();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].pattern(), "^/content/site/");
        assert_eq!(maps[0].redirects(), ["http://example.com/"]);
    }

    #[test]
    fn test_resolve_entries_merge_vanity_and_configured() {
        let (_, table) = table(MAP);
        let patterns: Vec<String> = table
            .resolve_entries("http/localhost.80/promo.html")
            .map(|e| e.unwrap().pattern().to_string())
            .collect();
        assert_eq!(patterns.len(), 5);
        assert!(patterns.contains(&"^[^/]+/[^/]+/promo$".to_string()));
    }

    #[test]
    fn test_on_change_rebuilds_maps_and_broadcasts() {
        let (store, table) = table(MAP);
        let mut rx = table.subscribe();

        store.put(
            "/etc/map/http/other.com",
            vec![("sling:redirect", "/elsewhere")].into_iter().collect(),
        );
        let change = table.on_change(&[ResourceChange::added("/etc/map/http/other.com")]);
        assert!(change.configured);
        assert_eq!(table.configured_resolve_entries().len(), 4);
        assert_eq!(rx.try_recv().unwrap(), change);

        store.remove("/etc/map");
        let change = table.on_change(&[ResourceChange::removed("/etc")]);
        assert!(change.configured);
        assert!(table.configured_resolve_entries().is_empty());
    }

    #[test]
    fn test_on_change_updates_indexes() {
        let (store, table) = table(MAP);
        store.set_property("/content/site/page", "sling:alias", "neu");
        let change = table.on_change(&[ResourceChange::changed("/content/site/page")]);
        assert_eq!(change.alias_paths, vec!["/content/site/page"]);
        assert_eq!(change.vanity_paths, vec!["/content/site/page"]);
        assert_eq!(table.alias_map("/content/site").get("page"), Some(&vec!["neu".to_string()]));

        store.remove("/content/site");
        let change = table.on_change(&[ResourceChange::removed("/content/site")]);
        assert!(!change.is_empty());
        assert!(table.alias_map("/content/site").is_empty());
        assert!(table.vanity_path_mappings().is_empty());
    }

    #[test]
    fn test_excluded_changes_are_ignored() {
        let (_, table) = table(MAP);
        let change = table.on_change(&[ResourceChange::added("/jcr:system/anything")]);
        assert!(change.is_empty());
    }
}

//! Vanity path index.
//!
//! # Responsibilities
//! - Turn `sling:vanityPath` values into pairs of mapping entries keyed by
//!   the vanity path
//! - Guard lookups with a bloom filter over every known vanity path
//! - Cap the number of cached entries; refused entries stay reachable
//!   through a targeted query
//! - Populate in the background while lookups fall back to per-key queries
//!
//! # Lifecycle
//! ```text
//! initialize(background = true)
//!     → ready = false, change events queue up, lookups use the temporary cache
//!     → paged scan on a blocking task
//!     → swap index + bloom filter, replay queued events in order
//!     → ready = true, temporary cache dropped
//! ```

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use url::Url;

use crate::config::VanityConfig;
use crate::error::MappingResult;
use crate::mapping::bloom::BloomFilter;
use crate::mapping::entry::{sort_entries, MappingEntry, ANY_SCHEME_HOST};
use crate::mapping::paged::PagedQuery;
use crate::observability::metrics;
use crate::store::query::SQL2;
use crate::store::resource::{is_same_or_descendant, name_of};
use crate::store::{ChangeKind, Resource, ResourceChange, ResourceStore, Statement};

/// Key count the bloom filter is sized for before the byte budget applies.
const BLOOM_EXPECTED_ENTRIES: usize = 10_000_000;

/// One cached entry and the resource that contributed it.
#[derive(Debug, Clone)]
struct VanityEntry {
    source: String,
    entry: Arc<MappingEntry>,
}

/// What one resource contributed to the index.
#[derive(Debug, Clone)]
struct VanitySource {
    target: String,
    keys: Vec<String>,
}

#[derive(Debug, Default)]
struct VanityState {
    sources: BTreeMap<String, VanitySource>,
    resolve_entries: HashMap<String, Vec<VanityEntry>>,
    counter: i64,
    overflowed: bool,
    scan_failed: bool,
}

impl VanityState {
    fn remove_source(&mut self, source: &str) -> bool {
        let Some(removed) = self.sources.remove(source) else {
            return false;
        };
        for key in removed.keys {
            if let Some(entries) = self.resolve_entries.get_mut(&key) {
                let before = entries.len();
                entries.retain(|e| e.source != source);
                self.counter -= (before - entries.len()) as i64;
                if entries.is_empty() {
                    self.resolve_entries.remove(&key);
                }
            }
        }
        true
    }
}

/// Parsed vanity path value: pattern prefix and lookup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VanityDefinition {
    pub prefix: String,
    pub path: String,
}

/// Parse a raw vanity value.
///
/// URL-shaped values (`scheme://host[:port]/path`) bind to one host;
/// plain values match any scheme and host and gain a leading `/`.
/// Extensions in the last segment are dropped.
pub fn vanity_definition(raw: &str) -> Option<VanityDefinition> {
    let info = raw.trim();
    if info.is_empty() {
        return None;
    }

    let (prefix, mut path) = if info.contains(":/") {
        let url = Url::parse(info).ok()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        let prefix = format!("^{}", regex::escape(&format!("{}/{}.{}", url.scheme(), host, port)));
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        (prefix, path)
    } else {
        let path = if info.starts_with('/') {
            info.to_string()
        } else {
            format!("/{}", info)
        };
        (format!("^{}", ANY_SCHEME_HOST), path)
    };

    if path.contains(['#', '?']) || path.chars().any(char::is_whitespace) {
        return None;
    }

    let last_slash = path.rfind('/').unwrap_or(0);
    if let Some(dot) = path[last_slash..].find('.') {
        tracing::warn!(vanity_path = raw, "Removing extension from vanity path");
        path.truncate(last_slash + dot);
    }
    Some(VanityDefinition { prefix, path })
}

/// The two entries produced by one vanity path pointing at `target`.
fn vanity_entries(
    definition: &VanityDefinition,
    target: &str,
    status: Option<u16>,
    order: i64,
) -> MappingResult<[MappingEntry; 2]> {
    let url = format!("{}{}", definition.prefix, regex::escape(&definition.path));
    let name = name_of(target);
    match name.rfind('.') {
        Some(dot) => {
            let extension = regex::escape(&name[dot + 1..]);
            Ok([
                MappingEntry::new(&format!("{}$", url), vec![target.to_string()], status, order, false)?,
                MappingEntry::new(
                    &format!("{}\\.{}", url, extension),
                    vec![target.to_string()],
                    status,
                    order,
                    false,
                )?,
            ])
        }
        None => Ok([
            MappingEntry::new(&format!("{}$", url), vec![format!("{}.html", target)], status, order, false)?,
            MappingEntry::new(&format!("{}(\\..*)", url), vec![format!("{}$1", target)], status, order, false)?,
        ]),
    }
}

/// Vanity path index over a backing store.
pub struct VanityPathIndex {
    store: Arc<dyn ResourceStore>,
    config: VanityConfig,
    excluded_prefix: String,
    content_node: String,

    state: RwLock<VanityState>,
    bloom: ArcSwap<BloomFilter>,
    ready: watch::Sender<bool>,
    pending: Mutex<Vec<ResourceChange>>,
    temporary: DashMap<String, Vec<Arc<MappingEntry>>>,
    /// Bumped under `pending` whenever a queued change invalidates `temporary`.
    generation: AtomicU64,

    temporary_hits: AtomicU64,
    temporary_misses: AtomicU64,
    bloom_negatives: AtomicU64,
}

impl VanityPathIndex {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        config: VanityConfig,
        excluded_prefix: String,
        content_node: String,
    ) -> Self {
        let bloom = BloomFilter::new(BLOOM_EXPECTED_ENTRIES, config.bloom_filter_max_bytes);
        let (ready, _) = watch::channel(false);
        Self {
            store,
            config,
            excluded_prefix,
            content_node,
            state: RwLock::new(VanityState::default()),
            bloom: ArcSwap::from_pointee(bloom),
            ready,
            pending: Mutex::new(Vec::new()),
            temporary: DashMap::new(),
            generation: AtomicU64::new(0),
            temporary_hits: AtomicU64::new(0),
            temporary_misses: AtomicU64::new(0),
            bloom_negatives: AtomicU64::new(0),
        }
    }

    /// Populate the index.
    ///
    /// Without `background_init` the scan runs on the calling thread. With
    /// it, the scan runs on a blocking task (or a plain thread outside a
    /// tokio runtime) and this call returns immediately.
    pub fn initialize(self: &Arc<Self>) {
        self.ready.send_replace(false);
        self.temporary.clear();

        if !self.config.enabled {
            self.complete_initialization(Ok(VanityState::default()), BloomFilter::new(1, 8));
            return;
        }
        if !self.config.background_init {
            self.run_initialization();
            return;
        }

        let index = Arc::clone(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || index.run_initialization());
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("vanity-path-init".into())
                    .spawn(move || index.run_initialization());
                if let Err(err) = spawned {
                    tracing::warn!(error = %err, "Could not start vanity path init thread, running inline");
                    self.run_initialization();
                }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolve once the initial scan has been applied.
    pub async fn wait_until_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Entries for a vanity key (an absolute path without extension).
    ///
    /// Never waits for the initial scan: before it completes, answers come
    /// from a targeted query and are cached until the scan supersedes them.
    pub fn lookup(&self, key: &str) -> MappingResult<Vec<Arc<MappingEntry>>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        if self.is_ready() {
            let overflowed = {
                let state = self.state.read();
                if !state.scan_failed && !self.bloom.load().probably_contains(key.as_bytes()) {
                    self.bloom_negatives.fetch_add(1, Ordering::Relaxed);
                    metrics::record_vanity_bloom_negative();
                    return Ok(Vec::new());
                }
                if let Some(entries) = state.resolve_entries.get(key) {
                    return Ok(entries.iter().map(|e| Arc::clone(&e.entry)).collect());
                }
                state.overflowed
            };
            if overflowed {
                return self.query_entries(key);
            }
            return Ok(Vec::new());
        }

        if let Some(cached) = self.temporary.get(key) {
            self.temporary_hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_vanity_temporary_hit();
            return Ok(cached.clone());
        }
        self.temporary_misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_vanity_temporary_miss();
        let generation = self.generation.load(Ordering::Acquire);
        let entries = self.query_entries(key)?;
        let _pending = self.pending.lock();
        if !self.is_ready() && self.generation.load(Ordering::Acquire) == generation {
            self.temporary.insert(key.to_string(), entries.clone());
        }
        Ok(entries)
    }

    /// Apply one change, or queue it while the initial scan is running.
    ///
    /// Returns true when the index changed.
    pub fn handle_change(&self, change: &ResourceChange) -> bool {
        if !self.config.enabled {
            return false;
        }
        {
            let mut pending = self.pending.lock();
            if !self.is_ready() {
                pending.push(change.clone());
                self.generation.fetch_add(1, Ordering::AcqRel);
                self.temporary.clear();
                return false;
            }
        }
        self.apply(change)
    }

    /// Target path -> vanity paths, for every cached entry.
    pub fn vanity_path_mappings(&self) -> BTreeMap<String, Vec<String>> {
        let state = self.state.read();
        let mut mappings: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for source in state.sources.values() {
            let paths = mappings.entry(source.target.clone()).or_default();
            for key in &source.keys {
                if !paths.contains(key) {
                    paths.push(key.clone());
                }
            }
        }
        mappings
    }

    /// Vanity paths pointing at `target`.
    pub fn vanity_paths_for(&self, target: &str) -> Vec<String> {
        let state = self.state.read();
        let mut paths: Vec<String> = Vec::new();
        for source in state.sources.values().filter(|s| s.target == target) {
            for key in &source.keys {
                if !paths.contains(key) {
                    paths.push(key.clone());
                }
            }
        }
        paths
    }

    /// Number of live cached resolve entries.
    pub fn entry_count(&self) -> i64 {
        self.state.read().counter
    }

    /// True once an entry was refused for capacity (or the scan failed).
    pub fn is_overflowed(&self) -> bool {
        self.state.read().overflowed
    }

    pub fn temporary_hits(&self) -> u64 {
        self.temporary_hits.load(Ordering::Relaxed)
    }

    pub fn temporary_misses(&self) -> u64 {
        self.temporary_misses.load(Ordering::Relaxed)
    }

    pub fn bloom_negatives(&self) -> u64 {
        self.bloom_negatives.load(Ordering::Relaxed)
    }

    /// Bloom filter check for a key.
    pub fn probably_contains(&self, key: &str) -> bool {
        self.bloom.load().probably_contains(key.as_bytes())
    }

    fn run_initialization(&self) {
        let bloom = BloomFilter::new(BLOOM_EXPECTED_ENTRIES, self.config.bloom_filter_max_bytes);
        let scanned = self.scan(&bloom);
        self.complete_initialization(scanned, bloom);
    }

    fn scan(&self, bloom: &BloomFilter) -> MappingResult<VanityState> {
        let started = Instant::now();
        tracing::info!(background = self.config.background_init, "Vanity path index initialization started");
        let template = Statement::range_template(&self.config.property, Some(&self.excluded_prefix));
        let scan = PagedQuery::new(
            self.store.as_ref(),
            "vanity",
            &self.config.property,
            template,
            self.config.page_size,
        );

        let mut state = VanityState::default();
        for item in scan {
            let resource = item?;
            if self.is_allowed(resource.path()) {
                self.load_resource(&mut state, bloom, &resource);
            }
        }
        tracing::debug!(
            entries = state.counter,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Vanity path scan finished"
        );
        Ok(state)
    }

    fn complete_initialization(&self, scanned: MappingResult<VanityState>, bloom: BloomFilter) {
        let started = Instant::now();
        let state = match scanned {
            Ok(state) => state,
            Err(err) => {
                if err.is_recoverable_query_failure() {
                    tracing::warn!(
                        error = %err,
                        "Store cannot run the vanity path scan, serving vanity paths through targeted queries"
                    );
                } else {
                    tracing::error!(
                        error = %err,
                        "Vanity path scan failed, serving vanity paths through targeted queries"
                    );
                }
                VanityState {
                    overflowed: true,
                    scan_failed: true,
                    ..VanityState::default()
                }
            }
        };

        let mut pending = self.pending.lock();
        *self.state.write() = state;
        self.bloom.store(Arc::new(bloom));
        let replayed = pending.len();
        for change in pending.drain(..) {
            self.apply(&change);
        }
        self.ready.send_replace(true);
        drop(pending);
        self.temporary.clear();

        let entries = self.entry_count();
        metrics::record_vanity_entries(entries);
        tracing::info!(
            entries,
            replayed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Vanity path index ready"
        );
    }

    fn apply(&self, change: &ResourceChange) -> bool {
        let changed = match change.kind {
            ChangeKind::Added | ChangeKind::Changed => self.update(&change.path),
            ChangeKind::Removed => self.remove_subtree(&change.path),
        };
        if changed {
            metrics::record_vanity_entries(self.entry_count());
        }
        changed
    }

    fn update(&self, path: &str) -> bool {
        let resource = self
            .store
            .get_resource(path)
            .filter(|r| !r.properties().strings(&self.config.property).is_empty());
        let bloom = self.bloom.load();
        let mut state = self.state.write();
        let mut changed = state.remove_source(path);
        if let Some(resource) = resource {
            if self.is_allowed(path) {
                changed |= self.load_resource(&mut state, &bloom, &resource);
            }
        }
        changed
    }

    fn remove_subtree(&self, path: &str) -> bool {
        let mut state = self.state.write();
        let doomed: Vec<String> = state
            .sources
            .keys()
            .filter(|source| is_same_or_descendant(source, path))
            .cloned()
            .collect();
        let mut changed = false;
        for source in doomed {
            changed |= state.remove_source(&source);
        }
        changed
    }

    fn is_allowed(&self, path: &str) -> bool {
        if is_same_or_descendant(path, &self.excluded_prefix) {
            return false;
        }
        let allowed = self
            .config
            .allowed_prefixes
            .iter()
            .filter(|p| is_same_or_descendant(path, p))
            .map(String::len)
            .max();
        let denied = self
            .config
            .denied_prefixes
            .iter()
            .filter(|p| is_same_or_descendant(path, p))
            .map(String::len)
            .max();
        match (allowed, denied) {
            (_, None) if self.config.allowed_prefixes.is_empty() => true,
            (Some(a), Some(d)) => a > d,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Target of a resource's vanity paths: content nodes stand for their parent.
    fn target_of<'r>(&self, resource: &'r Resource) -> &'r str {
        if resource.name() == self.content_node {
            resource.parent_path().unwrap_or(resource.path())
        } else {
            resource.path()
        }
    }

    fn redirect_of(&self, resource: &Resource) -> (Option<u16>, i64) {
        let props = resource.properties();
        let status = props
            .bool(&self.config.redirect_property)
            .unwrap_or(false)
            .then(|| {
                props
                    .long(&self.config.status_property)
                    .and_then(|s| u16::try_from(s).ok())
                    .unwrap_or(self.config.default_redirect_status)
            });
        let order = props.long(&self.config.order_property).unwrap_or(0);
        (status, order)
    }

    /// Add a resource's vanity paths to `state`. Returns true when anything
    /// was cached.
    fn load_resource(&self, state: &mut VanityState, bloom: &BloomFilter, resource: &Resource) -> bool {
        let target = self.target_of(resource).to_string();
        let (status, order) = self.redirect_of(resource);
        let max = self.config.max_cached_entries;
        let mut keys: Vec<String> = Vec::new();

        for raw in resource.properties().strings(&self.config.property) {
            let Some(definition) = vanity_definition(&raw) else {
                tracing::warn!(vanity_path = %raw, path = resource.path(), "Rejecting invalid vanity path");
                continue;
            };
            let entries = match vanity_entries(&definition, &target, status, order) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(vanity_path = %raw, path = resource.path(), error = %err, "Rejecting vanity path");
                    continue;
                }
            };

            bloom.add(definition.path.as_bytes());
            if max > 0 && state.counter >= max {
                if !state.overflowed {
                    tracing::info!(max_cached_entries = max, "Vanity path cache is full, further entries resolve through queries");
                }
                state.overflowed = true;
                continue;
            }

            let list = state.resolve_entries.entry(definition.path.clone()).or_default();
            for entry in entries {
                list.push(VanityEntry {
                    source: resource.path().to_string(),
                    entry: Arc::new(entry),
                });
                state.counter += 1;
            }
            list.sort_by(|a, b| a.entry.precedence(&b.entry));
            if !keys.contains(&definition.path) {
                keys.push(definition.path);
            }
        }

        if keys.is_empty() {
            return false;
        }
        state
            .sources
            .insert(resource.path().to_string(), VanitySource { target, keys });
        true
    }

    /// Build the entries for `key` straight from the store.
    ///
    /// The statement over-matches (extensions, URL forms on any host); only
    /// values whose definition normalizes to `key` are kept.
    fn query_entries(&self, key: &str) -> MappingResult<Vec<Arc<MappingEntry>>> {
        let mut values = vec![key.to_string()];
        let mut patterns = vec![format!("{}.%", key), format!("%://%{}", key), format!("%://%{}.%", key)];
        if let Some(relative) = key.strip_prefix('/').filter(|r| !r.is_empty()) {
            values.push(relative.to_string());
            patterns.push(format!("{}.%", relative));
        }
        let statement = Statement::AnyValueMatches {
            property: self.config.property.clone(),
            values,
            patterns,
            exclude: Some(self.excluded_prefix.clone()),
            order_desc_by: Some(self.config.order_property.clone()),
        };

        let mut found: Vec<Arc<MappingEntry>> = Vec::new();
        for resource in self.store.find_resources(&statement.to_string(), SQL2)? {
            if !self.is_allowed(resource.path()) {
                continue;
            }
            let target = self.target_of(&resource).to_string();
            let (status, order) = self.redirect_of(&resource);
            for raw in resource.properties().strings(&self.config.property) {
                let Some(definition) = vanity_definition(&raw).filter(|d| d.path == key) else {
                    continue;
                };
                match vanity_entries(&definition, &target, status, order) {
                    Ok(entries) => found.extend(entries.into_iter().map(Arc::new)),
                    Err(err) => tracing::warn!(vanity_path = %raw, error = %err, "Rejecting vanity path"),
                }
            }
        }
        sort_entries(&mut found);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const TREE: &str = r#"{
        "/content/page": {"sling:vanityPath": ["/promo", "offers.html"]},
        "/content/doc.pdf/jcr:content": {"sling:vanityPath": "/doc", "sling:redirect": true},
        "/content/moved": {"sling:vanityPath": "/old", "sling:redirect": true, "sling:redirectStatus": 301},
        "/content/bad": {"sling:vanityPath": ["", "/with space"]},
        "/jcr:system/x": {"sling:vanityPath": "/system"}
    }"#;

    fn index_with(store: &Arc<MemoryStore>, config: VanityConfig) -> Arc<VanityPathIndex> {
        let index = Arc::new(VanityPathIndex::new(
            store.clone(),
            config,
            "/jcr:system".into(),
            "jcr:content".into(),
        ));
        index.initialize();
        index
    }

    fn sync_config() -> VanityConfig {
        VanityConfig {
            background_init: false,
            page_size: 2,
            ..VanityConfig::default()
        }
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::from_json(TREE).unwrap())
    }

    #[test]
    fn test_definitions() {
        let plain = vanity_definition("promo").unwrap();
        assert_eq!(plain.path, "/promo");
        assert_eq!(plain.prefix, "^[^/]+/[^/]+");

        let stripped = vanity_definition("/a/offers.html").unwrap();
        assert_eq!(stripped.path, "/a/offers");

        let url = vanity_definition("https://example.com/deal").unwrap();
        assert_eq!(url.prefix, format!("^{}", regex::escape("https/example.com.443")));
        assert_eq!(url.path, "/deal");

        assert!(vanity_definition("   ").is_none());
        assert!(vanity_definition("http://").is_none());
        assert!(vanity_definition("/a b").is_none());
    }

    #[test]
    fn test_synchronous_initialization() {
        let store = store();
        let index = index_with(&store, sync_config());
        assert!(index.is_ready());
        // two values on /content/page, one each on doc and moved
        assert_eq!(index.entry_count(), 8);

        let promo = index.lookup("/promo").unwrap();
        assert_eq!(promo.len(), 2);
        assert!(promo.iter().all(|e| e.is_internal()));
        let exact = promo.iter().find(|e| e.pattern().ends_with('$')).unwrap();
        assert_eq!(exact.replace("http/localhost.80/promo"), Some(vec!["/content/page.html".to_string()]));
        let ext = promo.iter().find(|e| !e.pattern().ends_with('$')).unwrap();
        assert_eq!(ext.replace("http/localhost.80/promo.json"), Some(vec!["/content/page.json".to_string()]));

        assert_eq!(index.lookup("/offers").unwrap().len(), 2);
        assert!(index.lookup("/system").unwrap().is_empty());
    }

    #[test]
    fn test_redirect_status_and_content_target() {
        let store = store();
        let index = index_with(&store, sync_config());

        let doc = index.lookup("/doc").unwrap();
        assert!(doc.iter().all(|e| e.status() == Some(302)));
        let ext = doc.iter().find(|e| e.pattern().ends_with("\\.pdf")).unwrap();
        assert_eq!(ext.redirects(), ["/content/doc.pdf"]);

        let old = index.lookup("/old").unwrap();
        assert!(old.iter().all(|e| e.status() == Some(301)));

        let mappings = index.vanity_path_mappings();
        assert_eq!(mappings.get("/content/doc.pdf"), Some(&vec!["/doc".to_string()]));
        assert_eq!(
            mappings.get("/content/page"),
            Some(&vec!["/promo".to_string(), "/offers".to_string()])
        );
    }

    #[test]
    fn test_bloom_filter_knows_every_vanity_path() {
        let store = store();
        let index = index_with(&store, sync_config());
        for key in ["/promo", "/offers", "/doc", "/old"] {
            assert!(index.probably_contains(key), "{} missing", key);
        }
        let before = store.query_count();
        assert!(index.lookup("/never-registered-anywhere").unwrap().is_empty());
        assert_eq!(store.query_count(), before);
    }

    #[test]
    fn test_capacity_refuses_but_query_still_answers() {
        let store = store();
        let config = VanityConfig {
            max_cached_entries: 2,
            ..sync_config()
        };
        let index = index_with(&store, config);
        assert_eq!(index.entry_count(), 2);
        assert!(index.is_overflowed());

        for key in ["/promo", "/offers", "/doc", "/old"] {
            assert!(index.probably_contains(key));
        }
        for key in ["/promo", "/offers", "/doc", "/old"] {
            assert_eq!(index.lookup(key).unwrap().len(), 2, "{} not resolvable", key);
        }
    }

    #[test]
    fn test_capacity_query_finds_url_values() {
        let store = Arc::new(
            MemoryStore::from_json(
                r#"{
                    "/content/a": {"sling:vanityPath": "/first"},
                    "/content/b": {"sling:vanityPath": "http://localhost:8080/deal.html"},
                    "/content/c": {"sling:vanityPath": "http://example.com/deal/more"}
                }"#,
            )
            .unwrap(),
        );
        let config = VanityConfig {
            max_cached_entries: 2,
            ..sync_config()
        };
        let index = index_with(&store, config);
        assert!(index.is_overflowed());

        let deal = index.lookup("/deal").unwrap();
        assert_eq!(deal.len(), 2);
        let exact = deal.iter().find(|e| e.pattern().ends_with('$')).unwrap();
        assert_eq!(
            exact.replace("http/localhost.8080/deal"),
            Some(vec!["/content/b.html".to_string()])
        );
        assert_eq!(exact.replace("http/localhost.80/deal"), None);
    }

    #[test]
    fn test_change_handling() {
        let store = store();
        let index = index_with(&store, sync_config());

        store.set_property("/content/page", "sling:vanityPath", "/fresh");
        assert!(index.handle_change(&ResourceChange::changed("/content/page")));
        assert!(index.lookup("/promo").unwrap().is_empty());
        assert_eq!(index.lookup("/fresh").unwrap().len(), 2);
        assert_eq!(index.entry_count(), 6);

        store.remove("/content/doc.pdf");
        assert!(index.handle_change(&ResourceChange::removed("/content/doc.pdf")));
        assert!(index.lookup("/doc").unwrap().is_empty());
        assert_eq!(index.entry_count(), 4);
    }

    #[test]
    fn test_prefix_rules() {
        let store = store();
        let config = VanityConfig {
            allowed_prefixes: vec!["/content".into()],
            denied_prefixes: vec!["/content/moved".into()],
            ..sync_config()
        };
        let index = index_with(&store, config);
        assert!(!index.lookup("/promo").unwrap().is_empty());
        assert!(index.lookup("/old").unwrap().is_empty());
    }

    #[test]
    fn test_disabled_index() {
        let store = store();
        let config = VanityConfig {
            enabled: false,
            ..sync_config()
        };
        let index = index_with(&store, config);
        assert!(index.is_ready());
        assert!(index.lookup("/promo").unwrap().is_empty());
        assert!(!index.handle_change(&ResourceChange::added("/content/page")));
    }

    #[test]
    fn test_failed_scan_serves_through_queries() {
        let store = store();
        store.set_range_queries(false);
        let index = index_with(&store, sync_config());
        assert!(index.is_ready());
        assert!(index.is_overflowed());
        assert_eq!(index.entry_count(), 0);
        assert_eq!(index.lookup("/promo").unwrap().len(), 2);
    }
}

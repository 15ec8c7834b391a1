//! Shared fixtures for integration tests.

#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

use resource_resolver::config::ResolverConfig;
use resource_resolver::mapping::MappingTable;
use resource_resolver::store::{
    MemoryStore, PropertyValue, QueryResult, Resource, ResourceStore, Statement, ValueMap,
};
use resource_resolver::store::ResourceIter;
use resource_resolver::Resolver;

/// Builder for a content tree plus resolver configuration.
pub struct Fixture {
    store: MemoryStore,
    config: ResolverConfig,
}

impl Fixture {
    /// Empty tree, synchronous vanity initialization.
    pub fn new() -> Self {
        let mut config = ResolverConfig::default();
        config.vanity.background_init = false;
        Self {
            store: MemoryStore::new(),
            config,
        }
    }

    pub fn node(self, path: &str, props: &[(&str, PropertyValue)]) -> Self {
        let props: ValueMap = props.iter().cloned().collect();
        self.store.put(path, props);
        self
    }

    pub fn configure(mut self, f: impl FnOnce(&mut ResolverConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Initialize a mapping table and resolver over the tree.
    pub fn build(self) -> (Arc<MemoryStore>, Arc<MappingTable>, Resolver) {
        let store = Arc::new(self.store);
        let (table, resolver) = build_over(store.clone(), self.config);
        (store, table, resolver)
    }

    pub fn into_parts(self) -> (MemoryStore, ResolverConfig) {
        (self.store, self.config)
    }
}

pub fn build_over(
    store: Arc<dyn ResourceStore>,
    config: ResolverConfig,
) -> (Arc<MappingTable>, Resolver) {
    let table = Arc::new(MappingTable::new(store, Arc::new(config)));
    table.initialize();
    let resolver = Resolver::new(Arc::clone(&table));
    (table, resolver)
}

type Hook = Box<dyn FnOnce() + Send>;

/// Store whose range scans over one property block until the gate opens.
///
/// A hook set with [`GatedStore::after_next_match`] runs once, after the next
/// equality query has collected its results.
pub struct GatedStore {
    pub inner: MemoryStore,
    property: String,
    open: Mutex<bool>,
    opened: Condvar,
    after_match: Mutex<Option<Hook>>,
}

impl GatedStore {
    pub fn new(inner: MemoryStore, property: &str) -> Self {
        Self {
            inner,
            property: property.to_string(),
            open: Mutex::new(false),
            opened: Condvar::new(),
            after_match: Mutex::new(None),
        }
    }

    pub fn after_next_match(&self, hook: impl FnOnce() + Send + 'static) {
        *self.after_match.lock() = Some(Box::new(hook));
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }
}

impl ResourceStore for GatedStore {
    fn get_resource(&self, path: &str) -> Option<Resource> {
        self.inner.get_resource(path)
    }

    fn list_children(&self, parent: &str) -> Vec<Resource> {
        self.inner.list_children(parent)
    }

    fn find_resources(&self, query: &str, language: &str) -> QueryResult<ResourceIter<'_>> {
        match query.parse::<Statement>() {
            Ok(Statement::FirstValueRange { property, .. }) if property == self.property => {
                self.wait();
            }
            Ok(Statement::AnyValueMatches { .. }) => {
                let results: Vec<Resource> = self.inner.find_resources(query, language)?.collect();
                let hook = self.after_match.lock().take();
                if let Some(hook) = hook {
                    hook();
                }
                return Ok(Box::new(results.into_iter()));
            }
            _ => {}
        }
        self.inner.find_resources(query, language)
    }
}

//! Paged scan over a property-ordered query.
//!
//! # Responsibilities
//! - Issue `FIRST([p]) >= $start` queries in windows of `page_size` records
//! - Skip records re-fetched across a page boundary
//! - Verify that the store honours the promised ascending order
//!
//! # Design Decisions
//! - A page ends after `page_size` emitted records; the next query starts
//!   at the last emitted key and skips the records of that key already seen
//! - A key run wider than `page_size * 10` raises a non-fatal warning
//! - Ordering violations end the scan with `QueryImplementation`

use std::time::Instant;

use crate::error::{MappingError, MappingResult};
use crate::store::query::{quote_literal, SQL2, START_PLACEHOLDER};
use crate::store::{Resource, ResourceIter, ResourceStore};

const WIDE_RUN_FACTOR: usize = 10;

/// Lazy iterator over every record of a paged query.
pub struct PagedQuery<'a> {
    store: &'a dyn ResourceStore,
    subject: &'static str,
    property: String,
    template: String,
    page_size: usize,

    current: Option<ResourceIter<'a>>,
    page: usize,
    page_emitted: usize,
    last_key: String,
    last_key_emitted: usize,
    skip_remaining: usize,
    warning: Option<String>,
    page_started: Instant,
    done: bool,
}

impl<'a> PagedQuery<'a> {
    /// Start a scan. `template` must contain [`START_PLACEHOLDER`].
    pub fn new(
        store: &'a dyn ResourceStore,
        subject: &'static str,
        property: &str,
        template: String,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            subject,
            property: property.to_string(),
            template,
            page_size: page_size.max(1),
            current: None,
            page: 0,
            page_emitted: 0,
            last_key: String::new(),
            last_key_emitted: 0,
            skip_remaining: 0,
            warning: None,
            page_started: Instant::now(),
            done: false,
        }
    }

    /// Warning about an unusually wide run of equal keys, if any was seen.
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Number of queries issued so far.
    pub fn pages(&self) -> usize {
        self.page
    }

    fn next_page(&mut self) -> MappingResult<()> {
        if self.page > 0 {
            tracing::debug!(
                subject = self.subject,
                page = self.page,
                elapsed_ms = self.page_started.elapsed().as_millis() as u64,
                "Paged query page finished"
            );
        }
        self.page += 1;
        self.page_emitted = 0;
        self.skip_remaining = self.last_key_emitted;
        self.page_started = Instant::now();

        let query = self
            .template
            .replace(START_PLACEHOLDER, &quote_literal(&self.last_key));
        tracing::debug!(subject = self.subject, page = self.page, query = %query, "Paged query page starting");
        self.current = Some(self.store.find_resources(&query, SQL2)?);
        Ok(())
    }

    fn fail(&mut self, err: MappingError) -> Option<MappingResult<Resource>> {
        self.done = true;
        self.current = None;
        Some(Err(err))
    }
}

impl Iterator for PagedQuery<'_> {
    type Item = MappingResult<Resource>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.current.is_none() || self.page_emitted >= self.page_size {
            if let Err(err) = self.next_page() {
                return self.fail(err);
            }
        }

        loop {
            let resource = match self.current.as_mut().and_then(|it| it.next()) {
                Some(resource) => resource,
                None => {
                    self.done = true;
                    self.current = None;
                    tracing::debug!(subject = self.subject, pages = self.page, "Paged query exhausted");
                    return None;
                }
            };

            let Some(key) = resource.properties().first(&self.property) else {
                tracing::debug!(path = resource.path(), property = %self.property, "Skipping record without sort key");
                continue;
            };

            if key < self.last_key {
                let message = format!(
                    "unexpected query result in page {}, property '{}', got '{}', last value was '{}'",
                    self.page, self.property, key, self.last_key
                );
                tracing::error!(subject = self.subject, %message, "Store broke paged query ordering");
                return self.fail(MappingError::QueryImplementation(message));
            }

            if key == self.last_key {
                if self.skip_remaining > 0 {
                    self.skip_remaining -= 1;
                    continue;
                }
                self.last_key_emitted += 1;
                let limit = self.page_size * WIDE_RUN_FACTOR;
                if self.last_key_emitted > limit && self.warning.is_none() {
                    let message = format!(
                        "more than {} records share the key '{}' of property '{}'; paging degrades",
                        limit, key, self.property
                    );
                    tracing::warn!(subject = self.subject, %message, "Wide key run in paged query");
                    self.warning = Some(message);
                }
            } else {
                self.last_key = key;
                self.last_key_emitted = 1;
                self.skip_remaining = 0;
            }

            self.page_emitted += 1;
            return Some(Ok(resource));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query::{QueryError, QueryResult, Statement};
    use crate::store::{MemoryStore, ValueMap};

    const PROP: &str = "key";

    fn record(path: &str, key: &str) -> Resource {
        let props: ValueMap = vec![(PROP, key)].into_iter().collect();
        Resource::new(path, props)
    }

    /// Store returning a fixed record list, optionally ignoring the start bound.
    struct ScriptedStore {
        records: Vec<Resource>,
        honour_start: bool,
    }

    impl ScriptedStore {
        fn new(keys: &[&str], honour_start: bool) -> Self {
            let records = keys
                .iter()
                .enumerate()
                .map(|(i, k)| record(&format!("/r{}", i), k))
                .collect();
            Self {
                records,
                honour_start,
            }
        }
    }

    impl ResourceStore for ScriptedStore {
        fn get_resource(&self, _path: &str) -> Option<Resource> {
            None
        }

        fn list_children(&self, _parent: &str) -> Vec<Resource> {
            Vec::new()
        }

        fn find_resources(&self, query: &str, _language: &str) -> QueryResult<ResourceIter<'_>> {
            let Statement::FirstValueRange { start, .. } = query.parse::<Statement>()? else {
                return Err(QueryError::Unsupported(query.to_string()));
            };
            let honour = self.honour_start;
            Ok(Box::new(self.records.clone().into_iter().filter(move |r| {
                !honour || r.properties().first(PROP).is_some_and(|k| k >= start)
            })))
        }
    }

    fn keys(query: PagedQuery<'_>) -> MappingResult<Vec<String>> {
        query
            .map(|r| r.map(|res| res.properties().first(PROP).unwrap_or_default()))
            .collect()
    }

    fn scan(store: &dyn ResourceStore, page_size: usize) -> PagedQuery<'_> {
        PagedQuery::new(store, "test", PROP, Statement::range_template(PROP, None), page_size)
    }

    #[test]
    fn test_sorted_keys_for_any_page_size() {
        let store = ScriptedStore::new(&["a", "b", "c"], true);
        for page_size in 1..=5 {
            assert_eq!(keys(scan(&store, page_size)).unwrap(), vec!["a", "b", "c"], "page size {}", page_size);
        }
    }

    #[test]
    fn test_out_of_order_keys_fail() {
        let store = ScriptedStore::new(&["a", "b", "d", "c"], false);
        for page_size in 1..=5 {
            assert!(
                matches!(keys(scan(&store, page_size)), Err(MappingError::QueryImplementation(_))),
                "page size {}",
                page_size
            );
        }
    }

    #[test]
    fn test_duplicate_keys_across_pages() {
        let store = ScriptedStore::new(&["a", "a", "a", "b", "b", "c"], true);
        let mut query = scan(&store, 2);
        let mut seen = Vec::new();
        for item in query.by_ref() {
            seen.push(item.unwrap().path().to_string());
        }
        assert_eq!(seen, vec!["/r0", "/r1", "/r2", "/r3", "/r4", "/r5"]);
        assert!(query.pages() >= 3);
        assert!(query.warning().is_none());
    }

    #[test]
    fn test_wide_run_warning() {
        let many = vec!["x"; 25];
        let store = ScriptedStore::new(&many, true);
        let mut query = scan(&store, 2);
        let count = query.by_ref().filter(|r| r.is_ok()).count();
        assert_eq!(count, 25);
        assert!(query.warning().unwrap().contains("'x'"));
    }

    #[test]
    fn test_query_errors_propagate() {
        let store = MemoryStore::new();
        store.set_range_queries(false);
        let mut query = scan(&store, 10);
        assert!(matches!(
            query.next(),
            Some(Err(MappingError::Query(QueryError::Unsupported(_))))
        ));
        assert!(query.next().is_none());
    }
}

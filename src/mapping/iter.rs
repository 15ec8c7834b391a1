//! Merged iteration over configured and vanity mapping entries.
//!
//! For a request key `/a/b/c.html` the vanity lookups run for `/a/b/c`,
//! `/a/b` and `/a`, in that order, while the configured entries are
//! consumed from one pre-sorted list. Both sequences are merged lazily:
//!
//! ```text
//! vanity_precedence = true   → pending vanity entry always first
//! vanity_precedence = false  → configured entry first unless the vanity
//!                              pattern is strictly longer
//! ```

use std::sync::Arc;

use crate::error::MappingResult;
use crate::mapping::entry::MappingEntry;

/// Lazy, single-pass merge of configured and vanity entries.
pub struct MappingEntryIter<F> {
    global: Arc<Vec<Arc<MappingEntry>>>,
    global_pos: usize,
    lookup: F,
    key: Option<String>,
    vanity: std::vec::IntoIter<Arc<MappingEntry>>,
    next_global: Option<Arc<MappingEntry>>,
    next_vanity: Option<Arc<MappingEntry>>,
    vanity_precedence: bool,
    failed: bool,
}

impl<F> MappingEntryIter<F>
where
    F: FnMut(&str) -> MappingResult<Vec<Arc<MappingEntry>>>,
{
    /// `key` is the absolute path part of the request; `None` iterates the
    /// configured entries only.
    pub fn new(
        key: Option<&str>,
        global: Arc<Vec<Arc<MappingEntry>>>,
        lookup: F,
        vanity_precedence: bool,
    ) -> Self {
        Self {
            global,
            global_pos: 0,
            lookup,
            key: key.map(str::to_string),
            vanity: Vec::new().into_iter(),
            next_global: None,
            next_vanity: None,
            vanity_precedence,
            failed: false,
        }
    }

    fn fill_global(&mut self) {
        if self.next_global.is_none() && self.global_pos < self.global.len() {
            self.next_global = Some(Arc::clone(&self.global[self.global_pos]));
            self.global_pos += 1;
        }
    }

    fn fill_vanity(&mut self) -> MappingResult<()> {
        if self.next_vanity.is_some() {
            return Ok(());
        }
        loop {
            if let Some(entry) = self.vanity.next() {
                self.next_vanity = Some(entry);
                return Ok(());
            }
            let Some(mut key) = self.key.take() else {
                return Ok(());
            };

            let last_slash = key.rfind('/').unwrap_or(0);
            if let Some(dot) = key[last_slash..].find('.') {
                key.truncate(last_slash + dot);
            }
            self.vanity = (self.lookup)(&key)?.into_iter();

            self.key = match key.rfind('/') {
                Some(0) | None => None,
                Some(idx) => Some(key[..idx].to_string()),
            };
        }
    }
}

impl<F> Iterator for MappingEntryIter<F>
where
    F: FnMut(&str) -> MappingResult<Vec<Arc<MappingEntry>>>,
{
    type Item = MappingResult<Arc<MappingEntry>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.fill_global();
        if let Err(err) = self.fill_vanity() {
            self.failed = true;
            return Some(Err(err));
        }

        let take_vanity = match (&self.next_global, &self.next_vanity) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(_), Some(_)) if self.vanity_precedence => true,
            (Some(global), Some(vanity)) => global.pattern().len() < vanity.pattern().len(),
        };
        let next = if take_vanity {
            self.next_vanity.take()
        } else {
            self.next_global.take()
        };
        next.map(Ok)
    }
}

//! Path resolution and reverse mapping.
//!
//! # Data Flow
//! ```text
//! resolve("/a/b.html", ctx)
//!     → key "http/localhost.80/a/b.html"
//!     → mapping chain: first matching entry of MappingTable::resolve_entries
//!         external entry       → Resolution::Redirect
//!         internal, URL value  → rebuild key, next iteration (max 100)
//!         internal, path value → candidate real paths
//!         no match             → the request path
//!     → tree resolution per candidate:
//!         direct lookup, cutting at the last '.' each round
//!         segment walk from the root, exact name then alias
//!     → Resolution::Found | Resolution::NonExisting
//!
//! map("/content/page.html", ctx)
//!     → tree resolution of the path (path info kept aside)
//!     → alias variants + vanity paths + the path itself
//!     → first matching reverse map entry per variant
//!     → URLs on the request's own host collapse to their path
//! ```

use serde::Serialize;
use std::sync::Arc;
use url::Url;

use crate::error::ResolveError;
use crate::mapping::MappingTable;
use crate::observability::metrics;
use crate::store::resource::child_path;
use crate::store::Resource;

/// Upper bound on internal mapping hops for one request.
pub const MAX_MAPPING_ITERATIONS: usize = 100;

/// Scheme, host and port a request arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    scheme: String,
    host: String,
    port: u16,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new("http", "localhost", 80)
    }
}

impl RequestContext {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Context of an absolute URL, with the scheme's default port if none is given.
    pub fn from_url(value: &str) -> Option<Self> {
        let url = Url::parse(value).ok()?;
        Some(Self::new(
            url.scheme(),
            url.host_str()?,
            url.port_or_known_default()?,
        ))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Lookup key prefix, `scheme/host.port`.
    fn key_prefix(&self) -> String {
        format!("{}/{}.{}", self.scheme, self.host, self.port)
    }
}

/// Outcome of [`Resolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// A resource exists for the request.
    Found {
        /// Path of the resource.
        path: String,
        /// Part of the request that addressed the resource.
        resolution_path: String,
        /// Unmatched remainder: selectors, extension, suffix.
        path_info: Option<String>,
    },
    /// The mapping chain ended in an external redirect.
    Redirect {
        path: String,
        target: String,
        status: u16,
    },
    /// Nothing exists; carries the attempted path.
    NonExisting {
        path: String,
        path_info: Option<String>,
    },
}

impl Resolution {
    fn outcome(&self) -> &'static str {
        match self {
            Resolution::Found { .. } => "found",
            Resolution::Redirect { .. } => "redirect",
            Resolution::NonExisting { .. } => "not_found",
        }
    }

    fn non_existing(path: &str) -> Self {
        Resolution::NonExisting {
            path: path.to_string(),
            path_info: path.find('.').map(|dot| path[dot..].to_string()),
        }
    }
}

/// Resolves request paths against a [`MappingTable`] and its store.
#[derive(Clone)]
pub struct Resolver {
    table: Arc<MappingTable>,
}

impl Resolver {
    pub fn new(table: Arc<MappingTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// Resolve a request path to a resource, a redirect or a non-existing marker.
    pub fn resolve(&self, path: &str, context: Option<&RequestContext>) -> Result<Resolution, ResolveError> {
        let context = context.cloned().unwrap_or_default();
        let request_path = absolute(path);
        let resolution = self.resolve_with(&request_path, &context)?;
        metrics::record_resolve(resolution.outcome());
        tracing::debug!(
            path = %request_path,
            outcome = resolution.outcome(),
            "Resolved request path"
        );
        Ok(resolution)
    }

    fn resolve_with(&self, request_path: &str, context: &RequestContext) -> Result<Resolution, ResolveError> {
        let mut key = format!("{}{}", context.key_prefix(), request_path);
        let mut real_paths = vec![request_path.to_string()];

        let mut iterations = 0;
        loop {
            iterations += 1;
            if iterations > MAX_MAPPING_ITERATIONS {
                tracing::error!(
                    path = %request_path,
                    key = %key,
                    max = MAX_MAPPING_ITERATIONS,
                    "Mapping chain too long, possible cycle in mapping configuration"
                );
                metrics::record_mapping_chain_aborted();
                return Ok(Resolution::non_existing(request_path));
            }

            let mut matched = None;
            for entry in self.table.resolve_entries(&key) {
                let entry = entry?;
                if let Some(values) = entry.replace(&key) {
                    matched = Some((entry, values));
                    break;
                }
            }
            let Some((entry, values)) = matched else {
                break;
            };
            let Some(first) = values.first() else {
                break;
            };

            if let Some(status) = entry.status() {
                return Ok(Resolution::Redirect {
                    path: request_path.to_string(),
                    target: first.clone(),
                    status,
                });
            }

            if first.contains("://") {
                match url_to_key(first) {
                    Some(next) => {
                        tracing::trace!(from = %key, to = %next, "Following internal mapping");
                        key = next;
                        continue;
                    }
                    None => {
                        tracing::warn!(redirect = %first, pattern = entry.pattern(), "Invalid mapping target");
                        return Ok(Resolution::non_existing(request_path));
                    }
                }
            }
            real_paths = values;
            break;
        }

        for real_path in &real_paths {
            if let Some(found) = self.resolve_in_tree(&absolute(real_path)) {
                return Ok(found);
            }
        }
        Ok(Resolution::non_existing(&absolute(&real_paths[0])))
    }

    /// Find the resource for an absolute path inside the tree, honouring aliases.
    fn resolve_in_tree(&self, path: &str) -> Option<Resolution> {
        let path = trim_trailing_slash(path);
        let store = self.table.store();

        let mut current = path;
        loop {
            if let Some(resource) = store.get_resource(current) {
                return Some(found(&resource, current, &path[current.len()..]));
            }
            match current.rfind('.') {
                Some(dot) if dot > 0 => current = &current[..dot],
                _ => break,
            }
        }

        let mut resource = store.get_resource("/")?;
        let mut resolution_path = String::new();
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        while let Some(raw) = segments.next() {
            if let Some(next) = self.child(&resource, raw) {
                resource = next;
                resolution_path.push('/');
                resolution_path.push_str(raw);
                continue;
            }

            let mut name = raw;
            let mut next = None;
            while let Some(dot) = name.rfind('.') {
                name = &name[..dot];
                next = self.child(&resource, name);
                if next.is_some() {
                    break;
                }
            }
            resource = next?;
            resolution_path.push('/');
            resolution_path.push_str(name);

            let mut info = raw[name.len()..].to_string();
            for rest in segments.by_ref() {
                info.push('/');
                info.push_str(rest);
            }
            return Some(found(&resource, &resolution_path, &info));
        }
        if resolution_path.is_empty() {
            resolution_path.push('/');
        }
        Some(found(&resource, &resolution_path, ""))
    }

    /// Child of `parent` by exact name, then by alias.
    fn child(&self, parent: &Resource, name: &str) -> Option<Resource> {
        let store = self.table.store();
        if let Some(child) = store.get_resource(&child_path(parent.path(), name)) {
            return Some(child);
        }
        let real = self.table.aliases().find_child(parent.path(), name)?;
        store.get_resource(&child_path(parent.path(), &real))
    }

    /// Preferred external form of a resource path.
    pub fn map(&self, path: &str, context: Option<&RequestContext>) -> String {
        self.all_mappings(path, context)
            .into_iter()
            .next()
            .unwrap_or_else(|| path.to_string())
    }

    /// Every external form of a resource path, most preferred first.
    pub fn all_mappings(&self, path: &str, context: Option<&RequestContext>) -> Vec<String> {
        let context = context.cloned().unwrap_or_default();
        let split = path.find(['?', '#']).unwrap_or(path.len());
        let (path, trailer) = path.split_at(split);
        let path = absolute(path);

        let (resource_path, path_info) = match self.resolve_in_tree(&path) {
            Some(Resolution::Found {
                path: resource_path,
                path_info,
                ..
            }) => (resource_path, path_info.unwrap_or_default()),
            _ => (path.clone(), String::new()),
        };

        let mut candidates = self.alias_variants(&resource_path);
        let original = candidates.pop();
        if self.table.config().mapping.map_vanity_paths {
            candidates.extend(self.table.vanity().vanity_paths_for(&resource_path));
        }
        candidates.extend(original);

        let map_entries = self.table.map_entries();
        let mut mappings: Vec<String> = Vec::new();
        for candidate in candidates {
            let mut mapped = None;
            for entry in &map_entries {
                mapped = entry.replace(&candidate).or_else(|| {
                    (!candidate.ends_with('/'))
                        .then(|| entry.replace(&format!("{}/", candidate)))
                        .flatten()
                });
                if mapped.is_some() {
                    break;
                }
            }
            let mapped = mapped
                .and_then(|values| values.into_iter().next())
                .unwrap_or(candidate);
            let mapped = format!("{}{}{}", collapse(&mapped, &context), path_info, trailer);
            if !mappings.contains(&mapped) {
                mappings.push(mapped);
            }
        }
        mappings
    }

    /// Alias spellings of `path`, most aliased first, `path` itself last.
    fn alias_variants(&self, path: &str) -> Vec<String> {
        let mut variants: Vec<(usize, String)> = vec![(0, String::new())];
        let mut current = String::from("/");
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let aliases = self
                .table
                .alias_map(&current)
                .remove(segment)
                .unwrap_or_default();
            let mut next = Vec::with_capacity(variants.len() * (aliases.len() + 1));
            for (count, prefix) in &variants {
                for alias in &aliases {
                    next.push((count + 1, format!("{}/{}", prefix, alias)));
                }
                next.push((*count, format!("{}/{}", prefix, segment)));
            }
            variants = next;
            current = child_path(&current, segment);
        }

        variants.sort_by(|a, b| b.0.cmp(&a.0));
        variants
            .into_iter()
            .map(|(_, p)| if p.is_empty() { "/".to_string() } else { p })
            .collect()
    }
}

fn found(resource: &Resource, resolution_path: &str, path_info: &str) -> Resolution {
    Resolution::Found {
        path: resource.path().to_string(),
        resolution_path: resolution_path.to_string(),
        path_info: (!path_info.is_empty()).then(|| path_info.to_string()),
    }
}

fn absolute(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// `scheme://host[:port]/path` to `scheme/host.port/path`.
fn url_to_key(value: &str) -> Option<String> {
    let url = Url::parse(value).ok()?;
    Some(format!(
        "{}/{}.{}{}",
        url.scheme(),
        url.host_str()?,
        url.port_or_known_default()?,
        url.path()
    ))
}

/// Drop scheme, host and port from URLs that point at the request's own host.
fn collapse(mapped: &str, context: &RequestContext) -> String {
    if !mapped.contains("://") {
        return mapped.to_string();
    }
    match RequestContext::from_url(mapped) {
        Some(target) if target == *context => {
            let path = Url::parse(mapped)
                .map(|url| url.path().to_string())
                .unwrap_or_default();
            if path.is_empty() {
                "/".to_string()
            } else {
                path
            }
        }
        _ => mapped.to_string(),
    }
}

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the resolver.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the resource resolver.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResolverConfig {
    /// Listener configuration for the inspection surface.
    pub listener: ListenerConfig,

    /// Mapping table settings.
    pub mapping: MappingConfig,

    /// Alias index settings.
    pub alias: AliasConfig,

    /// Vanity path index settings.
    pub vanity: VanityConfig,

    /// Property names of the configured mapping tree.
    pub configured_tree: ConfiguredTreeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Content fixture backing the binary's in-memory store.
    pub content: ContentConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Mapping table configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Root of the configured mapping tree.
    pub map_root: String,

    /// Vanity entries always win over configured entries of the same key.
    pub vanity_path_precedence: bool,

    /// Subtree that never contributes aliases or vanity paths.
    pub excluded_prefix: String,

    /// Offer vanity paths as reverse mappings.
    pub map_vanity_paths: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            map_root: "/etc/map".to_string(),
            vanity_path_precedence: false,
            excluded_prefix: "/jcr:system".to_string(),
            map_vanity_paths: false,
        }
    }
}

/// Alias index configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AliasConfig {
    /// Pre-build the alias index instead of reading the store per request.
    pub optimized: bool,

    /// Alias property name.
    pub property: String,

    /// Name of the content child whose aliases belong to its parent.
    pub content_node: String,

    /// Records per page of the initial scan.
    pub page_size: usize,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            optimized: true,
            property: "sling:alias".to_string(),
            content_node: "jcr:content".to_string(),
            page_size: 2000,
        }
    }
}

/// Vanity path index configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VanityConfig {
    /// Enable vanity path handling.
    pub enabled: bool,

    /// Vanity path property name.
    pub property: String,

    /// Boolean property turning a vanity path into an external redirect.
    pub redirect_property: String,

    /// Redirect status property.
    pub status_property: String,

    /// Ordering property; higher values win among equal patterns.
    pub order_property: String,

    /// Status used for redirects without an explicit status.
    pub default_redirect_status: u16,

    /// Maximum number of cached resolve entries (<= 0 means unlimited).
    pub max_cached_entries: i64,

    /// Byte budget of the bloom filter.
    pub bloom_filter_max_bytes: usize,

    /// Populate the index on a background task.
    pub background_init: bool,

    /// Records per page of the initial scan.
    pub page_size: usize,

    /// Only resources below these prefixes contribute (empty means all).
    pub allowed_prefixes: Vec<String>,

    /// Resources below these prefixes never contribute.
    pub denied_prefixes: Vec<String>,
}

impl Default for VanityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            property: "sling:vanityPath".to_string(),
            redirect_property: "sling:redirect".to_string(),
            status_property: "sling:redirectStatus".to_string(),
            order_property: "sling:vanityOrder".to_string(),
            default_redirect_status: 302,
            max_cached_entries: -1,
            bloom_filter_max_bytes: 1_024_000,
            background_init: true,
            page_size: 2000,
            allowed_prefixes: Vec::new(),
            denied_prefixes: Vec::new(),
        }
    }
}

/// Property names read from nodes of the configured mapping tree.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfiguredTreeConfig {
    /// Explicit match pattern replacing the node name.
    pub match_property: String,

    /// Internal redirect targets (multi-valued).
    pub internal_redirect_property: String,

    /// External redirect target.
    pub redirect_property: String,

    /// Status of the external redirect.
    pub status_property: String,
}

impl Default for ConfiguredTreeConfig {
    fn default() -> Self {
        Self {
            match_property: "sling:match".to_string(),
            internal_redirect_property: "sling:internalRedirect".to_string(),
            redirect_property: "sling:redirect".to_string(),
            status_property: "sling:redirectStatus".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Content fixture configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ContentConfig {
    /// JSON tree loaded into the in-memory store.
    pub fixture_path: Option<PathBuf>,

    /// Reload the fixture when it changes on disk.
    pub watch: bool,
}

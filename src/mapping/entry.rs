//! Mapping entries.
//!
//! # Responsibilities
//! - Hold one compiled rewrite rule: anchored pattern, redirect templates,
//!   internal/external flag and ordering weight
//! - Order entries by specificity (longer pattern first)
//! - Build resolve and reverse map entries from nodes of the configured tree
//!
//! # Design Decisions
//! - Entries are immutable; a changed source node produces new entries
//! - `status == None` marks an internal entry (continuation inside the tree)
//! - Redirect templates use `$n` group references; they are rewritten to
//!   `${n}` once at construction so that `$1abc` keeps meaning group 1

use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::LazyLock;

use crate::config::ConfiguredTreeConfig;
use crate::error::{MappingError, MappingResult};
use crate::store::ValueMap;

/// Status of an external redirect without an explicit status property.
pub const DEFAULT_REDIRECT_STATUS: u16 = 302;

/// Pattern prefix matching any `scheme/host.port` lookup key.
pub const ANY_SCHEME_HOST: &str = "[^/]+/[^/]+";

static GROUP_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+)").expect("group reference regex is valid"));

static HOST_PORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?)/([^/]+)(/.*)?$").expect("host regex is valid"));

static PORT_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\d+$").expect("port suffix regex is valid"));

/// Lookup-key to URI rewrites, tried in order.
static PATH_TO_URI: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"^http/([^/]+)\.80(/.*)?$", "http://${1}${2}"),
        (r"^https/([^/]+)\.443(/.*)?$", "https://${1}${2}"),
        (r"^([^/]+)/([^/]+)\.(\d+)(/.*)?$", "${1}://${2}:${3}${4}"),
        (r"^([^/]+)/([^/]+)(/.*)?$", "${1}://${2}${3}"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("uri rewrite regex is valid"),
            replacement,
        )
    })
    .collect()
});

/// One rewrite rule.
#[derive(Debug, Clone)]
pub struct MappingEntry {
    pattern: Regex,
    redirects: Vec<String>,
    templates: Vec<String>,
    status: Option<u16>,
    order: i64,
}

impl MappingEntry {
    /// Compile an entry.
    ///
    /// The pattern is anchored with `^` when it is not already. With
    /// `trailing_slash`, every redirect is given a trailing `/`.
    pub fn new(
        pattern: &str,
        redirects: Vec<String>,
        status: Option<u16>,
        order: i64,
        trailing_slash: bool,
    ) -> MappingResult<Self> {
        let anchored = if pattern.starts_with('^') {
            pattern.to_string()
        } else {
            format!("^{}", pattern)
        };
        let compiled = Regex::new(&anchored).map_err(|e| MappingError::InvalidPattern {
            pattern: anchored.clone(),
            reason: e.to_string(),
        })?;

        let redirects: Vec<String> = redirects
            .into_iter()
            .map(|r| {
                if trailing_slash && !r.ends_with('/') {
                    format!("{}/", r)
                } else {
                    r
                }
            })
            .collect();
        let templates = redirects
            .iter()
            .map(|r| GROUP_REF_RE.replace_all(r, "$${${1}}").into_owned())
            .collect();

        Ok(Self {
            pattern: compiled,
            redirects,
            templates,
            status,
            order,
        })
    }

    /// Internal entry (continuation inside the tree).
    pub fn internal(pattern: &str, redirects: Vec<String>) -> MappingResult<Self> {
        Self::new(pattern, redirects, None, 0, false)
    }

    /// External redirect entry.
    pub fn external(pattern: &str, redirect: &str, status: u16) -> MappingResult<Self> {
        Self::new(pattern, vec![redirect.to_string()], Some(status), 0, false)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn redirects(&self) -> &[String] {
        &self.redirects
    }

    /// Redirect status; `None` for internal entries.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_internal(&self) -> bool {
        self.status.is_none()
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn matches(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }

    /// Apply every redirect template to the first match in `value`.
    ///
    /// Text outside the match is kept, so `^/a/` with redirect `/b/`
    /// turns `/a/x` into `/b/x`. Returns `None` when the pattern does not
    /// match.
    pub fn replace(&self, value: &str) -> Option<Vec<String>> {
        if !self.pattern.is_match(value) {
            return None;
        }
        Some(
            self.templates
                .iter()
                .map(|t| self.pattern.replacen(value, 1, t.as_str()).into_owned())
                .collect(),
        )
    }

    /// Specificity order: longer patterns first, then lexicographic,
    /// then higher `order` first.
    pub fn precedence(&self, other: &Self) -> Ordering {
        let (mine, theirs) = (self.pattern(), other.pattern());
        theirs
            .len()
            .cmp(&mine.len())
            .then_with(|| mine.cmp(theirs))
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialEq for MappingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.pattern() == other.pattern()
            && self.redirects == other.redirects
            && self.status == other.status
            && self.order == other.order
    }
}

impl Eq for MappingEntry {}

/// Sort a list of entries by [`MappingEntry::precedence`].
pub fn sort_entries<T: AsRef<MappingEntry>>(entries: &mut [T]) {
    entries.sort_by(|a, b| a.as_ref().precedence(b.as_ref()));
}

impl AsRef<MappingEntry> for MappingEntry {
    fn as_ref(&self) -> &MappingEntry {
        self
    }
}

/// Serializable view of an entry for inspection endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub pattern: String,
    pub redirects: Vec<String>,
    pub status: Option<u16>,
    pub internal: bool,
}

impl From<&MappingEntry> for EntrySummary {
    fn from(entry: &MappingEntry) -> Self {
        Self {
            pattern: entry.pattern().to_string(),
            redirects: entry.redirects.clone(),
            status: entry.status,
            internal: entry.is_internal(),
        }
    }
}

/// True when `value` contains characters with regex meaning.
pub fn is_regex(value: &str) -> bool {
    value
        .chars()
        .any(|c| matches!(c, '(' | ')' | '[' | ']' | '\\' | '*' | '+' | '?' | '|' | '{' | '}' | '^' | '$'))
}

/// Give an `http/host` or `https/host` key its default port.
///
/// `http/example.com/x` becomes `http/example.com.80/x`; keys that
/// already carry a port or use regex in the host are left untouched.
pub fn fix_uri_path(path: &str) -> String {
    let Some(caps) = HOST_PORT_RE.captures(path) else {
        return path.to_string();
    };
    let host = &caps[2];
    if is_regex(host) || PORT_SUFFIX_RE.is_match(host) {
        return path.to_string();
    }
    let port = if &caps[1] == "https" { 443 } else { 80 };
    format!(
        "{}/{}.{}{}",
        &caps[1],
        host,
        port,
        caps.get(3).map_or("", |m| m.as_str())
    )
}

/// Convert a `scheme/host.port/path` key into a URI.
///
/// Default ports are dropped: `http/localhost.80/` becomes
/// `http://localhost/`, `http/localhost.8080/` becomes
/// `http://localhost:8080/`.
pub fn to_uri(path: &str) -> Option<String> {
    PATH_TO_URI.iter().find_map(|(re, replacement)| {
        re.is_match(path)
            .then(|| re.replace(path, *replacement).into_owned())
    })
}

/// Resolve entry for a node of the configured tree.
///
/// `url` is the node's accumulated match pattern. An external redirect
/// property wins over internal redirects. Returns `Ok(None)` for nodes
/// that only structure the tree.
pub fn resolve_entry(
    url: &str,
    props: &ValueMap,
    names: &ConfiguredTreeConfig,
    trailing_slash: bool,
) -> MappingResult<Option<MappingEntry>> {
    let url = fix_uri_path(url);
    if let Some(redirect) = props.first(&names.redirect_property) {
        let status = props
            .long(&names.status_property)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(DEFAULT_REDIRECT_STATUS);
        return MappingEntry::new(&url, vec![redirect], Some(status), 0, trailing_slash).map(Some);
    }

    let internal = props.strings(&names.internal_redirect_property);
    if internal.is_empty() {
        return Ok(None);
    }
    MappingEntry::new(&url, internal, None, 0, trailing_slash).map(Some)
}

/// Reverse map entries `(pattern, target)` for a node of the configured tree.
///
/// Each internal redirect becomes a pattern matching resource paths; the
/// target is the node's url as a URI, or its path when the url only
/// matched any scheme and host. Redirects that are themselves patterns
/// cannot be reversed and are skipped.
pub fn map_entry_targets(url: &str, props: &ValueMap, names: &ConfiguredTreeConfig) -> Vec<(String, String)> {
    let internal = props.strings(&names.internal_redirect_property);
    if internal.is_empty() {
        return Vec::new();
    }

    let mut url = fix_uri_path(url);
    let mut end_hook = "";
    if url.ends_with('$') {
        end_hook = "$";
        url.pop();
    }
    let target = match url.strip_prefix(ANY_SCHEME_HOST) {
        Some(path) => path.to_string(),
        None if is_regex(&url) => return Vec::new(),
        None => match to_uri(&url) {
            Some(uri) => uri,
            None => return Vec::new(),
        },
    };

    internal
        .into_iter()
        .filter(|redirect| !redirect.contains("${") && !is_regex(redirect))
        .map(|redirect| (format!("^{}{}", regex::escape(&redirect), end_hook), target.clone()))
        .collect()
}

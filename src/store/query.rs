//! Query statements understood by the backing store.
//!
//! # Responsibilities
//! - Build the two SQL-like statement shapes the mapping engine issues
//! - Parse them back (used by stores that execute queries in-process)
//! - Quote literals so that property values cannot break out of a statement
//!
//! # Statement shapes
//! ```text
//! SELECT * FROM [nt:base] WHERE [NOT ISDESCENDANTNODE('/x') AND]
//!     [p] IS NOT NULL AND FIRST([p]) >= 'start' ORDER BY FIRST([p])
//!
//! SELECT * FROM [nt:base] WHERE [NOT ISDESCENDANTNODE('/x') AND]
//!     ([p] = 'a' OR [p] LIKE 'a.%') [ORDER BY FIRST([o]) DESC]
//! ```

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Query language identifier for [`Statement`] text.
pub const SQL2: &str = "SQL2";

/// Placeholder substituted by the paged query iterator with a quoted start key.
pub const START_PLACEHOLDER: &str = "$start";

/// Errors raised by a backing store while executing a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The store does not speak the requested language.
    #[error("Unsupported query language: {0}")]
    UnsupportedLanguage(String),

    /// The statement could not be parsed.
    #[error("Query syntax error in '{query}': {reason}")]
    Syntax { query: String, reason: String },

    /// The statement parsed but uses a feature the store cannot execute.
    #[error("Unsupported query operation: {0}")]
    Unsupported(String),

    /// Any other store-side failure.
    #[error("Store error: {0}")]
    Store(String),
}

/// Result type for query execution.
pub type QueryResult<T> = Result<T, QueryError>;

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^SELECT \* FROM \[nt:base\] WHERE ",
        r"(?:NOT ISDESCENDANTNODE\('((?:[^']|'')*)'\) AND )?",
        r"\[([^\]]+)\] IS NOT NULL AND FIRST\(\[([^\]]+)\]\) >= '((?:[^']|'')*)' ",
        r"ORDER BY FIRST\(\[([^\]]+)\]\)$"
    ))
    .expect("range statement regex is valid")
});

static EQUALS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^SELECT \* FROM \[nt:base\] WHERE ",
        r"(?:NOT ISDESCENDANTNODE\('((?:[^']|'')*)'\) AND )?",
        r"\((.+)\)",
        r"(?: ORDER BY FIRST\(\[([^\]]+)\]\) DESC)?$"
    ))
    .expect("equals statement regex is valid")
});

static TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\] (=|LIKE) '((?:[^']|'')*)'").expect("term regex is valid")
});

/// A parsed query statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Resources whose `property` is set and whose first value is `>= start`,
    /// ordered ascending by that first value.
    FirstValueRange {
        property: String,
        start: String,
        exclude: Option<String>,
    },
    /// Resources whose `property` holds any of `values`, or a value matching
    /// any of the `LIKE` `patterns` (`%` any run, `_` any one character).
    AnyValueMatches {
        property: String,
        values: Vec<String>,
        patterns: Vec<String>,
        exclude: Option<String>,
        order_desc_by: Option<String>,
    },
}

impl Statement {
    /// Template for a paged scan over `property`, with [`START_PLACEHOLDER`]
    /// standing in for the quoted start key.
    pub fn range_template(property: &str, exclude: Option<&str>) -> String {
        format!(
            "SELECT * FROM [nt:base] WHERE {}[{p}] IS NOT NULL AND FIRST([{p}]) >= {} ORDER BY FIRST([{p}])",
            exclude_clause(exclude),
            START_PLACEHOLDER,
            p = property,
        )
    }

    pub fn property(&self) -> &str {
        match self {
            Statement::FirstValueRange { property, .. } => property,
            Statement::AnyValueMatches { property, .. } => property,
        }
    }

    pub fn exclude(&self) -> Option<&str> {
        match self {
            Statement::FirstValueRange { exclude, .. } => exclude.as_deref(),
            Statement::AnyValueMatches { exclude, .. } => exclude.as_deref(),
        }
    }
}

fn exclude_clause(exclude: Option<&str>) -> String {
    match exclude {
        Some(path) => format!("NOT ISDESCENDANTNODE({}) AND ", quote_literal(path)),
        None => String::new(),
    }
}

/// Quote a string literal, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Anchored regex source equivalent to a `LIKE` pattern.
pub fn like_to_regex(pattern: &str) -> String {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    source
}

fn unquote(raw: &str) -> String {
    raw.replace("''", "'")
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::FirstValueRange {
                property,
                start,
                exclude,
            } => {
                let template = Statement::range_template(property, exclude.as_deref());
                write!(f, "{}", template.replace(START_PLACEHOLDER, &quote_literal(start)))
            }
            Statement::AnyValueMatches {
                property,
                values,
                patterns,
                exclude,
                order_desc_by,
            } => {
                let terms: Vec<String> = values
                    .iter()
                    .map(|v| format!("[{}] = {}", property, quote_literal(v)))
                    .chain(
                        patterns
                            .iter()
                            .map(|p| format!("[{}] LIKE {}", property, quote_literal(p))),
                    )
                    .collect();
                write!(
                    f,
                    "SELECT * FROM [nt:base] WHERE {}({})",
                    exclude_clause(exclude.as_deref()),
                    terms.join(" OR ")
                )?;
                if let Some(order) = order_desc_by {
                    write!(f, " ORDER BY FIRST([{}]) DESC", order)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Statement {
    type Err = QueryError;

    fn from_str(query: &str) -> Result<Self, Self::Err> {
        let syntax = |reason: &str| QueryError::Syntax {
            query: query.to_string(),
            reason: reason.to_string(),
        };

        if let Some(caps) = RANGE_RE.captures(query) {
            let property = caps[2].to_string();
            if caps[3] != property || caps[5] != property {
                return Err(syntax("range predicate and ordering must use the same property"));
            }
            return Ok(Statement::FirstValueRange {
                property,
                start: unquote(&caps[4]),
                exclude: caps.get(1).map(|m| unquote(m.as_str())),
            });
        }

        if let Some(caps) = EQUALS_RE.captures(query) {
            let inner = &caps[2];
            let mut property: Option<String> = None;
            let mut values = Vec::new();
            let mut patterns = Vec::new();
            let mut rebuilt = Vec::new();
            for term in TERM_RE.captures_iter(inner) {
                let name = term[1].to_string();
                match &property {
                    Some(existing) if *existing != name => {
                        return Err(syntax("equality terms must use a single property"));
                    }
                    Some(_) => {}
                    None => property = Some(name),
                }
                rebuilt.push(term[0].to_string());
                match &term[2] {
                    "=" => values.push(unquote(&term[3])),
                    _ => patterns.push(unquote(&term[3])),
                }
            }
            if rebuilt.join(" OR ") != inner {
                return Err(syntax("malformed equality predicate"));
            }
            let property = property.ok_or_else(|| syntax("empty equality predicate"))?;
            return Ok(Statement::AnyValueMatches {
                property,
                values,
                patterns,
                exclude: caps.get(1).map(|m| unquote(m.as_str())),
                order_desc_by: caps.get(3).map(|m| m.as_str().to_string()),
            });
        }

        Err(syntax("unrecognised statement"))
    }
}

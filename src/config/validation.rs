//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (page sizes > 0, redirect status 3xx)
//! - Check that every configured path is absolute
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResolverConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ResolverConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ResolverConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.alias.page_size == 0 {
        errors.push(ValidationError::new("alias.page_size", "must be positive"));
    }
    if config.vanity.page_size == 0 {
        errors.push(ValidationError::new("vanity.page_size", "must be positive"));
    }
    if !(300..=399).contains(&config.vanity.default_redirect_status) {
        errors.push(ValidationError::new(
            "vanity.default_redirect_status",
            format!("{} is not a redirect status", config.vanity.default_redirect_status),
        ));
    }
    if config.vanity.bloom_filter_max_bytes == 0 {
        errors.push(ValidationError::new(
            "vanity.bloom_filter_max_bytes",
            "must be positive",
        ));
    }

    check_absolute(&mut errors, "mapping.map_root", &config.mapping.map_root);
    check_absolute(
        &mut errors,
        "mapping.excluded_prefix",
        &config.mapping.excluded_prefix,
    );
    for prefix in &config.vanity.allowed_prefixes {
        check_absolute(&mut errors, "vanity.allowed_prefixes", prefix);
    }
    for prefix in &config.vanity.denied_prefixes {
        check_absolute(&mut errors, "vanity.denied_prefixes", prefix);
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_absolute(errors: &mut Vec<ValidationError>, field: &str, path: &str) {
    if !path.starts_with('/') {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not an absolute path", path),
        ));
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, address: &str) {
    if address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a socket address", address),
        ));
    }
}

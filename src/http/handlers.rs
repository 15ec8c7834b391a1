//! Inspection endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::http::server::AppState;
use crate::mapping::{EntrySummary, TableStatus};
use crate::resolver::RequestContext;

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
    /// Absolute URL the request arrived on, e.g. `https://example.com:8443`.
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ParentQuery {
    pub parent: String,
}

#[derive(Serialize)]
pub struct MapResponse {
    pub path: String,
    pub mapped: String,
    pub all: Vec<String>,
}

#[derive(Serialize)]
pub struct EntriesResponse {
    pub resolve: Vec<EntrySummary>,
    pub map: Vec<EntrySummary>,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub table: TableStatus,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn context(url: Option<&str>) -> Result<Option<RequestContext>, Response> {
    match url {
        None => Ok(None),
        Some(url) => RequestContext::from_url(url)
            .map(Some)
            .ok_or_else(|| error(StatusCode::BAD_REQUEST, format!("Invalid request url: {}", url))),
    }
}

pub async fn resolve(State(state): State<AppState>, Query(query): Query<PathQuery>) -> Response {
    let ctx = match context(query.url.as_deref()) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let resolver = state.resolver.clone();
    let path = query.path.clone();
    let resolved = tokio::task::spawn_blocking(move || resolver.resolve(&path, ctx.as_ref())).await;
    match resolved {
        Ok(Ok(resolution)) => Json(resolution).into_response(),
        Ok(Err(e)) => {
            tracing::error!(path = %query.path, error = %e, "Resolution failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            tracing::error!(path = %query.path, error = %e, "Resolution task failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "Resolution task failed")
        }
    }
}

pub async fn map(State(state): State<AppState>, Query(query): Query<PathQuery>) -> Response {
    let ctx = match context(query.url.as_deref()) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let resolver = state.resolver.clone();
    let path = query.path.clone();
    let all = match tokio::task::spawn_blocking(move || resolver.all_mappings(&path, ctx.as_ref())).await {
        Ok(all) => all,
        Err(e) => {
            tracing::error!(path = %query.path, error = %e, "Mapping task failed");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Mapping task failed");
        }
    };
    let mapped = all.first().cloned().unwrap_or_else(|| query.path.clone());
    Json(MapResponse {
        path: query.path,
        mapped,
        all,
    })
    .into_response()
}

pub async fn aliases(
    State(state): State<AppState>,
    Query(query): Query<ParentQuery>,
) -> Json<BTreeMap<String, Vec<String>>> {
    Json(state.resolver.table().alias_map(&query.parent))
}

pub async fn vanity(State(state): State<AppState>) -> Json<BTreeMap<String, Vec<String>>> {
    Json(state.resolver.table().vanity_path_mappings())
}

pub async fn entries(State(state): State<AppState>) -> Json<EntriesResponse> {
    let table = state.resolver.table();
    Json(EntriesResponse {
        resolve: table
            .configured_resolve_entries()
            .iter()
            .map(|e| EntrySummary::from(e.as_ref()))
            .collect(),
        map: table
            .map_entries()
            .iter()
            .map(|e| EntrySummary::from(e.as_ref()))
            .collect(),
    })
}

pub async fn status(State(state): State<AppState>) -> Json<SystemStatus> {
    let table = state.resolver.table().status();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if table.vanity_ready { "ready" } else { "initializing" },
        table,
    })
}

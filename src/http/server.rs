//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the inspection handlers
//! - Wire up middleware (tracing)
//! - Serve on a bound listener until shutdown

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::resolver::Resolver;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Resolver,
}

/// HTTP server exposing resolution and index inspection.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server around a resolver.
    pub fn new(resolver: Resolver) -> Self {
        let router = Self::build_router(AppState { resolver });
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/resolve", get(handlers::resolve))
            .route("/map", get(handlers::map))
            .route("/aliases", get(handlers::aliases))
            .route("/vanity", get(handlers::vanity))
            .route("/entries", get(handlers::entries))
            .route("/status", get(handlers::status))
            .with_state(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Router for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::mapping::MappingTable;
    use crate::store::{MemoryStore, QueryResult, Resource, ResourceIter, ResourceStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let store = Arc::new(
            MemoryStore::from_json(
                r#"{
                    "/content/site/page": {"sling:alias": "seite", "sling:vanityPath": "/promo"},
                    "/etc/map/http/localhost.8080": {"sling:redirect": "/content/simple-node"}
                }"#,
            )
            .unwrap(),
        );
        let mut config = ResolverConfig::default();
        config.vanity.background_init = false;
        let table = MappingTable::new(store, Arc::new(config));
        table.initialize();
        HttpServer::new(Resolver::new(Arc::new(table)))
    }

    async fn get_json(server: &HttpServer, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = server
            .router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_resolve_endpoint() {
        let server = server();
        let (status, body) = get_json(&server, "/resolve?path=/content/site/seite.html").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "found");
        assert_eq!(body["path"], "/content/site/page");
        assert_eq!(body["path_info"], ".html");

        let (_, body) = get_json(&server, "/resolve?path=/x&url=http://localhost:8080").await;
        assert_eq!(body["outcome"], "redirect");
        assert_eq!(body["target"], "/content/simple-node/x");
        assert_eq!(body["status"], 302);
    }

    #[tokio::test]
    async fn test_invalid_context_url() {
        let server = server();
        let (status, body) = get_json(&server, "/resolve?path=/x&url=not-a-url").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not-a-url"));
    }

    #[tokio::test]
    async fn test_map_and_index_endpoints() {
        let server = server();
        let (_, body) = get_json(&server, "/map?path=/content/site/page.html").await;
        assert_eq!(body["mapped"], "/content/site/seite.html");

        let (_, body) = get_json(&server, "/aliases?parent=/content/site").await;
        assert_eq!(body["page"][0], "seite");

        let (_, body) = get_json(&server, "/vanity").await;
        assert_eq!(body["/content/site/page"][0], "/promo");

        let (_, body) = get_json(&server, "/entries").await;
        assert_eq!(body["resolve"][0]["pattern"], "^http/localhost.8080/");
        assert_eq!(body["resolve"][0]["internal"], false);

        let (status, body) = get_json(&server, "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["table"]["vanity_entries"], 2);
    }

    /// Store that panics when read from inside an async task.
    struct BlockingOnlyStore {
        inner: MemoryStore,
        armed: AtomicBool,
    }

    impl ResourceStore for BlockingOnlyStore {
        fn get_resource(&self, path: &str) -> Option<Resource> {
            if self.armed.load(Ordering::Relaxed) {
                tokio::runtime::Handle::current().block_on(async {});
            }
            self.inner.get_resource(path)
        }

        fn list_children(&self, parent: &str) -> Vec<Resource> {
            self.inner.list_children(parent)
        }

        fn find_resources(&self, query: &str, language: &str) -> QueryResult<ResourceIter<'_>> {
            self.inner.find_resources(query, language)
        }
    }

    #[tokio::test]
    async fn test_store_reads_run_off_the_async_workers() {
        let store = Arc::new(BlockingOnlyStore {
            inner: MemoryStore::from_json(r#"{"/content/site/page": {"sling:alias": "seite"}}"#).unwrap(),
            armed: AtomicBool::new(false),
        });
        let mut config = ResolverConfig::default();
        config.vanity.background_init = false;
        let table = MappingTable::new(store.clone(), Arc::new(config));
        table.initialize();
        let server = HttpServer::new(Resolver::new(Arc::new(table)));
        store.armed.store(true, Ordering::Relaxed);

        let (status, body) = get_json(&server, "/resolve?path=/content/site/seite.html").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path"], "/content/site/page");

        let (status, body) = get_json(&server, "/map?path=/content/site/page").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mapped"], "/content/site/seite");
    }
}

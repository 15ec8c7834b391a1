//! End-to-end resolution and mapping tests.

use resource_resolver::mapping::events::ResourceChange;
use resource_resolver::resolver::{RequestContext, Resolution};

mod common;
use common::Fixture;

fn alias_fixture() -> Fixture {
    Fixture::new()
        .node("/parent", &[("sling:alias", "alias-parent".into())])
        .node("/parent/child", &[("sling:alias", "alias-child".into())])
}

fn resolved_path(resolution: Resolution) -> String {
    match resolution {
        Resolution::Found { path, .. } => path,
        other => panic!("expected a resource, got {:?}", other),
    }
}

#[test]
fn test_alias_variants_resolve_to_same_resource() {
    for optimized in [true, false] {
        let (_, _, resolver) = alias_fixture()
            .configure(|c| c.alias.optimized = optimized)
            .build();
        for path in [
            "/alias-parent/alias-child",
            "/alias-parent/child",
            "/parent/alias-child",
            "/parent/child",
        ] {
            assert_eq!(
                resolved_path(resolver.resolve(path, None).unwrap()),
                "/parent/child",
                "path {} (optimized: {})",
                path,
                optimized
            );
        }
        assert_eq!(resolver.map("/parent/child", None), "/alias-parent/alias-child");
        assert_eq!(
            resolver.all_mappings("/parent/child", None),
            vec![
                "/alias-parent/alias-child",
                "/alias-parent/child",
                "/parent/alias-child",
                "/parent/child",
            ]
        );
    }
}

#[test]
fn test_alias_round_trip_keeps_extension() {
    let (_, _, resolver) = alias_fixture().build();
    let mapped = resolver.map("/parent/child.html", None);
    assert_eq!(mapped, "/alias-parent/alias-child.html");
    match resolver.resolve(&mapped, None).unwrap() {
        Resolution::Found { path, path_info, .. } => {
            assert_eq!(path, "/parent/child");
            assert_eq!(path_info.as_deref(), Some(".html"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_content_node_alias() {
    let (_, table, resolver) = Fixture::new()
        .node("/site/page", &[("sling:alias", "own".into())])
        .node("/site/page/jcr:content", &[("sling:alias", "from-content".into())])
        .build();
    assert_eq!(
        table.alias_map("/site").get("page"),
        Some(&vec!["own".to_string(), "from-content".to_string()])
    );
    assert_eq!(resolved_path(resolver.resolve("/site/from-content", None).unwrap()), "/site/page");
}

#[test]
fn test_duplicate_alias_counted_once() {
    let (_, table, resolver) = Fixture::new()
        .node("/p/a", &[("sling:alias", "x".into())])
        .node("/p/b", &[("sling:alias", vec!["x", "y"].into())])
        .build();
    assert_eq!(table.aliases().conflict_count(), 1);
    assert_eq!(resolved_path(resolver.resolve("/p/x", None).unwrap()), "/p/a");
    assert_eq!(resolved_path(resolver.resolve("/p/y", None).unwrap()), "/p/b");
}

#[test]
fn test_alias_index_degrades_without_range_queries() {
    let (store, config) = alias_fixture().into_parts();
    store.set_range_queries(false);
    let (table, resolver) = common::build_over(std::sync::Arc::new(store), config);
    assert!(!table.aliases().is_optimized());
    assert_eq!(
        resolved_path(resolver.resolve("/alias-parent/alias-child", None).unwrap()),
        "/parent/child"
    );
}

#[test]
fn test_subtree_removal_drops_aliases() {
    let (store, table, resolver) = alias_fixture().build();
    store.remove("/parent");
    let change = table.on_change(&[ResourceChange::removed("/parent")]);
    assert!(!change.alias_paths.is_empty());
    assert!(table.alias_map("/").is_empty());
    assert!(matches!(
        resolver.resolve("/alias-parent/alias-child", None).unwrap(),
        Resolution::NonExisting { .. }
    ));
}

#[test]
fn test_mapping_cycle_terminates() {
    let (_, _, resolver) = Fixture::new()
        .node(
            "/etc/map/http/loop-x",
            &[
                ("sling:match", "localhost.80/x$".into()),
                ("sling:internalRedirect", "http://localhost/y".into()),
            ],
        )
        .node(
            "/etc/map/http/loop-y",
            &[
                ("sling:match", "localhost.80/y$".into()),
                ("sling:internalRedirect", "http://localhost/x".into()),
            ],
        )
        .node("/x", &[])
        .build();
    assert_eq!(
        resolver.resolve("/x", None).unwrap(),
        Resolution::NonExisting {
            path: "/x".into(),
            path_info: None,
        }
    );
}

#[test]
fn test_external_redirect_for_host() {
    let (_, table, resolver) = Fixture::new()
        .node(
            "/etc/map/http/localhost.8080",
            &[("sling:redirect", "/content/simple-node".into())],
        )
        .build();
    let entries = table.configured_resolve_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].pattern(), "^http/localhost.8080/");
    assert_eq!(entries[0].redirects(), ["/content/simple-node/"]);
    assert!(!entries[0].is_internal());

    let ctx = RequestContext::new("http", "localhost", 8080);
    assert_eq!(
        resolver.resolve("/index.html", Some(&ctx)).unwrap(),
        Resolution::Redirect {
            path: "/index.html".into(),
            target: "/content/simple-node/index.html".into(),
            status: 302,
        }
    );
    // other ports are not affected
    assert!(matches!(
        resolver.resolve("/index.html", None).unwrap(),
        Resolution::NonExisting { .. }
    ));
}

#[test]
fn test_vanity_precedence_flag() {
    let fixture = || {
        Fixture::new()
            .node(
                "/etc/map/http/localhost.80",
                &[("sling:internalRedirect", "/content/site".into())],
            )
            .node("/content/site", &[])
            .node("/content/other", &[("sling:vanityPath", "/promo".into())])
    };

    let (_, _, resolver) = fixture().build();
    assert_eq!(
        resolver.resolve("/promo", None).unwrap(),
        Resolution::NonExisting {
            path: "/content/site/promo".into(),
            path_info: None,
        }
    );

    let (_, _, resolver) = fixture()
        .configure(|c| c.mapping.vanity_path_precedence = true)
        .build();
    assert_eq!(resolved_path(resolver.resolve("/promo", None).unwrap()), "/content/other");
}

#[test]
fn test_vanity_order_breaks_ties() {
    let (_, _, resolver) = Fixture::new()
        .node(
            "/content/low",
            &[("sling:vanityPath", "/shared".into()), ("sling:vanityOrder", 1i64.into())],
        )
        .node(
            "/content/high",
            &[("sling:vanityPath", "/shared".into()), ("sling:vanityOrder", 5i64.into())],
        )
        .build();
    assert_eq!(resolved_path(resolver.resolve("/shared", None).unwrap()), "/content/high");
}

#[test]
fn test_vanity_capacity_falls_back_to_query() {
    let (_, table, resolver) = Fixture::new()
        .node("/content/a", &[("sling:vanityPath", "/first".into())])
        .node("/content/b", &[("sling:vanityPath", "/second".into())])
        .configure(|c| c.vanity.max_cached_entries = 2)
        .build();
    assert_eq!(table.vanity().entry_count(), 2);
    assert!(table.vanity().is_overflowed());
    assert_eq!(resolved_path(resolver.resolve("/first", None).unwrap()), "/content/a");
    assert_eq!(resolved_path(resolver.resolve("/second", None).unwrap()), "/content/b");
}

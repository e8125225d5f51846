//! End-to-end tests: discovery, boot, request pipeline, and lifecycle
//! changes observed through HTTP.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use trees_app::Trees;
use trees_app::plugins::builtin_catalog;
use trees_app::server::build_app;
use trees_core::config::AppConfig;
use trees_core::ErrorKind;
use trees_core::http::{Request, StatusCode};
use trees_plugin::tags;

fn write_blog(root: &Path, enabled: bool) {
    let dir = root.join("plugins/blog");
    std::fs::create_dir_all(dir.join("views/blogs")).unwrap();
    std::fs::write(
        dir.join("plugin.json"),
        json!({
            "id": "blog",
            "name": "Blog",
            "version": "1.0.0",
            "enabled": enabled,
            "settings": {
                "title": "Field Notes",
                "posts": [{"id": 1, "title": "Hello", "body": "First post"}]
            }
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(dir.join("views/blogs/index.html"), "<h1>{{ title }}</h1>").unwrap();
    std::fs::write(dir.join("views/blogs/item.html"), "<p>{{ post.title }}</p>").unwrap();
    std::fs::write(dir.join("views/blogs/show.html"), "<h2>{{ post.title }}</h2>").unwrap();
}

fn write_admin(root: &Path) {
    let dir = root.join("plugins/admin");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("plugin.json"),
        json!({"id": "admin", "name": "Admin", "version": "1.0.0", "enabled": true}).to_string(),
    )
    .unwrap();
}

fn app(root: &Path) -> Trees {
    let mut config = AppConfig::default();
    config.plugins.directory = root.join("plugins").display().to_string();
    config.plugins.state_file = root.join("storage/plugins.json").display().to_string();
    let trees = Trees::new(config, builtin_catalog()).unwrap();
    trees.run().unwrap();
    trees
}

fn get(path: &str) -> Request {
    http::Request::builder()
        .uri(path)
        .body(Bytes::new())
        .unwrap()
}

fn post(path: &str, body: &str) -> Request {
    http::Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Bytes::from(body.to_string()))
        .unwrap()
}

fn json_body(trees: &Trees, path: &str) -> Value {
    let response = trees.handle(get(path)).unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(response.body()).unwrap()
}

fn body(trees: &Trees, path: &str) -> (StatusCode, String) {
    let response = trees.handle(get(path)).unwrap();
    (
        response.status(),
        String::from_utf8(response.body().to_vec()).unwrap(),
    )
}

#[test]
fn test_enabled_plugin_serves_pages() {
    let dir = tempfile::tempdir().unwrap();
    write_blog(dir.path(), true);
    let trees = app(dir.path());

    assert_eq!(
        body(&trees, "/blog"),
        (StatusCode::OK, "<h1>Field Notes</h1><p>Hello</p>".to_string())
    );
    assert_eq!(
        body(&trees, "/blog/1"),
        (StatusCode::OK, "<h2>Hello</h2>".to_string())
    );
    assert_eq!(body(&trees, "/nowhere").0, StatusCode::NOT_FOUND);
    assert_eq!(trees.navigation().unwrap().len(), 1);
}

#[test]
fn test_disabled_plugin_is_discovered_but_silent() {
    let dir = tempfile::tempdir().unwrap();
    write_blog(dir.path(), false);
    let trees = app(dir.path());

    assert!(trees.plugin_manager().plugin("blog").is_some());
    assert_eq!(body(&trees, "/blog").0, StatusCode::NOT_FOUND);
    assert!(trees.navigation().unwrap().is_empty());
}

#[test]
fn test_lifecycle_changes_take_effect_and_persist() {
    let dir = tempfile::tempdir().unwrap();
    write_blog(dir.path(), false);

    {
        let trees = app(dir.path());
        assert!(trees.plugin_manager().activate("blog"));
        assert_eq!(body(&trees, "/blog/1").0, StatusCode::OK);

        assert!(trees.plugin_manager().deactivate("blog"));
        assert_eq!(body(&trees, "/blog/1").0, StatusCode::NOT_FOUND);
        assert_eq!(trees.hooks().count_owned_by("blog"), 0);

        assert!(trees.plugin_manager().activate("blog"));
    }

    // A fresh process sees the persisted flag and boots the plugin itself.
    let trees = app(dir.path());
    assert!(trees.plugin_manager().is_booted("blog"));
    assert_eq!(body(&trees, "/blog").0, StatusCode::OK);
}

#[test]
fn test_admin_toggles_plugins_in_the_running_app() {
    let dir = tempfile::tempdir().unwrap();
    write_blog(dir.path(), false);
    write_admin(dir.path());
    let trees = app(dir.path());
    assert_eq!(body(&trees, "/blog").0, StatusCode::NOT_FOUND);

    let response = trees.handle(post("/admin/plugins/blog/activate", "")).unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "/admin/plugins");
    assert_eq!(body(&trees, "/blog").0, StatusCode::OK);

    let labels: Vec<String> = trees
        .navigation()
        .unwrap()
        .into_iter()
        .map(|item| item.label)
        .collect();
    assert_eq!(labels, vec!["Admin", "Blog"]);

    let listing = json_body(&trees, "/admin/plugins");
    let enabled: Vec<(String, bool)> = listing["plugins"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| (p["id"].as_str().unwrap().to_string(), p["enabled"].as_bool().unwrap()))
        .collect();
    assert_eq!(
        enabled,
        vec![("admin".to_string(), true), ("blog".to_string(), true)]
    );

    let response = trees.handle(post("/admin/plugins/blog/deactivate", "")).unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(body(&trees, "/blog").0, StatusCode::NOT_FOUND);
    assert_eq!(trees.hooks().count_owned_by("blog"), 0);

    let dashboard = json_body(&trees, "/admin");
    assert_eq!(dashboard["total_plugins"], 2);
    assert_eq!(dashboard["active_plugins"], 1);

    // The change is durable.
    drop(trees);
    let trees = app(dir.path());
    assert!(!trees.plugin_manager().is_active("blog"));
}

#[test]
fn test_admin_reports_lifecycle_errors() {
    let dir = tempfile::tempdir().unwrap();
    write_blog(dir.path(), false);
    write_admin(dir.path());
    let trees = app(dir.path());

    let err = trees
        .handle(post("/admin/plugins/ghost/activate", ""))
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));

    let err = trees
        .handle(post("/admin/plugins/blog/deactivate", ""))
        .unwrap_err();
    assert!(err.is(ErrorKind::Conflict));

    let err = trees
        .handle(get("/admin/plugins/ghost/settings"))
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[test]
fn test_admin_updates_settings() {
    let dir = tempfile::tempdir().unwrap();
    write_blog(dir.path(), true);
    write_admin(dir.path());
    let trees = app(dir.path());

    let response = trees
        .handle(post("/admin/plugins/blog/settings", r#"{"title": "Renamed"}"#))
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()["location"],
        "/admin/plugins/blog/settings"
    );

    let page = json_body(&trees, "/admin/plugins/blog/settings");
    assert_eq!(page["plugin"]["id"], "blog");
    assert_eq!(page["settings"]["title"], "Renamed");
    assert_eq!(page["settings"]["posts"][0]["title"], "Hello");

    let err = trees
        .handle(post("/admin/plugins/blog/settings", "[1, 2]"))
        .unwrap_err();
    assert!(err.is(ErrorKind::Validation));
}

#[test]
fn test_response_filters_run_for_plugin_routes() {
    let dir = tempfile::tempdir().unwrap();
    write_blog(dir.path(), true);
    let trees = app(dir.path());

    trees.hooks().add_filter(
        tags::RESPONSE_AFTER,
        |mut response: trees_core::http::Response, args: &[Value]| {
            let path = args[1].as_str().unwrap_or_default().to_string();
            response.headers_mut().insert(
                "x-path",
                http::HeaderValue::from_str(&path).map_err(|e| {
                    trees_core::AppError::hook_callback(e.to_string())
                })?,
            );
            Ok(response)
        },
        20,
        None,
    );

    let response = trees.handle(get("/blog/1")).unwrap();
    assert_eq!(response.headers()["x-path"], "/blog/1");
}

#[tokio::test]
async fn test_server_maps_errors_to_status_codes() {
    let dir = tempfile::tempdir().unwrap();
    write_blog(dir.path(), true);
    let trees = Arc::new(app(dir.path()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, build_app(trees, 1024)).await.unwrap();
    });

    async fn fetch(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        raw
    }

    assert!(fetch(addr, "/blog/1").await.starts_with("HTTP/1.1 200"));
    assert!(fetch(addr, "/blog/42").await.starts_with("HTTP/1.1 404"));

    let bad = fetch(addr, "/blog/abc").await;
    assert!(bad.starts_with("HTTP/1.1 400"));
    assert!(bad.contains("VALIDATION"));

    server.abort();
}

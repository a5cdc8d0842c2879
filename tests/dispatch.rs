//! End-to-end dispatch through a real listener and mock backends.

use axum::http::StatusCode;

mod common;

#[tokio::test]
async fn test_in_context_forwarded_out_of_context_passed() {
    let backend = common::start_echo_backend().await;
    let proxy = common::spawn_proxy_toml(&format!(
        r#"
        [[mounts]]
        name = "api"
        context = "/api"
        target = "http://{backend}"
        "#
    ))
    .await;

    let echo = common::get_echo(&proxy.url("/api/users?page=2")).await;
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["path"], "/api/users?page=2");

    let response = reqwest::get(proxy.url("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.text().await.unwrap(), "No proxy mount for /health");
}

#[tokio::test]
async fn test_rewrite_and_change_origin() {
    let backend = common::start_echo_backend().await;
    let proxy = common::spawn_proxy_toml(&format!(
        r#"
        [[mounts]]
        name = "api"
        context = "/api"
        target = "http://{backend}"
        change_origin = true

        [mounts.path_rewrite]
        "^/api" = ""
        "#
    ))
    .await;

    let echo = common::get_echo(&proxy.url("/api/users")).await;
    assert_eq!(echo["path"], "/users");
    assert_eq!(echo["headers"]["host"], backend.to_string());
}

#[tokio::test]
async fn test_router_uses_original_path() {
    let primary = common::start_echo_backend().await;
    let legacy = common::start_echo_backend().await;
    let proxy = common::spawn_proxy_toml(&format!(
        r#"
        [[mounts]]
        name = "api"
        context = "/api"
        target = "http://{primary}"
        change_origin = true

        [mounts.path_rewrite]
        "^/api/v1" = "/legacy"

        [mounts.router]
        "/api/v1" = "http://{legacy}"
        "#
    ))
    .await;

    let echo = common::get_echo(&proxy.url("/api/v1/orders")).await;
    assert_eq!(echo["path"], "/legacy/orders");
    assert_eq!(echo["headers"]["host"], legacy.to_string());

    let echo = common::get_echo(&proxy.url("/api/v2/orders")).await;
    assert_eq!(echo["path"], "/api/v2/orders");
    assert_eq!(echo["headers"]["host"], primary.to_string());
}

#[tokio::test]
async fn test_mounts_run_in_declaration_order() {
    let admin = common::start_echo_backend().await;
    let api = common::start_echo_backend().await;
    let proxy = common::spawn_proxy_toml(&format!(
        r#"
        [[mounts]]
        name = "admin"
        context = "/api/admin"
        target = "http://{admin}"
        change_origin = true

        [[mounts]]
        name = "api"
        context = "/api"
        target = "http://{api}"
        change_origin = true
        "#
    ))
    .await;

    let echo = common::get_echo(&proxy.url("/api/admin/users")).await;
    assert_eq!(echo["headers"]["host"], admin.to_string());

    let echo = common::get_echo(&proxy.url("/api/users")).await;
    assert_eq!(echo["headers"]["host"], api.to_string());
}

#[tokio::test]
async fn test_glob_context_with_exclusion() {
    let backend = common::start_echo_backend().await;
    let proxy = common::spawn_proxy_toml(&format!(
        r#"
        [[mounts]]
        name = "data"
        context = ["/data/*", "!/data/*.html"]
        target = "http://{backend}"
        "#
    ))
    .await;

    let echo = common::get_echo(&proxy.url("/data/items.json")).await;
    assert_eq!(echo["path"], "/data/items.json");

    let response = reqwest::get(proxy.url("/data/index.html")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_xfwd_and_extra_headers() {
    let backend = common::start_echo_backend().await;
    let proxy = common::spawn_proxy_toml(&format!(
        r#"
        [[mounts]]
        name = "api"
        target = "http://{backend}"
        xfwd = true

        [mounts.headers]
        x-api-key = "secret"
        "#
    ))
    .await;

    let echo = common::get_echo(&proxy.url("/anything")).await;
    assert_eq!(echo["headers"]["x-forwarded-for"], "127.0.0.1");
    assert_eq!(echo["headers"]["x-forwarded-proto"], "http");
    assert_eq!(echo["headers"]["x-forwarded-host"], proxy.addr.to_string());
    assert_eq!(echo["headers"]["x-api-key"], "secret");
}

#[tokio::test]
async fn test_connection_refused_returns_gateway_timeout() {
    let dead = common::closed_port().await;
    let proxy = common::spawn_proxy_toml(&format!(
        r#"
        [[mounts]]
        name = "api"
        context = "/api"
        target = "http://{dead}"
        "#
    ))
    .await;

    let response = reqwest::get(proxy.url("/api/users")).await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(
        response.text().await.unwrap(),
        format!("Error occurred while trying to proxy to: {}/api/users", proxy.addr)
    );
}

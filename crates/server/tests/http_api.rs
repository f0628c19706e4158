use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use relay_server::core::config::{AppState, ServerConfig};
use relay_server::relay::identity::Identity;
use relay_server::{app, build_state};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

async fn setup() -> (TempDir, AppState, Router) {
    let dir = TempDir::new().unwrap();
    let state = build_state(ServerConfig::with_data_dir(dir.path())).await.unwrap();
    let router = app(state.clone());
    (dir, state, router)
}

async fn call(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn signup(router: &Router, username: &str) -> String {
    let (status, body) = call(
        router,
        request(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"username": username, "password": "hunter22"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "signup failed: {}", body);
    assert_eq!(body["username"], username);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_key_rendezvous_endpoints() {
    let (_dir, state, router) = setup().await;
    let alice = signup(&router, "alice").await;
    let bobby = signup(&router, "bobby").await;

    let (status, body) = call(&router, request(Method::GET, "/keys/exists", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"exists": false}));

    // Without an open socket there is nothing to tie the key's lifetime to
    let (status, _) = call(
        &router,
        request(Method::PUT, "/keys", Some(&alice), Some(json!({"public_key": "K0"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (tx, _rx) = mpsc::unbounded_channel();
    let socket = state.hub.attach(Identity::parse("alice").unwrap(), tx);

    let (status, _) = call(
        &router,
        request(Method::PUT, "/keys", Some(&alice), Some(json!({"public_key": "K1"}))),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(
        &router,
        request(Method::PUT, "/keys", Some(&alice), Some(json!({"public_key": "K2"}))),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = call(&router, request(Method::GET, "/keys/exists", Some(&alice), None)).await;
    assert_eq!(body, json!({"exists": true}));

    let (status, body) = call(&router, request(Method::GET, "/keys/alice", Some(&bobby), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"username": "alice", "public_key": "K2"}));

    let (_, body) = call(&router, request(Method::GET, "/keys/dave", Some(&bobby), None)).await;
    assert_eq!(body, json!({"username": "dave", "public_key": null}));

    state.hub.disconnect(&socket).await;
    let (_, body) = call(&router, request(Method::GET, "/keys/alice", Some(&bobby), None)).await;
    assert_eq!(body, json!({"username": "alice", "public_key": null}));
    let (status, _) = call(
        &router,
        request(Method::PUT, "/keys", Some(&alice), Some(json!({"public_key": "K3"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_key_endpoints_reject_bad_input() {
    let (_dir, _state, router) = setup().await;
    let alice = signup(&router, "alice").await;

    let (status, body) = call(&router, request(Method::GET, "/keys/exists", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"]["message"].is_string());

    let (status, _) = call(&router, request(Method::GET, "/keys/exists", Some("bogus"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &router,
        request(Method::PUT, "/keys", Some(&alice), Some(json!({"public_key": "  "}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&router, request(Method::GET, "/keys/a", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_contacts_and_session_cookie() {
    let (_dir, _state, router) = setup().await;
    let alice = signup(&router, "alice").await;
    signup(&router, "bobby").await;

    let (status, _) = call(&router, request(Method::POST, "/contacts/bobby", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&router, request(Method::POST, "/contacts/nobody", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&router, request(Method::POST, "/contacts/alice", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&router, request(Method::GET, "/contacts", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"username": "bobby", "online": false}]));

    let req = Request::builder()
        .uri("/auth/me")
        .header(header::COOKIE, format!("session={}", alice))
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    let (status, _) = call(&router, request(Method::POST, "/auth/logout", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&router, request(Method::GET, "/auth/me", Some(&alice), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_and_health() {
    let (_dir, _state, router) = setup().await;
    signup(&router, "alice").await;

    let (status, _) = call(
        &router,
        request(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"username": "alice", "password": "another1"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &router,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"username": "alice", "password": "wrong-one"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = router
        .clone()
        .oneshot(request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"username": "alice", "password": "hunter22"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    let (status, body) = call(&router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "online": 0, "published_keys": 0}));
}

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use messagely_api::credentials::{Credentials, HashCost};
use messagely_api::tokens::TokenService;
use messagely_api::{AppStateInner, router};
use messagely_db::Database;

const SECRET: &str = "router-test-secret";

fn app() -> Router {
    let db = Database::open_in_memory().unwrap();
    let credentials = Credentials::new(HashCost {
        memory_kib: 64,
        iterations: 1,
    })
    .unwrap();
    router(AppStateInner::new(db, credentials, TokenService::new(SECRET)))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "username": username,
            "password": password,
            "first_name": format!("{}-first", username),
            "last_name": format!("{}-last", username),
            "phone": "555-0100",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register {}: {}", username, body);
    body["token"].as_str().unwrap().to_string()
}

async fn send_message(app: &Router, token: &str, to: &str, text: &str) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/messages",
        Some(token),
        Some(json!({ "to_username": to, "body": text })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "send: {}", body);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn register_then_login() {
    let app = app();
    let token = register(&app, "alice", "wonderland").await;

    let tokens = TokenService::new(SECRET);
    assert_eq!(tokens.verify(&token).unwrap().username, "alice");

    let (status, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wonderland" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn registration_records_a_login() {
    let app = app();
    let token = register(&app, "alice", "pw").await;

    let (status, body) = send(&app, "GET", "/users/alice", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["first_name"], "alice-first");
    assert!(body["join_at"].is_string());
    assert!(body["last_login_at"].is_string());
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn register_requires_every_field() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "pw", "first_name": "A", "last_name": "B" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);
    assert_eq!(body["error"]["message"], "phone is required.");

    let (status, _) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "username": "",
            "password": "pw",
            "first_name": "A",
            "last_name": "B",
            "phone": "1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    register(&app, "alice", "pw").await;

    let (status, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "username": "alice",
            "password": "other",
            "first_name": "A",
            "last_name": "B",
            "phone": "1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["status"], 409);
}

#[tokio::test]
async fn login_with_wrong_password_is_bad_request() {
    let app = app();
    register(&app, "alice", "correct").await;

    let (status, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "incorrect" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Username or password incorrect.");

    let (status, _) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "nobody", "password": "correct" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_rejects_malformed_bodies() {
    let app = app();

    let (status, _) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "pw", "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = app();
    register(&app, "alice", "pw").await;

    let (status, _) = send(&app, "GET", "/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/users", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let foreign = TokenService::new("another-secret").issue("alice").unwrap();
    let (status, _) = send(&app, "GET", "/users", Some(&foreign), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn list_users_omits_private_fields() {
    let app = app();
    let token = register(&app, "bob", "pw").await;
    register(&app, "alice", "pw").await;

    let (status, body) = send(&app, "GET", "/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let users = body.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["username"], "alice");
    assert_eq!(users[1]["username"], "bob");
    assert!(users[0].get("password").is_none());
    assert!(users[0].get("join_at").is_none());
}

#[tokio::test]
async fn other_users_details_are_unauthorized_not_forbidden() {
    let app = app();
    let alice = register(&app, "alice", "pw").await;
    register(&app, "bob", "pw").await;

    // Correct-user mismatch answers 401, not 403.
    for path in ["/users/bob", "/users/bob/to", "/users/bob/from"] {
        let (status, _) = send(&app, "GET", path, Some(&alice), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", path);
    }
}

#[tokio::test]
async fn send_to_unknown_user_is_not_found() {
    let app = app();
    let alice = register(&app, "alice", "pw").await;

    let (status, _) = send(
        &app,
        "POST",
        "/messages",
        Some(&alice),
        Some(json!({ "to_username": "ghost", "body": "hello?" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        "/messages",
        Some(&alice),
        Some(json!({ "to_username": "alice", "body": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inbox_and_outbox() {
    let app = app();
    let alice = register(&app, "alice", "pw").await;
    let bob = register(&app, "bob", "pw").await;
    let id = send_message(&app, &alice, "bob", "hi bob").await;

    let (status, body) = send(&app, "GET", "/users/alice/from", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], id);
    assert_eq!(body[0]["to_user"]["username"], "bob");
    assert_eq!(body[0]["to_user"]["first_name"], "bob-first");
    assert!(body[0]["read_at"].is_null());

    let (status, body) = send(&app, "GET", "/users/bob/to", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["from_user"]["username"], "alice");
    assert_eq!(body[0]["body"], "hi bob");

    let (_, body) = send(&app, "GET", "/users/bob/from", Some(&bob), None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn message_read_receipt_scenario() {
    let app = app();
    let alice = register(&app, "alice", "pw").await;
    let bob = register(&app, "bob", "pw").await;
    let carol = register(&app, "carol", "pw").await;

    let id = send_message(&app, &alice, "bob", "lunch?").await;
    let read_path = format!("/messages/{}/read", id);
    let path = format!("/messages/{}", id);

    // Only the recipient may mark it read
    let (status, _) = send(&app, "POST", &read_path, Some(&alice), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, receipt) = send(&app, "POST", &read_path, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["id"], id);
    assert!(receipt["read_at"].is_string());

    let (status, body) = send(&app, "GET", &path, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["from_user"]["username"], "alice");
    assert_eq!(body["to_user"]["username"], "bob");
    assert_eq!(body["read_at"], receipt["read_at"]);

    let (status, body) = send(&app, "GET", &path, Some(&carol), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Unauthorized.");

    // Marking again keeps the first timestamp
    let (status, again) = send(&app, "POST", &read_path, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["read_at"], receipt["read_at"]);
}

#[tokio::test]
async fn unknown_or_malformed_message_ids() {
    let app = app();
    let alice = register(&app, "alice", "pw").await;

    let (status, _) = send(&app, "GET", "/messages/999", Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/messages/999/read", Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/messages/abc", Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_with_username_only_is_accepted() {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let app = app();
    register(&app, "alice", "pw").await;

    let token = encode(
        &Header::default(),
        &json!({ "username": "alice" }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let (status, body) = send(&app, "GET", "/users/alice", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
}

#[tokio::test]
async fn unknown_routes_answer_with_json_errors() {
    let app = app();

    let (status, body) = send(&app, "GET", "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["status"], 404);

    let (status, body) = send(&app, "GET", "/auth/login", None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["status"], 405);
    assert_eq!(body["error"]["message"], "Method not allowed.");
}

#[tokio::test]
async fn undecodable_username_is_a_json_validation_error() {
    let app = app();
    let alice = register(&app, "alice", "pw").await;

    for path in ["/users/%FF", "/users/%FF/to", "/users/%FF/from"] {
        let (status, body) = send(&app, "GET", path, Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
        assert_eq!(body["error"]["status"], 400, "{}", path);
    }
}

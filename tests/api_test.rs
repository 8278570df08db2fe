mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use chrono::Duration as SessionDuration;
use library_lending::api::{AppState, create_router};
use library_lending::application::{LendingPolicy, LockKey};
use library_lending::auth::AuthGate;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// ============================================================================
// APIテスト用のヘルパー関数
// ============================================================================

fn setup_state(policy: LendingPolicy) -> Arc<AppState> {
    let auth = Arc::new(AuthGate::new(SessionDuration::hours(1)));
    auth.seed_admin("admin", "admin").unwrap();
    Arc::new(AppState {
        service_deps: common::memory_deps(policy),
        auth,
    })
}

fn setup_app() -> Router {
    create_router(setup_state(LendingPolicy::default()))
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    TestResponse {
        status,
        headers,
        body,
    }
}

async fn login_admin(app: &Router) -> String {
    let response = send(
        app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "username": "admin", "password": "admin" })),
    )
    .await;
    assert_eq!(response.body["ok"], true);
    response.body["token"].as_str().unwrap().to_string()
}

// ============================================================================
// セッション
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = setup_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_mutations_require_session() {
    let app = setup_app();

    let response = send(
        &app,
        "POST",
        "/api/books",
        None,
        Some(json!({ "isbn": "111", "title": "T", "copies": 1 })),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["ok"], false);
    assert_eq!(response.body["msg"], "Authentication required");

    let response = send(&app, "DELETE", "/api/members/m1", Some("bogus"), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    // 会員登録はログイン不要
    let response = send(
        &app,
        "POST",
        "/api/members",
        None,
        Some(json!({ "member_id": "m1", "name": "Alice" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["ok"], true);
    assert_eq!(response.body["member"]["borrowed_books"], json!([]));
}

#[tokio::test]
async fn test_login_logout_and_me() {
    let app = setup_app();

    let response = send(
        &app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "username": "admin", "password": "wrong" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "ok": false }));

    let response = send(&app, "POST", "/api/login", None, Some(json!({}))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["ok"], false);

    let response = send(
        &app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "username": "admin", "password": "admin" })),
    )
    .await;
    let token = response.body["token"].as_str().unwrap().to_string();
    let cookie = response
        .headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.starts_with(&format!("library_session={token}")));

    let response = send(&app, "GET", "/api/me", Some(&token), None).await;
    assert_eq!(response.body, json!({ "user": "admin" }));

    let response = send(&app, "POST", "/api/logout", Some(&token), None).await;
    assert_eq!(response.body["ok"], true);

    let response = send(&app, "GET", "/api/me", Some(&token), None).await;
    assert_eq!(response.body, json!({ "user": null }));
    let response = send(&app, "DELETE", "/api/books/111", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_user_starts_session() {
    let app = setup_app();
    let credentials = json!({ "username": "bob", "password": "pw" });

    let response = send(&app, "POST", "/api/register", None, Some(credentials.clone())).await;
    assert_eq!(response.body["ok"], true);
    assert!(response.body["token"].is_string());

    let response = send(&app, "POST", "/api/register", None, Some(credentials)).await;
    assert_eq!(response.body, json!({ "ok": false }));
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let app = setup_app();
    let token = login_admin(&app).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/books")
        .header(header::COOKIE, format!("library_session={token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "isbn": "111", "title": "T", "author": "A", "copies": "2" }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

// ============================================================================
// 目録
// ============================================================================

#[tokio::test]
async fn test_add_book_reports_field_errors() {
    let app = setup_app();
    let token = login_admin(&app).await;

    let response = send(
        &app,
        "POST",
        "/api/books",
        Some(&token),
        Some(json!({ "isbn": "", "title": "", "copies": "many" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["ok"], false);
    let errors = &response.body["errors"];
    assert_eq!(errors["isbn"], "ISBN is required.");
    assert_eq!(errors["title"], "Title is required.");
    assert_eq!(errors["copies"], "Copies must be a number.");

    let book = json!({ "isbn": "111", "title": "Python", "author": "A", "copies": 2 });
    let response = send(&app, "POST", "/api/books", Some(&token), Some(book.clone())).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(
        response.body["book"],
        json!({
            "isbn": "111",
            "title": "Python",
            "author": "A",
            "copies": 2,
            "total_copies": 2,
            "available_copies": 2
        })
    );

    let response = send(&app, "POST", "/api/books", Some(&token), Some(book)).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(response.body["errors"]["isbn"].is_string());
}

#[tokio::test]
async fn test_book_search_and_lookup() {
    let app = setup_app();
    let token = login_admin(&app).await;
    for (isbn, title) in [("111", "Python Programming"), ("222", "Rust in Action")] {
        send(
            &app,
            "POST",
            "/api/books",
            Some(&token),
            Some(json!({ "isbn": isbn, "title": title, "copies": 1 })),
        )
        .await;
    }

    let response = send(&app, "GET", "/api/books?q=rust", None, None).await;
    let books = response.body.as_array().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0]["isbn"], "222");

    let response = send(&app, "GET", "/api/books?q=111&by=isbn", None, None).await;
    assert_eq!(response.body.as_array().unwrap().len(), 1);

    let response = send(&app, "GET", "/api/books/999", None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["ok"], false);

    let response = send(
        &app,
        "PUT",
        "/api/books/111",
        Some(&token),
        Some(json!({ "copies": -1 })),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["errors"]["copies"].is_string());
}

// ============================================================================
// 貸出
// ============================================================================

#[tokio::test]
async fn test_issue_return_flow() {
    let app = setup_app();
    let token = login_admin(&app).await;

    send(
        &app,
        "POST",
        "/api/books",
        Some(&token),
        Some(json!({ "isbn": "111", "title": "Python", "copies": 1 })),
    )
    .await;
    for id in ["m1", "m2"] {
        send(
            &app,
            "POST",
            "/api/members",
            None,
            Some(json!({ "member_id": id, "name": id })),
        )
        .await;
    }

    // Step 1: m1が借りる
    let response = send(
        &app,
        "POST",
        "/api/issue",
        None,
        Some(json!({ "member_id": "m1", "isbn": "111" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["ok"], true);
    let loan = &response.body["loan"];
    assert_eq!(loan["returned"], false);
    assert_eq!(loan["returned_at"], Value::Null);
    assert_eq!(loan["overdue"], false);
    let loan_id = loan["loan_id"].as_str().unwrap().to_string();

    // Step 2: 在庫がないためm2は借りられない
    let response = send(
        &app,
        "POST",
        "/api/issue",
        None,
        Some(json!({ "member_id": "m2", "isbn": "111" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["ok"], false);
    assert!(response.body.get("errors").is_none());

    let response = send(&app, "GET", "/api/books/111", None, None).await;
    assert_eq!(response.body["copies"], 0);
    let response = send(&app, "GET", "/api/members", None, None).await;
    assert_eq!(response.body[0]["borrowed_books"], json!(["111"]));

    // Step 3: 返却
    let response = send(
        &app,
        "POST",
        "/api/return",
        None,
        Some(json!({ "member_id": "m1", "isbn": "111" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["loan"]["returned"], true);

    // Step 4: m2が借りる
    let response = send(
        &app,
        "POST",
        "/api/issue",
        None,
        Some(json!({ "member_id": "m2", "isbn": "111" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = send(&app, "GET", "/api/loans", None, None).await;
    assert_eq!(response.body.as_array().unwrap().len(), 2);
    let response = send(&app, "GET", "/api/loans?member_id=m1", None, None).await;
    assert_eq!(response.body.as_array().unwrap().len(), 1);

    // Step 5: m1の返却を取り消そうとしても在庫がない
    let response = send(
        &app,
        "PUT",
        &format!("/api/loans/{loan_id}"),
        Some(&token),
        Some(json!({ "returned": false })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = send(
        &app,
        "PUT",
        &format!("/api/loans/{loan_id}"),
        Some(&token),
        Some(json!({ "due_date": "31/12/2026" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["errors"]["due_date"].is_string());

    let response = send(
        &app,
        "PUT",
        &format!("/api/loans/{loan_id}"),
        Some(&token),
        Some(json!({ "due_date": "2099-12-31" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["loan"]["due_date"], "2099-12-31");
}

#[tokio::test]
async fn test_lending_request_requires_both_ids() {
    let app = setup_app();

    let response = send(
        &app,
        "POST",
        "/api/issue",
        None,
        Some(json!({ "member_id": "m1" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["msg"], "member_id and isbn required");

    let response = send(
        &app,
        "POST",
        "/api/return",
        None,
        Some(json!({ "member_id": "ghost", "isbn": "111" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_busy_maps_to_503_with_retry_after() {
    let state = setup_state(LendingPolicy {
        lock_timeout: Duration::from_millis(20),
        ..LendingPolicy::default()
    });
    let app = create_router(state.clone());
    common::add_book(&state.service_deps, "111", 1).await;
    common::add_member(&state.service_deps, "m1").await;

    let _held = state
        .service_deps
        .locks
        .acquire([LockKey::Member(common::member_id("m1"))], Duration::from_secs(1))
        .await
        .unwrap();

    let response = send(
        &app,
        "POST",
        "/api/issue",
        None,
        Some(json!({ "member_id": "m1", "isbn": "111" })),
    )
    .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers.get(header::RETRY_AFTER).unwrap(), "1");
    assert_eq!(response.body["ok"], false);
}

// ============================================================================
// 形式エラー
// ============================================================================

async fn send_raw(app: &Router, method: &str, uri: &str, body: &str) -> TestResponse {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    TestResponse {
        status,
        headers,
        body,
    }
}

fn assert_bad_request(response: &TestResponse) {
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["ok"], false, "body: {}", response.body);
    assert!(response.body["msg"].is_string());
}

#[tokio::test]
async fn test_malformed_requests_keep_error_shape() {
    let app = setup_app();
    let token = login_admin(&app).await;

    // 型の合わない項目
    let response = send(
        &app,
        "POST",
        "/api/issue",
        None,
        Some(json!({ "member_id": 5, "isbn": "111" })),
    )
    .await;
    assert_bad_request(&response);

    let response = send(
        &app,
        "POST",
        "/api/members",
        None,
        Some(json!({ "member_id": "m1", "name": 7 })),
    )
    .await;
    assert_bad_request(&response);

    // JSONでない本文
    let response = send_raw(&app, "POST", "/api/issue", "not json").await;
    assert_bad_request(&response);
    let response = send_raw(&app, "POST", "/api/login", "{").await;
    assert_bad_request(&response);

    // UUIDでない貸出ID
    let response = send(&app, "GET", "/api/loans/not-a-uuid", None, None).await;
    assert_bad_request(&response);
    let response = send(
        &app,
        "PUT",
        "/api/loans/not-a-uuid",
        Some(&token),
        Some(json!({ "returned": true })),
    )
    .await;
    assert_bad_request(&response);

    // 不明な検索項目
    let response = send(&app, "GET", "/api/books?q=x&by=publisher", None, None).await;
    assert_bad_request(&response);

    // 何も登録されていない
    let response = send(&app, "GET", "/api/members", None, None).await;
    assert_eq!(response.body, json!([]));
}

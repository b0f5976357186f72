//! HTTP-level tests: friendship lifecycle, chat gating and window, daily poems.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::util::ServiceExt; // for `oneshot`

use rhyme_api::{AppStateInner, build_router};
use rhyme_daily::{DailyPoemCache, GeneratedPoem, GenerationError, PoemGenerator, ThemeCalendar};
use rhyme_db::Database;
use rhyme_types::api::Claims;
use rhyme_types::clock::ManualClock;
use uuid::Uuid;

struct StubGenerator {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl PoemGenerator for StubGenerator {
    async fn generate(&self, theme: &str) -> Result<GeneratedPoem, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GenerationError::NotConfigured);
        }
        Ok(GeneratedPoem {
            title: format!("On {theme}"),
            content: "stub verse".into(),
        })
    }
}

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
    generator: Arc<StubGenerator>,
}

fn setup_app(fail_generation: bool) -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let generator = Arc::new(StubGenerator {
        calls: AtomicUsize::new(0),
        fail: fail_generation,
    });
    let daily = DailyPoemCache::new(
        db.clone(),
        Arc::new(ThemeCalendar::builtin().unwrap()),
        generator.clone(),
        clock.clone(),
        Duration::from_secs(5),
    );

    let state = Arc::new(AppStateInner {
        db,
        daily: Arc::new(daily),
        clock: clock.clone(),
        jwt_secret: "test-secret".into(),
        token_ttl: chrono::Duration::hours(48),
    });

    TestApp {
        router: build_router(state),
        clock,
        generator,
    }
}

impl TestApp {
    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "username": username, "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn status_of(&self, token: &str, username: &str) -> String {
        let (code, body) = self
            .call("GET", &format!("/api/friends/status/{username}"), Some(token), None)
            .await;
        assert_eq!(code, StatusCode::OK);
        body["status"].as_str().unwrap().to_string()
    }

    async fn befriend(&self, (a_name, a): (&str, &str), (b_name, b): (&str, &str)) {
        let (code, _) = self
            .call("POST", "/api/friends/follow", Some(a), Some(json!({ "username": b_name })))
            .await;
        assert_eq!(code, StatusCode::OK);
        let (code, _) = self
            .call(
                "POST",
                "/api/friends/respond",
                Some(b),
                Some(json!({ "username": a_name, "action": "accept" })),
            )
            .await;
        assert_eq!(code, StatusCode::OK);
    }
}

// =============================================================================
// Friendship lifecycle
// =============================================================================

#[tokio::test]
async fn request_accept_chat_remove_scenario() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let (code, body) = app
        .call("POST", "/api/friends/follow", Some(&alice), Some(json!({ "username": "bob" })))
        .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(app.status_of(&alice, "bob").await, "pending_sent");
    assert_eq!(app.status_of(&bob, "alice").await, "pending_incoming");

    let (code, requests) = app.call("GET", "/api/friends/requests", Some(&bob), None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(requests[0]["username"], "alice");

    let (code, body) = app
        .call(
            "POST",
            "/api/friends/respond",
            Some(&bob),
            Some(json!({ "username": "alice", "action": "accept" })),
        )
        .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(app.status_of(&alice, "bob").await, "friends");
    assert_eq!(app.status_of(&bob, "alice").await, "friends");

    let (code, _) = app
        .call("POST", "/api/friends/chat/bob", Some(&alice), Some(json!({ "content": "hello" })))
        .await;
    assert_eq!(code, StatusCode::CREATED);

    let (code, history) = app.call("GET", "/api/friends/chat/alice", Some(&bob), None).await;
    assert_eq!(code, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["content"], "hello");
    assert_eq!(history[0]["sender"], "alice");

    let (code, body) = app
        .call("DELETE", "/api/friends/remove", Some(&alice), Some(json!({ "username": "bob" })))
        .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "removed");
    assert_eq!(app.status_of(&alice, "bob").await, "none");
    assert_eq!(app.status_of(&bob, "alice").await, "none");

    let (code, _) = app.call("GET", "/api/friends/chat/alice", Some(&bob), None).await;
    assert_eq!(code, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn repeated_follow_stays_pending() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    for _ in 0..2 {
        let (code, body) = app
            .call("POST", "/api/friends/follow", Some(&alice), Some(json!({ "username": "bob" })))
            .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "pending");
    }

    let (_, requests) = app.call("GET", "/api/friends/requests", Some(&bob), None).await;
    assert_eq!(requests.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_follow_and_respond_requests_are_rejected() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let (code, _) = app
        .call("POST", "/api/friends/follow", Some(&alice), Some(json!({ "username": "ghost" })))
        .await;
    assert_eq!(code, StatusCode::NOT_FOUND);

    let (code, _) = app
        .call("POST", "/api/friends/follow", Some(&alice), Some(json!({ "username": "alice" })))
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, body) = app
        .call(
            "POST",
            "/api/friends/respond",
            Some(&bob),
            Some(json!({ "username": "alice", "action": "accept" })),
        )
        .await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert!(body["detail"].is_string());

    let (code, _) = app
        .call(
            "POST",
            "/api/friends/respond",
            Some(&bob),
            Some(json!({ "username": "alice", "action": "block" })),
        )
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn already_friends_cannot_re_request() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    app.befriend(("alice", &alice), ("bob", &bob)).await;

    let (code, _) = app
        .call("POST", "/api/friends/follow", Some(&bob), Some(json!({ "username": "alice" })))
        .await;
    assert_eq!(code, StatusCode::CONFLICT);
}

#[tokio::test]
async fn declined_request_can_be_sent_again() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    app.call("POST", "/api/friends/follow", Some(&alice), Some(json!({ "username": "bob" })))
        .await;
    let (code, body) = app
        .call(
            "POST",
            "/api/friends/respond",
            Some(&bob),
            Some(json!({ "username": "alice", "action": "decline" })),
        )
        .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "declined");
    assert_eq!(app.status_of(&alice, "bob").await, "none");

    let (code, body) = app
        .call("POST", "/api/friends/follow", Some(&alice), Some(json!({ "username": "bob" })))
        .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["detail"], "Friend request re-sent");
    assert_eq!(app.status_of(&bob, "alice").await, "pending_incoming");
}

#[tokio::test]
async fn friend_list_shows_each_friend_once() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let carol = app.register("carol").await;
    app.befriend(("alice", &alice), ("bob", &bob)).await;
    app.befriend(("carol", &carol), ("alice", &alice)).await;

    let (code, list) = app.call("GET", "/api/friends/list", Some(&alice), None).await;
    assert_eq!(code, StatusCode::OK);
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["bob", "carol"]);

    let (_, bob_list) = app.call("GET", "/api/friends/list", Some(&bob), None).await;
    assert_eq!(bob_list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn search_finds_other_users() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    app.register("alicia").await;
    app.register("bob").await;

    let (code, found) = app.call("GET", "/api/friends/search?q=ali", Some(&alice), None).await;
    assert_eq!(code, StatusCode::OK);
    let names: Vec<&str> = found
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alicia"]);

    let (code, _) = app.call("GET", "/api/friends/search?q=%20", Some(&alice), None).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    let (code, _) = app.call("GET", "/api/friends/search?q=a&limit=51", Some(&alice), None).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn chat_requires_friendship() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let (code, body) = app
        .call("POST", "/api/friends/chat/bob", Some(&alice), Some(json!({ "content": "hi" })))
        .await;
    assert_eq!(code, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Can only chat with friends");

    app.befriend(("alice", &alice), ("bob", &bob)).await;
    let (code, body) = app
        .call("POST", "/api/friends/chat/bob", Some(&alice), Some(json!({ "content": "  hi  " })))
        .await;
    assert_eq!(code, StatusCode::CREATED);
    assert_eq!(body["content"], "hi");
}

#[tokio::test]
async fn blank_messages_are_rejected() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    app.befriend(("alice", &alice), ("bob", &bob)).await;

    let (code, _) = app
        .call("POST", "/api/friends/chat/bob", Some(&alice), Some(json!({ "content": " \n\t " })))
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, _) = app
        .call(
            "POST",
            "/api/friends/chat/bob",
            Some(&alice),
            Some(json!({ "content": "x".repeat(2001) })),
        )
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn messages_age_out_after_a_day() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    app.befriend(("alice", &alice), ("bob", &bob)).await;

    app.call("POST", "/api/friends/chat/bob", Some(&alice), Some(json!({ "content": "old" })))
        .await;
    app.clock.advance(chrono::Duration::hours(2));
    app.call("POST", "/api/friends/chat/alice", Some(&bob), Some(json!({ "content": "newer" })))
        .await;

    app.clock.advance(chrono::Duration::hours(21));
    let (_, history) = app.call("GET", "/api/friends/chat/bob", Some(&alice), None).await;
    let contents: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["old", "newer"]);

    app.clock.advance(chrono::Duration::hours(2));
    let (code, history) = app.call("GET", "/api/friends/chat/bob", Some(&alice), None).await;
    assert_eq!(code, StatusCode::OK);
    let contents: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["newer"]);
}

// =============================================================================
// Daily poem
// =============================================================================

#[tokio::test]
async fn daily_poem_is_generated_once() {
    let app = setup_app(false);

    let (code, first) = app.call("GET", "/api/daily/2024-02-29", None, None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(first["available"], true);
    assert_eq!(first["date"], "2024-02-29");

    let (_, second) = app.call("GET", "/api/daily/2024-02-29", None, None).await;
    assert_eq!(first, second);
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), 1);

    let (_, theme) = app.call("GET", "/api/daily/theme/2024-02-29", None, None).await;
    assert_eq!(theme["theme"], first["theme"]);
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn leap_day_theme_differs_from_the_day_before() {
    let app = setup_app(false);
    let (_, leap) = app.call("GET", "/api/daily/theme/2024-02-29", None, None).await;
    let (_, before) = app.call("GET", "/api/daily/theme/2024-02-28", None, None).await;
    assert_ne!(leap["theme"], before["theme"]);
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_dates_are_rejected() {
    let app = setup_app(false);
    for uri in ["/api/daily/2024-13-01", "/api/daily/yesterday", "/api/daily/theme/2024-2-3"] {
        let (code, _) = app.call("GET", uri, None, None).await;
        assert_eq!(code, StatusCode::BAD_REQUEST, "{uri}");
    }
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn generation_failure_returns_theme_only() {
    let app = setup_app(true);

    let (code, body) = app.call("GET", "/api/daily/2024-07-04", None, None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["available"], false);
    assert!(body["title"].is_null());
    assert!(body["theme"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn regenerate_requires_auth_and_calls_the_generator() {
    let app = setup_app(false);
    let alice = app.register("alice").await;

    app.call("GET", "/api/daily/2024-01-01", None, None).await;
    let (code, _) = app.call("POST", "/api/daily/2024-01-01/regenerate", None, None).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);

    let (code, body) = app
        .call("POST", "/api/daily/2024-01-01/regenerate", Some(&alice), None)
        .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["available"], true);
    assert_eq!(app.generator.calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Auth
// =============================================================================

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = setup_app(false);

    let (code, _) = app.call("GET", "/api/friends/list", None, None).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
    let (code, _) = app.call("GET", "/api/friends/list", Some("not-a-jwt"), None).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_and_login() {
    let app = setup_app(false);
    app.register("alice").await;

    let (code, _) = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "alice", "password": "another one" })),
        )
        .await;
    assert_eq!(code, StatusCode::CONFLICT);

    let (code, body) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "correct horse" })),
        )
        .await;
    assert_eq!(code, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();
    let (code, _) = app.call("GET", "/api/friends/list", Some(&token), None).await;
    assert_eq!(code, StatusCode::OK);

    let (code, _) = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong horse" })),
        )
        .await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_of_one_name_yield_one_account() {
    let app = Arc::new(setup_app(false));

    let mut handles = Vec::new();
    for i in 0..4 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let body = json!({ "username": "alice", "password": format!("password-{i}") });
            app.call("POST", "/api/auth/register", None, Some(body)).await
        }));
    }

    let mut codes = Vec::new();
    for handle in handles {
        let (code, body) = handle.await.unwrap();
        if code == StatusCode::CONFLICT {
            assert_eq!(body["detail"], "Username already taken");
        }
        codes.push(code.as_u16());
    }
    codes.sort_unstable();
    assert_eq!(codes, vec![201, 409, 409, 409]);
}

#[tokio::test]
async fn token_for_unknown_user_is_unauthorized() {
    let app = setup_app(false);
    app.register("bob").await;

    let claims = Claims {
        sub: Uuid::new_v4(),
        username: "ghost".into(),
        exp: (Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap();

    let (code, body) = app
        .call("POST", "/api/friends/follow", Some(&token), Some(json!({ "username": "bob" })))
        .await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn malformed_bodies_get_a_detail_message() {
    let app = setup_app(false);
    let alice = app.register("alice").await;
    app.register("bob").await;

    let (code, body) = app
        .call("POST", "/api/friends/respond", Some(&alice), Some(json!({ "username": "bob" })))
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (code, body) = app
        .call("POST", "/api/friends/chat/bob", Some(&alice), Some(json!({ "text": "hi" })))
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (code, body) = app
        .call("GET", "/api/friends/search?q=bo&limit=many", Some(&alice), None)
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (code, body) = app
        .call("POST", "/api/auth/login", None, Some(json!({ "username": "alice" })))
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn health_is_public() {
    let app = setup_app(false);
    let (code, body) = app.call("GET", "/health", None, None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

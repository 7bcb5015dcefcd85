use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use hush_api::{AppState, AppStateInner, Mailer};
use hush_auth::{SystemClock, TokenConfig, TokenService};
use hush_crypto::{MessageCipher, UNDECRYPTABLE_PLACEHOLDER};
use hush_db::{ChatStore, Database};
use hush_gateway::{ChatGateway, Dispatcher};

#[derive(Default)]
struct RecordingMailer {
    codes: Mutex<Vec<(String, u32)>>,
    resets: Mutex<Vec<(String, String)>>,
}

impl Mailer for RecordingMailer {
    fn send_activation_code(&self, email: &str, code: u32) -> anyhow::Result<()> {
        self.codes.lock().unwrap().push((email.to_string(), code));
        Ok(())
    }

    fn send_password_reset(&self, email: &str, token: &str) -> anyhow::Result<()> {
        self.resets.lock().unwrap().push((email.to_string(), token.to_string()));
        Ok(())
    }
}

impl RecordingMailer {
    fn last_code(&self) -> u32 {
        self.codes.lock().unwrap().last().unwrap().1
    }

    fn last_reset(&self) -> Option<String> {
        self.resets.lock().unwrap().last().map(|(_, t)| t.clone())
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    mailer: Arc<RecordingMailer>,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    fn refresh_cookie(&self) -> String {
        let raw = self
            .headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("refresh_token="))
            .expect("refresh cookie set");
        raw.split(';').next().unwrap().to_string()
    }

    fn access_token(&self) -> String {
        self.body["accessToken"].as_str().unwrap().to_string()
    }
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let tokens = TokenService::new(
            TokenConfig::new("access-secret", "refresh-secret"),
            db.clone(),
            Arc::new(SystemClock),
        );
        let cipher = MessageCipher::new("integration passphrase").unwrap();
        let gateway = ChatGateway::new(Dispatcher::new(), db.clone(), cipher.clone(), tokens.clone());
        let mailer = Arc::new(RecordingMailer::default());

        let state: AppState = Arc::new(AppStateInner {
            db,
            tokens,
            cipher,
            gateway,
            mailer: mailer.clone(),
            cookie_secure: false,
        });

        Self {
            router: hush_api::router(state.clone()),
            state,
            mailer,
        }
    }

    async fn call(&self, req: Request<Body>) -> Reply {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn post(&self, uri: &str, body: Value, bearer: Option<&str>) -> Reply {
        let mut req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.call(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, bearer: &str) -> Reply {
        let req = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap();
        self.call(req).await
    }

    async fn refresh_with(&self, cookie: &str) -> Reply {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/auth/refresh")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        self.call(req).await
    }

    async fn signup(&self, nickname: &str) -> Reply {
        let reply = self
            .post(
                "/auth/signup",
                json!({
                    "email": format!("{nickname}@example.com"),
                    "password": "correct horse",
                    "firstName": nickname,
                    "lastName": "Tester",
                    "nickname": nickname,
                }),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
        reply
    }
}

#[tokio::test]
async fn signup_returns_token_and_sets_refresh_cookie() {
    let app = TestApp::new();
    let reply = app.signup("ada").await;

    assert_eq!(reply.body["isActivated"], json!(false));
    assert_eq!(reply.body["user"]["email"], json!("ada@example.com"));
    assert!(reply.body.get("refreshToken").is_none());

    let cookie = reply
        .headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/auth"));
    assert!(cookie.contains("Max-Age=604800"));

    assert_eq!(app.mailer.codes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let app = TestApp::new();
    app.signup("ada").await;

    let reply = app
        .post(
            "/auth/signup",
            json!({
                "email": "ADA@example.com",
                "password": "another password",
                "firstName": "Ada",
                "lastName": "Again",
                "nickname": "ada2",
            }),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn activation_code_is_single_use() {
    let app = TestApp::new();
    let token = app.signup("ada").await.access_token();
    let code = app.mailer.last_code();

    let wrong = if code == 999_999 { 100_000 } else { code + 1 };
    let reply = app
        .post("/auth/activate", json!({ "code": wrong.to_string() }), Some(&token))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        reply.body,
        json!({ "message": "Invalid or expired code", "status": 400 })
    );

    let reply = app
        .post("/auth/activate", json!({ "code": code.to_string() }), Some(&token))
        .await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = app
        .post("/auth/activate", json!({ "code": code.to_string() }), Some(&token))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn resend_replaces_the_pending_code() {
    let app = TestApp::new();
    let token = app.signup("ada").await.access_token();
    let first = app.mailer.last_code();

    let reply = app.post("/auth/otp/resend", json!({}), Some(&token)).await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    let second = app.mailer.last_code();

    if first != second {
        let reply = app
            .post("/auth/activate", json!({ "code": first.to_string() }), Some(&token))
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }
    let reply = app
        .post("/auth/activate", json!({ "code": second.to_string() }), Some(&token))
        .await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn login_checks_password() {
    let app = TestApp::new();
    app.signup("ada").await;

    let reply = app
        .post(
            "/auth/login",
            json!({ "email": "ada@example.com", "password": "wrong password" }),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = app
        .post(
            "/auth/login",
            json!({ "email": "ada@example.com", "password": "correct horse" }),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(!reply.access_token().is_empty());
}

#[tokio::test]
async fn refresh_rotates_and_old_cookie_dies() {
    let app = TestApp::new();
    let old_cookie = app.signup("ada").await.refresh_cookie();

    let reply = app.refresh_with(&old_cookie).await;
    assert_eq!(reply.status, StatusCode::OK);
    let new_cookie = reply.refresh_cookie();
    assert_ne!(new_cookie, old_cookie);

    assert_eq!(app.refresh_with(&old_cookie).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.refresh_with(&new_cookie).await.status, StatusCode::OK);
}

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = TestApp::new();
    let signup = app.signup("ada").await;
    let cookie = signup.refresh_cookie();

    let reply = app
        .post("/auth/logout", json!({}), Some(&signup.access_token()))
        .await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    assert_eq!(app.refresh_with(&cookie).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_require_a_valid_access_token() {
    let app = TestApp::new();

    let reply = app.get("/chats", "not-a-token").await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body, json!({ "message": "Please log in", "status": 401 }));

    // A refresh token is not an access token.
    let cookie = app.signup("ada").await.refresh_cookie();
    let refresh_token = cookie.trim_start_matches("refresh_token=");
    assert_eq!(app.get("/chats", refresh_token).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn history_is_decrypted_with_placeholder_for_damaged_rows() {
    let app = TestApp::new();
    let ada = app.signup("ada").await;
    let bob = app.signup("bob").await;
    let ada_id = ada.body["user"]["id"].as_str().unwrap().parse().unwrap();
    let bob_id = bob.body["user"]["id"].as_str().unwrap().parse().unwrap();

    let chat = app.state.db.get_or_create_direct_chat(ada_id, bob_id).unwrap();
    let hello = app.state.cipher.encrypt("hello").unwrap();
    app.state.db.insert_message(chat.id, ada_id, &hello).unwrap();
    app.state
        .db
        .insert_message(chat.id, bob_id, "bm90IGFuIGVudmVsb3Bl")
        .unwrap();

    let reply = app
        .get(&format!("/chats/{}/messages", chat.id), &bob.access_token())
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let texts: Vec<&str> = reply
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["messageText"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["hello", UNDECRYPTABLE_PLACEHOLDER]);
}

#[tokio::test]
async fn history_pages_backwards_from_a_message_id() {
    let app = TestApp::new();
    let ada = app.signup("ada").await;
    let bob = app.signup("bob").await;
    let ada_id = ada.body["user"]["id"].as_str().unwrap().parse().unwrap();
    let bob_id = bob.body["user"]["id"].as_str().unwrap().parse().unwrap();

    let chat = app.state.db.get_or_create_direct_chat(ada_id, bob_id).unwrap();
    for text in ["one", "two", "three"] {
        let ciphertext = app.state.cipher.encrypt(text).unwrap();
        app.state.db.insert_message(chat.id, ada_id, &ciphertext).unwrap();
    }

    let texts = |reply: &Reply| -> Vec<String> {
        reply
            .body
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["messageText"].as_str().unwrap().to_string())
            .collect()
    };

    let latest = app
        .get(&format!("/chats/{}/messages?limit=2", chat.id), &bob.access_token())
        .await;
    assert_eq!(latest.status, StatusCode::OK);
    assert_eq!(texts(&latest), ["two", "three"]);

    let oldest_shown = latest.body[0]["id"].as_str().unwrap();
    let older = app
        .get(
            &format!("/chats/{}/messages?limit=2&before={}", chat.id, oldest_shown),
            &bob.access_token(),
        )
        .await;
    assert_eq!(older.status, StatusCode::OK);
    assert_eq!(texts(&older), ["one"]);
}

#[tokio::test]
async fn history_is_members_only() {
    let app = TestApp::new();
    let ada = app.signup("ada").await;
    let bob = app.signup("bob").await;
    let eve = app.signup("eve").await;
    let ada_id = ada.body["user"]["id"].as_str().unwrap().parse().unwrap();
    let bob_id = bob.body["user"]["id"].as_str().unwrap().parse().unwrap();

    let chat = app.state.db.get_or_create_direct_chat(ada_id, bob_id).unwrap();

    let reply = app
        .get(&format!("/chats/{}/messages", chat.id), &eve.access_token())
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = app
        .get(&format!("/chats/{}/messages", uuid::Uuid::new_v4()), &eve.access_token())
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_list_carries_decrypted_preview() {
    let app = TestApp::new();
    let ada = app.signup("ada").await;
    let bob = app.signup("bob").await;
    let ada_id = ada.body["user"]["id"].as_str().unwrap().parse().unwrap();
    let bob_id = bob.body["user"]["id"].as_str().unwrap().parse().unwrap();

    let chat = app.state.db.get_or_create_direct_chat(ada_id, bob_id).unwrap();
    for text in ["first", "latest"] {
        let ciphertext = app.state.cipher.encrypt(text).unwrap();
        app.state.db.insert_message(chat.id, ada_id, &ciphertext).unwrap();
    }

    let reply = app.get("/chats", &bob.access_token()).await;
    assert_eq!(reply.status, StatusCode::OK);

    let chats = reply.body.as_array().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["id"], json!(chat.id.to_string()));
    assert_eq!(chats[0]["messages"][0]["messageText"], json!("latest"));
}

#[tokio::test]
async fn password_reset_flow() {
    let app = TestApp::new();
    let cookie = app.signup("ada").await.refresh_cookie();

    let reply = app
        .post("/auth/password/forgot", json!({ "email": "nobody@example.com" }), None)
        .await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert!(app.mailer.last_reset().is_none());

    let reply = app
        .post("/auth/password/forgot", json!({ "email": "ada@example.com" }), None)
        .await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    let token = app.mailer.last_reset().unwrap();

    let reset = json!({
        "email": "ada@example.com",
        "token": token,
        "password": "brand new password",
    });
    assert_eq!(
        app.post("/auth/password/reset", reset.clone(), None).await.status,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        app.post("/auth/password/reset", reset, None).await.status,
        StatusCode::BAD_REQUEST
    );

    // Old sessions are gone; the new password works.
    assert_eq!(app.refresh_with(&cookie).await.status, StatusCode::UNAUTHORIZED);
    let reply = app
        .post(
            "/auth/login",
            json!({ "email": "ada@example.com", "password": "brand new password" }),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    assert_eq!(app.call(req).await.status, StatusCode::OK);
}

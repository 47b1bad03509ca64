//! Integration test: build the router with a pinned key set, an in-memory
//! store and a recording completion client, then drive the token exchange
//! and chat endpoints end to end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use aiwaah_api::config::ApiConfig;
use aiwaah_api::{AppState, router};
use aiwaah_core::auth::external::ExternalVerifierConfig;
use aiwaah_core::auth::jwks::{KeySetCache, StaticKeySetSource};
use aiwaah_core::auth::session::{SESSION_ISSUER, SessionIssuer};
use aiwaah_core::completion::{ChatMessage, CompletionClient, CompletionError, OpenAiConfig, PromptRole};
use aiwaah_core::memory::{InMemoryStore, MemoryError, MemoryStore};
use aiwaah_core::models::auth::{ExternalIdentity, SessionClaims};
use aiwaah_core::models::memory::{MemoryTurn, TurnRole};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Value, json};
use tower::ServiceExt;

const JWKS: &str = include_str!("../../aiwaah_core/tests/fixtures/idp_jwks.json");
const IDP_KEY: &str = include_str!("../../aiwaah_core/tests/fixtures/idp_signing_key.pem");
const ISSUER: &str = "https://login.example.com/";
const SECRET: &str = "integration-test-secret";
const SYSTEM: &str = "You are a test genie.";

/// Completion client that records every prompt it receives.
#[derive(Default)]
struct RecordingCompletion {
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
    fail: bool,
}

impl RecordingCompletion {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for RecordingCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if self.fail {
            return Err(CompletionError::Unavailable("connection reset".into()));
        }
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(format!("Wisdom about: {last}"))
    }
}

/// Store whose writes always fail.
struct ReadOnlyStore;

#[async_trait]
impl MemoryStore for ReadOnlyStore {
    async fn append(
        &self,
        _subject: &str,
        _role: TurnRole,
        _content: &str,
    ) -> Result<MemoryTurn, MemoryError> {
        Err(MemoryError::Unavailable("read-only replica".into()))
    }

    async fn recent(&self, _subject: &str, _limit: usize) -> Result<Vec<MemoryTurn>, MemoryError> {
        Ok(Vec::new())
    }
}

fn config() -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: None,
        session_secret: SECRET.into(),
        idp: ExternalVerifierConfig::new(ISSUER),
        jwks_url: None,
        openai: OpenAiConfig {
            api_key: None,
            model: "test-model".into(),
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(1),
        },
        system_prompt: SYSTEM.into(),
        cors_allowed_origins: vec!["https://aiwaah-website.vercel.app".into()],
        history_limit: 6,
        outbound_timeout: Duration::from_secs(1),
    }
}

fn app_with(store: Arc<dyn MemoryStore>, completion: Arc<RecordingCompletion>) -> Router {
    let keys = Arc::new(KeySetCache::new(Arc::new(
        StaticKeySetSource::from_json(JWKS).unwrap(),
    )));
    let state = AppState::new(config(), keys, store, completion).unwrap();
    router(state)
}

fn app(completion: Arc<RecordingCompletion>) -> Router {
    app_with(Arc::new(InMemoryStore::new()), completion)
}

fn external_token(sub: &str, email: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = json!({
        "sub": sub,
        "email": email,
        "iss": ISSUER,
        "iat": now,
        "exp": now + 600,
        "ext": {"idp": "google-oauth2"}
    });
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("test-key-1".into());
    let key = EncodingKey::from_rsa_pem(IDP_KEY.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, &claims, &key).unwrap()
}

fn decode_session(token: &str) -> SessionClaims {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    jsonwebtoken::decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(SECRET.as_bytes()),
        &validation,
    )
    .unwrap()
    .claims
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("parse JSON")
    };
    (status, json)
}

fn exchange_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/ciam/exchange");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn chat_request(token: Option<&str>, message: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/aiwaah")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(json!({ "message": message }).to_string()))
        .unwrap()
}

fn history_request(token: &str) -> Request<Body> {
    Request::builder()
        .uri("/aiwaah/history")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn exchange(app: &Router, sub: &str) -> String {
    let (status, json) = send(app, exchange_request(Some(&external_token(sub, "a@b.com")))).await;
    assert_eq!(status, StatusCode::OK, "exchange failed: {json}");
    json["aiwaah_token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn exchange_then_chat_end_to_end() {
    let completion = Arc::new(RecordingCompletion::default());
    let app = app(completion.clone());

    // Exchange the IdP token for a session token.
    let session = exchange(&app, "u1").await;
    let claims = decode_session(&session);
    assert_eq!(claims.sub, "u1");
    assert_eq!(claims.email.as_deref(), Some("a@b.com"));
    assert_eq!(claims.roles, vec!["user".to_string()]);
    assert_eq!(claims.idp, "google-oauth2");
    assert_eq!(claims.iss, SESSION_ISSUER);
    assert_eq!(claims.exp - claims.iat, 3600);

    // First chat turn: empty history, prompt is system + user only.
    let (status, json) = send(&app, chat_request(Some(&session), "What is an RRSP?")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reply"], "Wisdom about: What is an RRSP?");

    let prompts = completion.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(
        prompts[0],
        vec![
            ChatMessage::new(PromptRole::System, SYSTEM),
            ChatMessage::new(PromptRole::User, "What is an RRSP?"),
        ]
    );

    // Second turn replays the stored exchange, oldest first.
    let (status, _) = send(&app, chat_request(Some(&session), "And a TFSA?")).await;
    assert_eq!(status, StatusCode::OK);
    let second = &completion.prompts()[1];
    let roles: Vec<PromptRole> = second.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            PromptRole::System,
            PromptRole::User,
            PromptRole::Assistant,
            PromptRole::User
        ]
    );
    assert_eq!(second[1].content, "What is an RRSP?");
    assert_eq!(second[3].content, "And a TFSA?");

    // History listing reflects all four turns.
    let (status, json) = send(&app, history_request(&session)).await;
    assert_eq!(status, StatusCode::OK);
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
    assert!(messages[0]["createdAt"].is_string());
}

#[tokio::test]
async fn memory_is_scoped_per_subject() {
    let completion = Arc::new(RecordingCompletion::default());
    let app = app(completion.clone());

    let alice = exchange(&app, "alice").await;
    let bob = exchange(&app, "bob").await;

    send(&app, chat_request(Some(&alice), "alice's secret plan")).await;
    let (status, _) = send(&app, chat_request(Some(&bob), "hello")).await;
    assert_eq!(status, StatusCode::OK);

    // Bob's prompt carries none of Alice's turns.
    let bob_prompt = &completion.prompts()[1];
    assert_eq!(bob_prompt.len(), 2);
    assert!(bob_prompt.iter().all(|m| !m.content.contains("alice")));

    let (_, json) = send(&app, history_request(&bob)).await;
    assert_eq!(json["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn exchange_without_header_is_unauthorized() {
    let app = app(Arc::new(RecordingCompletion::default()));
    let (status, json) = send(&app, exchange_request(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn exchange_with_unverifiable_token_is_unauthorized() {
    let app = app(Arc::new(RecordingCompletion::default()));

    let (status, _) = send(&app, exchange_request(Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A session token is not an IdP token.
    let session = exchange(&app, "u1").await;
    let (status, _) = send(&app, exchange_request(Some(&session))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_requires_a_valid_session_token() {
    let completion = Arc::new(RecordingCompletion::default());
    let app = app(completion.clone());

    let (status, _) = send(&app, chat_request(None, "hi")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The external token itself is not accepted on the chat endpoint.
    let external = external_token("u1", "a@b.com");
    let (status, _) = send(&app, chat_request(Some(&external), "hi")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Nothing reached the model.
    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn expired_session_token_is_unauthorized() {
    let completion = Arc::new(RecordingCompletion::default());
    let app = app(completion.clone());

    let identity = ExternalIdentity {
        subject: "u1".into(),
        email: None,
        provider: "google-oauth2".into(),
        issued_at: None,
        expires_at: chrono::Utc::now(),
    };
    let long_ago = chrono::Utc::now() - chrono::Duration::hours(2);
    let expired = SessionIssuer::new(SECRET.as_bytes())
        .sign(&SessionIssuer::claims_for(&identity, long_ago))
        .unwrap();

    let (status, _) = send(&app, chat_request(Some(&expired), "hi")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let completion = Arc::new(RecordingCompletion::default());
    let app = app(completion.clone());
    let session = exchange(&app, "u1").await;

    let (status, json) = send(&app, chat_request(Some(&session), "   ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn completion_failure_is_bad_gateway_and_not_persisted() {
    let app = app(Arc::new(RecordingCompletion::failing()));
    let session = exchange(&app, "u1").await;

    let (status, json) = send(&app, chat_request(Some(&session), "hi")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!json["message"].as_str().unwrap().contains("connection reset"));

    let (_, json) = send(&app, history_request(&session)).await;
    assert!(json["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reply_survives_memory_write_failure() {
    let completion = Arc::new(RecordingCompletion::default());
    let app = app_with(Arc::new(ReadOnlyStore), completion.clone());
    let session = exchange(&app, "u1").await;

    let (status, json) = send(&app, chat_request(Some(&session), "hi")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reply"], "Wisdom about: hi");
}

#[tokio::test]
async fn health_is_public() {
    let app = app(Arc::new(RecordingCompletion::default()));
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

fn raw_chat_request(token: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/aiwaah")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn malformed_chat_body_gets_json_error() {
    let completion = Arc::new(RecordingCompletion::default());
    let app = app(completion.clone());
    let session = exchange(&app, "u1").await;

    let (status, json) = send(&app, raw_chat_request(&session, "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
    assert!(!json["message"].as_str().unwrap().contains("line 1"));
    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn chat_body_without_message_gets_json_error() {
    let completion = Arc::new(RecordingCompletion::default());
    let app = app(completion.clone());
    let session = exchange(&app, "u1").await;

    let (status, json) = send(&app, raw_chat_request(&session, "{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn bad_history_limit_gets_json_error() {
    let app = app(Arc::new(RecordingCompletion::default()));
    let session = exchange(&app, "u1").await;

    let req = Request::builder()
        .uri("/aiwaah/history?limit=lots")
        .header(header::AUTHORIZATION, format!("Bearer {session}"))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

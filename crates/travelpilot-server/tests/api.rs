use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use travelpilot::agents::{Agent, AgentError, AgentFactory};
use travelpilot::session::{InMemorySessionStore, SessionStore};
use travelpilot_server::configuration::Settings;
use travelpilot_server::{routes, AppState};

/// Answers with the prompt it was given, or fails when asked to
struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        if prompt.ends_with("fail") {
            return Err(AgentError::Execution("tool server crashed".to_string()));
        }
        Ok(format!("echo: {}", prompt))
    }
}

#[derive(Default)]
struct EchoFactory {
    created: AtomicUsize,
}

#[async_trait]
impl AgentFactory for EchoFactory {
    async fn create(&self) -> Result<Arc<dyn Agent>, AgentError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(EchoAgent))
    }
}

struct MissingKeyFactory;

#[async_trait]
impl AgentFactory for MissingKeyFactory {
    async fn create(&self) -> Result<Arc<dyn Agent>, AgentError> {
        Err(AgentError::Configuration(
            "GOOGLE_API_KEY is not set".to_string(),
        ))
    }
}

fn app(factory: Arc<dyn AgentFactory>) -> Router {
    app_with_store(factory).0
}

fn app_with_store(factory: Arc<dyn AgentFactory>) -> (Router, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new(factory));
    let state = AppState::new(store.clone());
    let origins = Settings::default().cors_origins().unwrap();
    (routes::configure(state).layer(routes::cors(origins)), store)
}

fn post_chat(body: Value) -> Request<Body> {
    Request::builder()
        .uri("/chat")
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let factory = Arc::new(EchoFactory::default());
    let (app, store) = app_with_store(factory.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    // health never builds an agent or a session
    assert_eq!(store.len(), 0);
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_chat_creates_then_continues_session() {
    let factory = Arc::new(EchoFactory::default());
    let app = app(factory.clone());

    let response = app
        .clone()
        .oneshot(post_chat(json!({ "message": "Stays in Goa" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = json_body(response).await;
    assert_eq!(first["response"], "echo: Stays in Goa");
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(post_chat(
            json!({ "message": "Cheaper?", "session_id": &session_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second = json_body(response).await;
    assert_eq!(second["session_id"], session_id.as_str());

    let answer = second["response"].as_str().unwrap();
    assert!(answer.starts_with(
        "echo: Previous conversation history:\nUser: Stays in Goa\nAI: echo: Stays in Goa\n"
    ));
    assert!(answer.ends_with("Current User Request: Cheaper?"));
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_null_session_id_starts_new_session() {
    let response = app(Arc::new(EchoFactory::default()))
        .oneshot(post_chat(json!({ "message": "Hi", "session_id": null })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["response"], "echo: Hi");
    assert!(!body["session_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_agent_failure_is_500_with_detail() {
    let response = app(Arc::new(EchoFactory::default()))
        .oneshot(post_chat(json!({ "message": "please fail" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({ "detail": "Agent execution failed: tool server crashed" })
    );
}

#[tokio::test]
async fn test_missing_key_is_500_with_detail() {
    let response = app(Arc::new(MissingKeyFactory))
        .oneshot(post_chat(json!({ "message": "Hi" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({ "detail": "Failed to initialize agent: Configuration error: GOOGLE_API_KEY is not set" })
    );
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = app(Arc::new(EchoFactory::default()));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/chat")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());

    let response = app
        .oneshot(post_chat(json!({ "session_id": "abc" })))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_cors_preflight_for_allowed_origin() {
    let response = app(Arc::new(EchoFactory::default()))
        .oneshot(
            Request::builder()
                .uri("/chat")
                .method(Method::OPTIONS)
                .header(header::ORIGIN, "https://travel-pilot.vercel.app")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://travel-pilot.vercel.app"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "content-type");
}

#[tokio::test]
async fn test_cors_ignores_unknown_origin() {
    let response = app(Arc::new(EchoFactory::default()))
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://evil.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

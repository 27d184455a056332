#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use moviedb::config::{config_from_str, ConfigV1};
use moviedb::mailer::{Mailer, MailerError, Message};
use moviedb::routes::create_router;
use moviedb::state::AppState;
use moviedb::store::{MemoryStore, PermissionStore};
use moviedb::utils::clock::ManualClock;
use moviedb::utils::deadline::Deadline;
use serde_json::{json, Value};
use tower::ServiceExt;

pub const TEST_CONFIG: &str = r#"
version: "1.0.0"
bind_address: 127.0.0.1:8081
environment: testing
logging:
  level: "debug"
  format: "json"
store:
  type: memory
storage_timeout_ms: 3000
tokens:
  activation_ttl_secs: 259200
  authorization_ttl_secs: 86400
"#;

pub const PASSWORD: &str = "pa55word1234";

pub fn load_test_config() -> ConfigV1 {
    config_from_str(TEST_CONFIG).expect("Failed to parse test config YAML")
}

/// Keeps every message instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, Message)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, message: &Message) -> Result<(), MailerError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.clone()));
        Ok(())
    }
}

impl RecordingMailer {
    pub fn sent_to(&self, recipient: &str) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == recipient)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingMailer>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn build_app() -> TestApp {
    let config = Arc::new(load_test_config());
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let mailer = Arc::new(RecordingMailer::default());

    let state = AppState::new(config, store.clone(), clock.clone(), mailer.clone());

    TestApp {
        router: create_router(state),
        store,
        clock,
        mailer,
    }
}

fn activation_token(message: &Message) -> String {
    match message {
        Message::Welcome {
            activation_token, ..
        }
        | Message::Activation { activation_token } => activation_token.clone(),
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        self.request_with_headers(method, path, token, &[], body).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request should complete");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should be readable")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Waits for the background mailer and returns the newest activation token sent to `email`.
    pub async fn latest_activation_token(&self, email: &str, expected_count: usize) -> String {
        for _ in 0..100 {
            let sent = self.mailer.sent_to(email);
            if sent.len() >= expected_count {
                return activation_token(sent.last().expect("at least one message"));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no activation mail was sent to {}", email);
    }

    pub async fn register(&self, name: &str, email: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({ "name": name, "email": email, "password": PASSWORD })),
        )
        .await
    }

    pub async fn activate(&self, token: &str) -> TestResponse {
        self.request(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(json!({ "token": token })),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Registers, activates and logs in a user, granting `extra` permissions on top of
    /// the registration default. Returns the authentication token.
    pub async fn signed_in_user(&self, email: &str, extra: &[&str]) -> String {
        let registered = self.register("Test User", email).await;
        assert_eq!(registered.status, StatusCode::ACCEPTED);
        let user_id = registered.body["user"]["id"].as_i64().expect("user id");

        let activation = self.latest_activation_token(email, 1).await;
        assert_eq!(self.activate(&activation).await.status, StatusCode::OK);

        if !extra.is_empty() {
            self.store
                .add_permissions_for_user(Deadline::after(Duration::from_secs(3)), user_id, extra)
                .await
                .expect("grant permissions");
        }

        let login = self.login(email, PASSWORD).await;
        assert_eq!(login.status, StatusCode::CREATED);
        login.body["authentication_token"]["token"]
            .as_str()
            .expect("token in body")
            .to_string()
    }
}

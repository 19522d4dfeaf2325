//! Shared harness for router-level tests.
//!
//! Every test gets a router over fresh in-memory stores, a recording mailer,
//! a recording image host and a stub identity provider.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use lostfound_api::services::{IdentityProvider, IdentityUser};
use lostfound_api::{build_router, AppConfig, AppState, StoreBackend};
use lostfound_core::{Error, Result, SessionRole};
use lostfound_db::Stores;
use lostfound_media::{ImageHost, ImageUpload, StoredImage};
use lostfound_notify::{EmailMessage, RecordingMailer};

pub const PNG: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

pub const GOOD_ID_TOKEN: &str = "id-token-ok";

/// Image host that hands out predictable URLs.
#[derive(Default)]
pub struct RecordingImageHost {
    uploads: AtomicUsize,
}

impl RecordingImageHost {
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageHost for RecordingImageHost {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StoredImage {
            url: format!("https://img.test/lost-and-found/{}.{}", n, image.extension),
            public_id: format!("lost-and-found/{}", n),
        })
    }
}

/// Accepts exactly [`GOOD_ID_TOKEN`].
pub struct StubIdentity;

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn verify(&self, id_token: &str) -> Result<IdentityUser> {
        if id_token != GOOD_ID_TOKEN {
            return Err(Error::Identity("INVALID_ID_TOKEN".to_string()));
        }
        Ok(IdentityUser {
            email: Some("lena@campus.edu".to_string()),
            uid: "uid-123".to_string(),
            name: Some("Lena".to_string()),
            picture: None,
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: RecordingMailer,
    pub images: Arc<RecordingImageHost>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        store_backend: StoreBackend::Memory,
        rate_limit_enabled: false,
        ..AppConfig::default()
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config(), RecordingMailer::new())
}

pub fn spawn_app_with(config: AppConfig, mailer: RecordingMailer) -> TestApp {
    let images = Arc::new(RecordingImageHost::default());
    let state = AppState::new(
        config,
        Stores::in_memory(),
        Arc::new(mailer.clone()),
        images.clone(),
        Arc::new(StubIdentity),
    )
    .unwrap();
    TestApp {
        router: build_router(state.clone()),
        state,
        mailer,
        images,
    }
}

impl TestApp {
    /// Send a request and decode the body as JSON (or a JSON string when it
    /// is not JSON).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        body: Value,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        self.send(json_request(method, uri, body, token)).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn admin_token(&self) -> String {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/admin/login",
                serde_json::json!({ "username": "admin", "password": "admin123" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn user_token(&self, email: &str) -> String {
        let (token, _) = self
            .state
            .stores
            .sessions
            .create(SessionRole::User, email, chrono::Duration::hours(1))
            .await
            .unwrap();
        token
    }

    /// Submit a report without images and return its id.
    pub async fn submit(&self, item_type: &str, title: &str, email: &str) -> String {
        let request = MultipartForm::new()
            .text("title", title)
            .text("description", "Reported in tests")
            .text("type", item_type)
            .text("location", "Library")
            .text("submittedBy", "Tester")
            .text("userEmail", email)
            .into_request("/api/items");
        let (status, body) = self.send(request).await;
        assert_eq!(status, StatusCode::CREATED, "submit failed: {}", body);
        body["item"]["_id"].as_str().unwrap().to_string()
    }

    pub async fn moderate(&self, token: &str, id: &str, status: &str) -> (StatusCode, Value) {
        self.json(
            Method::PUT,
            &format!("/api/admin/items/{}/moderate", id),
            serde_json::json!({ "status": status }),
            Some(token),
        )
        .await
    }

    /// Submit and approve a report. Receipt emails are drained.
    pub async fn approved(&self, token: &str, item_type: &str, title: &str, email: &str) -> String {
        let id = self.submit(item_type, title, email).await;
        wait_for_mail(&self.mailer, email, 1).await;
        let (status, _) = self.moderate(token, &id, "approved").await;
        assert_eq!(status, StatusCode::OK);
        id
    }
}

pub fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Wait until `recipient` has received at least `count` messages.
pub async fn wait_for_mail(mailer: &RecordingMailer, recipient: &str, count: usize) -> Vec<EmailMessage> {
    for _ in 0..200 {
        let sent = mailer.sent_to(recipient);
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} message(s) to {}, got {:?}",
        count,
        recipient,
        mailer.sent_to(recipient)
    );
}

/// Give background tasks a chance to run, then return everything sent.
pub async fn settle(mailer: &RecordingMailer) -> Vec<EmailMessage> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    mailer.sent()
}

/// Minimal multipart/form-data encoder.
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: "lostfound-test-boundary".to_string(),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, filename, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", self.boundary),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

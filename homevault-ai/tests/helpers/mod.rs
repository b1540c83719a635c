//! Shared test utilities for homevault-ai integration tests
//!
//! Builds a full router over a temporary database, an in-memory blob store
//! and scripted model replies, plus multipart request builders.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, Response},
    Router,
};
use homevault_ai::config::ServiceConfig;
use homevault_ai::services::{BlobStore, GenerativeModel, InlineData, ModelError};
use homevault_ai::{AppState, StateParts};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::RwLock;
use tower::util::ServiceExt;

pub const PUBLIC_BASE_URL: &str = "http://localhost:5740";
pub const BOUNDARY: &str = "homevault-test-boundary";

/// Model returning queued replies in call order
///
/// `None` entries (and an exhausted queue without a fallback) fail with a 500.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Option<String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Option<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Answer every call with the same reply
    pub fn always(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, prompt: &str, _attachment: InlineData) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        match next.unwrap_or_else(|| self.fallback.clone()) {
            Some(reply) => Ok(reply),
            None => Err(ModelError::Status {
                status: 500,
                body: "model unavailable".into(),
            }),
        }
    }
}

/// Item analysis reply as the model would phrase it
pub fn item_reply(name: &str, amount: f64) -> String {
    format!(
        "```json\n{{\"name\": \"{}\", \"category\": \"electronics\", \"brand\": \"Acme\", \
         \"condition\": \"good\", \"estimatedValue\": {{\"amount\": {}, \"currency\": \"USD\"}}, \
         \"description\": \"Test item\", \"confidence\": 0.9}}\n```",
        name, amount
    )
}

/// Small JPEG-signed payload; `seed` makes the bytes (and content key) unique
pub fn jpeg_bytes(seed: u8) -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', seed]
}

/// Router plus the state behind it
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

impl TestApp {
    pub async fn new(
        image_model: Arc<dyn GenerativeModel>,
        policy_model: Arc<dyn GenerativeModel>,
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db = homevault_ai::db::init_database_pool(&temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let config = ServiceConfig {
            public_base_url: PUBLIC_BASE_URL.to_string(),
            ..Default::default()
        };

        let state = AppState::new(StateParts {
            db,
            config,
            blobs: BlobStore::memory(PUBLIC_BASE_URL).unwrap(),
            image_model,
            policy_model,
            api_key: Arc::new(RwLock::new(Some("test-key".to_string()))),
            max_lock_wait_ms: 1000,
            toml_path: None,
        });
        let router = homevault_ai::build_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// App whose models always fail
    pub async fn offline() -> Self {
        Self::new(ScriptedModel::new(vec![]), ScriptedModel::new(vec![])).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn send_json(&self, method: Method, uri: &str, body: Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

/// One part of a multipart form
pub enum Part {
    File {
        field: &'static str,
        filename: String,
        content_type: &'static str,
        bytes: Vec<u8>,
    },
    Text {
        field: &'static str,
        value: String,
    },
}

impl Part {
    pub fn file(
        field: &'static str,
        filename: &str,
        content_type: &'static str,
        bytes: Vec<u8>,
    ) -> Self {
        Part::File {
            field,
            filename: filename.to_string(),
            content_type,
            bytes,
        }
    }

    pub fn text(field: &'static str, value: &str) -> Self {
        Part::Text {
            field,
            value: value.to_string(),
        }
    }

    pub fn jpeg(field: &'static str, filename: &str, seed: u8) -> Self {
        Self::file(field, filename, "image/jpeg", jpeg_bytes(seed))
    }
}

pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                field,
                filename,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        field, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text { field, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", field, value)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_request(uri: &str, parts: &[Part]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `/batches/:id` until the batch is terminal
pub async fn wait_for_batch(app: &TestApp, batch_id: &str) -> Value {
    for _ in 0..200 {
        let status = body_json(app.get(&format!("/batches/{}", batch_id)).await).await;
        if status["state"] == "COMPLETED" || status["state"] == "FAILED" {
            return status;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("batch {} did not finish", batch_id);
}

/// Blob route for a public image URL
pub fn blob_uri(image_url: &str) -> String {
    image_url
        .strip_prefix(PUBLIC_BASE_URL)
        .unwrap_or(image_url)
        .to_string()
}

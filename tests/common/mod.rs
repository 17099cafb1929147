//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::panic)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use askdb::AgentError;
use askdb::agent::{ChatRequest, ChatResponse, LlmProvider, ModelBackend, ProviderFamily, ProviderRegistry, ToolCall};
use askdb::db::ConnectionParams;
use askdb::export::{ObjectStore, StoreError};

type Step = Box<dyn FnOnce(&ChatRequest) -> ChatResponse + Send>;

/// Provider that replays a fixed script of responses.
#[derive(Default)]
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response computed from the request it answers.
    pub fn then(self, step: impl FnOnce(&ChatRequest) -> ChatResponse + Send + 'static) -> Self {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(Box::new(step));
        }
        self
    }

    /// Queues a single tool call.
    pub fn then_call(self, id: &str, name: &str, arguments: serde_json::Value) -> Self {
        let call = ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        };
        self.then(move |_| ChatResponse {
            tool_calls: vec![call],
            finish_reason: Some("tool_calls".to_string()),
            ..usage(20, 5)
        })
    }

    /// Queues a final text answer.
    pub fn then_answer(self, text: &str) -> Self {
        let text = text.to_string();
        self.then(move |_| ChatResponse {
            content: text,
            finish_reason: Some("stop".to_string()),
            ..usage(30, 10)
        })
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let step = self.steps.lock().ok().and_then(|mut s| s.pop_front());
        step.map(|step| step(request)).ok_or_else(|| AgentError::ResponseParse {
            message: "script exhausted".to_string(),
        })
    }
}

fn usage(prompt: u32, completion: u32) -> ChatResponse {
    ChatResponse {
        usage: askdb::agent::TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        },
        ..ChatResponse::default()
    }
}

/// Registry with a single scripted `OpenAI` backend.
pub fn registry(provider: Arc<ScriptedProvider>) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::builder()
        .register(ModelBackend::new(ProviderFamily::OpenAi, "scripted"), provider)
        .and_then(askdb::agent::registry::ProviderRegistryBuilder::build)
        .unwrap_or_else(|e| panic!("registry: {e}"));
    Arc::new(registry)
}

/// A stored object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-memory object store.
#[derive(Default)]
pub struct RecordingStore {
    objects: Mutex<Vec<StoredObject>>,
}

impl RecordingStore {
    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Option<String>, StoreError> {
        if let Ok(mut objects) = self.objects.lock() {
            objects.push(StoredObject {
                key: key.to_string(),
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            });
        }
        Ok(None)
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://exports.example.test/{key}")
    }
}

/// Creates `shop.db` under `dir` with an `orders` table.
pub async fn shop_database(dir: &Path) -> PathBuf {
    let path = dir.join("shop.db");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap_or_else(|e| panic!("create sqlite: {e}"));

    for sql in [
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, status TEXT NOT NULL, total REAL NOT NULL)",
        "INSERT INTO orders (status, total) VALUES ('pending', 10.5), ('shipped', 20.0), ('pending', 7.25)",
    ] {
        sqlx::query(sql)
            .execute(&pool)
            .await
            .unwrap_or_else(|e| panic!("seed sqlite: {e}"));
    }
    pool.close().await;
    path
}

/// Connection parameters for a sqlite file.
pub fn sqlite_params(path: &Path) -> ConnectionParams {
    ConnectionParams {
        db_type: Some("sqlite".to_string()),
        database: Some(path.to_string_lossy().into_owned()),
        ..ConnectionParams::default()
    }
}

//! End-to-end turns against a real sqlite file with a scripted model.

#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{Value, json};
use tempfile::TempDir;

use askdb::agent::{AgentConfig, Orchestrator, PromptSet, TurnRequest, TurnResult, TurnUpdate};
use askdb::ErrorKind;

use common::{RecordingStore, ScriptedProvider, registry, shop_database, sqlite_params};

const COUNT_SQL: &str = "SELECT status, COUNT(*) AS n FROM orders GROUP BY status ORDER BY status";

fn config() -> AgentConfig {
    AgentConfig::builder()
        .default_database("shop")
        .build()
        .unwrap_or_else(|e| panic!("config: {e}"))
}

async fn collect(orchestrator: &Orchestrator, request: TurnRequest) -> (Vec<String>, TurnResult) {
    let mut stream = orchestrator.run_turn(request);
    let mut steps = Vec::new();
    let mut finished = None;
    while let Some(update) = stream.next().await {
        match update {
            TurnUpdate::Progress(event) => steps.push(event.step),
            TurnUpdate::Finished(result) => finished = Some(result),
        }
    }
    let result = finished.unwrap_or_else(|| panic!("turn ended without a result"));
    (steps, result)
}

#[tokio::test]
async fn test_count_by_status_answers_from_one_query() {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let db = shop_database(dir.path()).await;

    let provider = Arc::new(
        ScriptedProvider::new()
            .then_call("call_1", "execute_query", json!({ "query": COUNT_SQL }))
            .then_answer("There are 2 pending orders and 1 shipped order."),
    );
    let orchestrator =
        Orchestrator::new(registry(provider.clone()), config()).with_prompts(PromptSet::defaults());

    let (steps, result) = collect(
        &orchestrator,
        TurnRequest {
            thread_id: "t-count".to_string(),
            connection: sqlite_params(&db),
            user_message: "How many orders are in each status?".to_string(),
            ..TurnRequest::default()
        },
    )
    .await;

    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.thread_id, "t-count");
    assert_eq!(result.answer_text, "There are 2 pending orders and 1 shipped order.");
    assert_eq!(result.provider.as_deref(), Some("openai/scripted"));
    assert_eq!(result.usage.total_tokens, 65);

    assert_eq!(result.tool_invocations.len(), 1);
    let invocation = &result.tool_invocations[0];
    assert_eq!(invocation.tool_name, "execute_query");
    assert!(!invocation.is_error);
    let observed: Value =
        serde_json::from_str(&invocation.result).unwrap_or_else(|e| panic!("result json: {e}"));
    assert_eq!(observed["row_count"], 2);
    assert_eq!(observed["rows"][0]["status"], "pending");
    assert_eq!(observed["rows"][0]["n"], 2);

    assert_eq!(steps.first().map(String::as_str), Some("connecting"));
    assert!(steps.iter().any(|s| s == "tool_call:execute_query"));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let tools: Vec<&str> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert!(tools.contains(&"list_tables"));
    assert!(!tools.contains(&"excel_export"), "export offered without a store");
    assert!(requests[0].messages[0].content.contains("orders"));
}

#[tokio::test]
async fn test_export_turn_returns_download_link() {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let db = shop_database(dir.path()).await;
    let store = Arc::new(RecordingStore::default());

    let provider = Arc::new(
        ScriptedProvider::new()
            .then_call("call_1", "execute_query", json!({ "query": COUNT_SQL }))
            .then_call(
                "call_2",
                "excel_export",
                json!({
                    "data": [
                        { "status": "pending", "n": 2 },
                        { "status": "shipped", "n": 1 }
                    ],
                    "filename": "orders by status"
                }),
            )
            .then(|request| {
                let observation = request
                    .messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                let value: Value = serde_json::from_str(&observation).unwrap_or_default();
                let url = value["url"].as_str().unwrap_or("missing").to_string();
                askdb::agent::ChatResponse {
                    content: format!("Here is your spreadsheet: {url}"),
                    ..askdb::agent::ChatResponse::default()
                }
            }),
    );
    let orchestrator = Orchestrator::new(registry(provider.clone()), config())
        .with_prompts(PromptSet::defaults())
        .with_store(store.clone());

    let (_, result) = collect(
        &orchestrator,
        TurnRequest {
            thread_id: "t-export".to_string(),
            connection: sqlite_params(&db),
            data_source_id: Some("shop".to_string()),
            user_message: "Export the order counts by status to Excel".to_string(),
            ..TurnRequest::default()
        },
    )
    .await;

    assert!(result.error.is_none(), "{:?}", result.error);
    let names: Vec<&str> = result.tool_invocations.iter().map(|t| t.tool_name.as_str()).collect();
    assert_eq!(names, ["execute_query", "excel_export"]);

    let objects = store.objects();
    assert_eq!(objects.len(), 1);
    let object = &objects[0];
    assert!(object.key.starts_with("shop/reports/"), "{}", object.key);
    assert!(object.key.ends_with(".xlsx"), "{}", object.key);
    assert!(object.bytes.starts_with(b"PK"), "xlsx is a zip archive");

    let url = format!("https://exports.example.test/{}", object.key);
    assert!(result.answer_text.contains(&url), "{}", result.answer_text);

    let tools: Vec<String> = provider.requests()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert!(tools.iter().any(|t| t == "excel_export"));
}

#[tokio::test]
async fn test_missing_database_file_fails_before_the_model_runs() {
    let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let provider = Arc::new(ScriptedProvider::new().then_answer("unreachable"));
    let orchestrator =
        Orchestrator::new(registry(provider.clone()), config()).with_prompts(PromptSet::defaults());

    let (steps, result) = collect(
        &orchestrator,
        TurnRequest {
            thread_id: "t-missing".to_string(),
            connection: sqlite_params(&dir.path().join("absent.db")),
            user_message: "How many orders?".to_string(),
            ..TurnRequest::default()
        },
    )
    .await;

    let error = result.error.unwrap_or_else(|| panic!("expected a failed turn"));
    assert_eq!(error.kind, ErrorKind::Connectivity);
    assert!(result.tool_invocations.is_empty());
    assert!(provider.requests().is_empty());
    assert_eq!(steps.last().map(String::as_str), Some("error"));
}

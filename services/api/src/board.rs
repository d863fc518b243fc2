//! Client for the board service and the clinical tools built on it.
//!
//! The board service owns patient data. The voice backend reads it for
//! session context and writes to it through the tools the model can
//! call.

use anyhow::{Context, Result};
use async_trait::async_trait;
use medvoice_core::{ContextProvider, ToolDeclaration, ToolHandler, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// How much of an item description makes it into the context summary.
const DESCRIPTION_PREVIEW_CHARS: usize = 300;
/// How many problem-list entries the summary mentions.
const SUMMARY_PROBLEM_LIMIT: usize = 5;

/// Thin HTTP client for the board service.
#[derive(Clone)]
pub struct BoardClient {
    http: reqwest::Client,
    base_url: String,
}

impl BoardClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// All board items for one patient, as raw JSON.
    pub async fn patient_items(&self, patient_id: &str) -> Result<Value> {
        let url = format!("{}/api/board-items/patient/{patient_id}", self.base_url);
        debug!(%url, "Fetching board items");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("requesting board items")?
            .error_for_status()
            .context("board items request rejected")?;
        response.json().await.context("decoding board items")
    }

    async fn post(&self, path: &str, payload: Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "Posting to board");
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("posting to {path}"))?
            .error_for_status()
            .with_context(|| format!("board rejected post to {path}"))?;
        // Write endpoints may respond with an empty body.
        Ok(response.json().await.unwrap_or(Value::Null))
    }
}

/// Condenses a board payload into the few lines worth putting in front
/// of the model: identity from the sidebar item plus the leading
/// problem-list entries.
pub fn brief_summary(items: &Value) -> String {
    let Some(items) = items.as_array() else {
        return String::new();
    };

    let mut lines = Vec::new();
    let mut problems = Vec::new();

    for item in items {
        let component = item.get("componentType").and_then(Value::as_str);
        match component {
            Some("Sidebar") => {
                let data = item.get("data").unwrap_or(&Value::Null);
                if let Some(name) = data.get("name").and_then(Value::as_str) {
                    lines.push(format!("Patient: {name}"));
                }
                if let Some(age) = data.get("age").and_then(Value::as_u64) {
                    lines.push(format!("Age: {age}"));
                }
                if let Some(sex) = data.get("sex").and_then(Value::as_str) {
                    lines.push(format!("Sex: {sex}"));
                }
            }
            _ => {
                if problems.len() >= SUMMARY_PROBLEM_LIMIT {
                    continue;
                }
                let title = item.get("title").and_then(Value::as_str).unwrap_or("item");
                let description = item
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let preview: String = description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
                problems.push(format!("- {title}: {preview}"));
            }
        }
    }

    if !problems.is_empty() {
        lines.push("Active items:".to_string());
        lines.extend(problems);
    }
    lines.join("\n")
}

#[async_trait]
impl ContextProvider for BoardClient {
    async fn fetch_context_summary(&self, subject_id: &str) -> Result<String> {
        let items = self.patient_items(subject_id).await?;
        Ok(brief_summary(&items))
    }
}

struct PatientDataTool {
    board: BoardClient,
}

#[async_trait]
impl ToolHandler for PatientDataTool {
    async fn invoke(&self, arguments: Value) -> Result<String> {
        let patient_id = require_str(&arguments, "patient_id")?;
        let items = self.board.patient_items(patient_id).await?;
        Ok(serde_json::to_string(&items)?)
    }
}

struct FocusBoardItemTool {
    board: BoardClient,
}

#[async_trait]
impl ToolHandler for FocusBoardItemTool {
    async fn invoke(&self, arguments: Value) -> Result<String> {
        let item_id = require_str(&arguments, "item_id")?;
        self.board
            .post("/api/focus", json!({ "item_id": item_id }))
            .await?;
        Ok(format!("Focused board item {item_id}"))
    }
}

struct CreateTaskTool {
    board: BoardClient,
}

#[async_trait]
impl ToolHandler for CreateTaskTool {
    async fn invoke(&self, arguments: Value) -> Result<String> {
        let text = require_str(&arguments, "text")?;
        self.board.post("/api/todos", json!({ "text": text })).await?;
        Ok(format!("Task created: {text}"))
    }
}

struct SendNotificationTool {
    board: BoardClient,
}

#[async_trait]
impl ToolHandler for SendNotificationTool {
    async fn invoke(&self, arguments: Value) -> Result<String> {
        let message = require_str(&arguments, "message")?;
        self.board
            .post("/api/doctor-notes", json!({ "message": message }))
            .await?;
        Ok("Notification sent to the doctor".to_string())
    }
}

fn require_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .with_context(|| format!("missing required argument '{key}'"))
}

fn string_param(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

/// Builds the tool catalogue advertised to every voice session.
pub fn clinical_tool_registry(board: BoardClient) -> ToolRegistry {
    let mut tools = ToolRegistry::new();

    tools.register(
        ToolDeclaration {
            name: "get_patient_data".to_string(),
            description: "Fetch all board items for a patient, including problems, vitals \
                          and notes."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "patient_id": string_param("Identifier of the patient to look up"),
                },
                "required": ["patient_id"],
            }),
        },
        Arc::new(PatientDataTool {
            board: board.clone(),
        }),
    );

    tools.register(
        ToolDeclaration {
            name: "focus_board_item".to_string(),
            description: "Bring a board item to the foreground of the doctor's display."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "item_id": string_param("Identifier of the board item to focus"),
                },
                "required": ["item_id"],
            }),
        },
        Arc::new(FocusBoardItemTool {
            board: board.clone(),
        }),
    );

    tools.register(
        ToolDeclaration {
            name: "create_task".to_string(),
            description: "Add a follow-up task to the doctor's todo list.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": string_param("Task text as it should appear in the list"),
                },
                "required": ["text"],
            }),
        },
        Arc::new(CreateTaskTool {
            board: board.clone(),
        }),
    );

    tools.register(
        ToolDeclaration {
            name: "send_notification".to_string(),
            description: "Send a short written note to the doctor.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "message": string_param("The note to deliver"),
                },
                "required": ["message"],
            }),
        },
        Arc::new(SendNotificationTool { board }),
    );

    tools
}

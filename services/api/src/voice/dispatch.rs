//! Fire-and-forget tool call execution.
//!
//! Tool calls arrive on the upstream receive path but must never stall
//! audio, so the relay spawns `run_tool_call` for each one and keeps
//! going. Handler failures become error strings in the response; the
//! only way a call fails outright is if the sockets are already gone.

use crate::voice::registry::LiveSession;
use crate::voice::relay::StatusSink;
use chrono::Utc;
use medvoice_core::{ToolCallRequest, ToolCallResponse, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// How a tool invocation went, for the client-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Completed,
    Failed,
}

impl ToolOutcome {
    fn as_str(self) -> &'static str {
        match self {
            ToolOutcome::Completed => "completed",
            ToolOutcome::Failed => "failed",
        }
    }
}

/// Resolves one tool call against the catalogue. Never fails: unknown
/// tools and handler errors are folded into the response text.
pub async fn dispatch(
    tools: &ToolRegistry,
    request: &ToolCallRequest,
) -> (ToolCallResponse, ToolOutcome) {
    let (result, outcome) = match tools.get(&request.name) {
        Some(handler) => match handler.invoke(request.arguments.clone()).await {
            Ok(result) => (result, ToolOutcome::Completed),
            Err(error) => {
                warn!(tool = %request.name, %error, "Tool handler failed");
                (
                    format!("Error executing {}: {error}", request.name),
                    ToolOutcome::Failed,
                )
            }
        },
        None => {
            warn!(tool = %request.name, "Unknown tool requested");
            (format!("Unknown tool: {}", request.name), ToolOutcome::Failed)
        }
    };

    let response = ToolCallResponse {
        id: request.id.clone(),
        name: request.name.clone(),
        result,
    };
    (response, outcome)
}

fn notification(request: &ToolCallRequest, status: &str, result: Option<&str>) -> Value {
    json!({
        "type": "tool_call",
        "tool": request.name,
        "status": status,
        "result": result,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Runs one tool call end to end: notifies the client it is executing,
/// dispatches, sends the result upstream, and notifies the client of the
/// outcome. Spawned per call by the relay.
pub async fn run_tool_call(
    tools: Arc<ToolRegistry>,
    live: Arc<LiveSession>,
    sink: Arc<dyn StatusSink>,
    request: ToolCallRequest,
) {
    info!(tool = %request.name, "Executing tool call");
    if let Err(error) = sink.send_json(notification(&request, "executing", None)).await {
        warn!(tool = %request.name, %error, "Failed to send executing notification");
    }

    let (response, outcome) = dispatch(&tools, &request).await;

    if let Err(error) = live.upstream.send_tool_response(response.clone()).await {
        warn!(tool = %request.name, %error, "Failed to send tool response upstream");
    }

    let payload = notification(&request, outcome.as_str(), Some(&response.result));
    if let Err(error) = sink.send_json(payload).await {
        warn!(tool = %request.name, %error, "Failed to send outcome notification");
    }
    info!(tool = %request.name, outcome = outcome.as_str(), "Tool call finished");
}

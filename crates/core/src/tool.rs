//! Tool call types and the application tool catalogue.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A tool invocation requested by the upstream service during a turn.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id assigned by the upstream service, echoed back in the
    /// response so it can match the result to the call.
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// The outcome of one tool invocation.
///
/// `result` is always a string; structured payloads are JSON-encoded into
/// it. Handler failures are encoded here too rather than propagated, so a
/// broken tool can never take the relay down with it.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResponse {
    pub id: Option<String>,
    pub name: String,
    pub result: String,
}

/// The schema advertised to the upstream service for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// An application-defined tool. Implementations are supplied by the
/// embedding service and may perform arbitrary async side effects.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: Value) -> Result<String>;
}

/// The static catalogue of tools available to voice sessions.
///
/// Populated once at startup and shared read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    declarations: Vec<ToolDeclaration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, declaration: ToolDeclaration, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(declaration.name.clone(), handler);
        self.declarations.push(declaration);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    /// The declarations to include in the upstream handshake, in
    /// registration order.
    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

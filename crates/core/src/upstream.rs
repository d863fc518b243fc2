//! The upstream realtime connection seam.
//!
//! The session core never talks to a provider directly. It asks an
//! [`UpstreamConnector`] for a connection and then drives the returned
//! [`UpstreamHandle`]. The concrete Gemini Live implementation lives in
//! the API service; tests substitute scripted handles.

use crate::frame::AudioFrame;
use crate::tool::{ToolCallRequest, ToolCallResponse, ToolDeclaration};
use anyhow::Result;
use async_trait::async_trait;

/// Everything the connector needs to perform the handshake.
#[derive(Debug, Clone, Default)]
pub struct UpstreamConfig {
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
}

/// Events emitted by an established upstream connection.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    /// A chunk of synthesized speech to forward to the client.
    Audio(AudioFrame),
    /// The model asked the application to execute a tool.
    ToolCall(ToolCallRequest),
    /// The model finished its current spoken turn.
    TurnComplete,
}

/// One established bidirectional connection to the inference service.
///
/// A handle is owned by exactly one session. All methods take `&self`;
/// implementations serialize access internally, which the session core
/// relies on by calling `next_event` from a single task only.
#[async_trait]
pub trait UpstreamHandle: Send + Sync {
    /// Forwards one audio frame to the model.
    async fn send_frame(&self, frame: AudioFrame) -> Result<()>;

    /// Returns a tool result to the model so it can continue the turn.
    async fn send_tool_response(&self, response: ToolCallResponse) -> Result<()>;

    /// Waits for the next event. `Ok(None)` means the upstream closed the
    /// connection; the caller is expected to tear the session down.
    async fn next_event(&self) -> Result<Option<UpstreamEvent>>;

    /// Closes the connection. Must be safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Opens upstream connections. The handshake may take tens of seconds to
/// low minutes on provider cold starts; callers bound it with their own
/// timeout and may cancel it by dropping the future.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self, config: UpstreamConfig) -> Result<Box<dyn UpstreamHandle>>;
}

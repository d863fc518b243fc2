//! Upstream connector for the Gemini Live API over WebSocket.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use medvoice_core::{
    AudioFrame, ToolCallRequest, ToolCallResponse, UpstreamConfig, UpstreamConnector,
    UpstreamEvent, UpstreamHandle,
};
use std::collections::VecDeque;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Input audio format expected by the Live API.
const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

// --- Local Gemini Live wire types (for encapsulation) ---
mod gemini_types {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) enum ClientMessage {
        Setup(BidiGenerateContentSetup),
        RealtimeInput(BidiGenerateContentRealtimeInput),
        ToolResponse(BidiGenerateContentToolResponse),
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentSetup {
        pub model: String,
        pub generation_config: GenerationConfig,
        pub system_instruction: Content,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub tools: Vec<Tool>,
        pub realtime_input_config: RealtimeInputConfig,
    }

    #[derive(Serialize)]
    pub(super) struct Content {
        pub parts: Vec<Part>,
    }

    #[derive(Serialize)]
    pub(super) struct Part {
        pub text: String,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerationConfig {
        pub response_modalities: Vec<ResponseModality>,
        pub speech_config: SpeechConfig,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub(super) enum ResponseModality {
        Audio,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct SpeechConfig {
        pub voice_config: VoiceConfig,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct VoiceConfig {
        pub prebuilt_voice_config: PrebuiltVoiceConfig,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct PrebuiltVoiceConfig {
        pub voice_name: String,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Tool {
        pub function_declarations: Vec<FunctionDeclaration>,
    }

    #[derive(Serialize)]
    pub(super) struct FunctionDeclaration {
        pub name: String,
        pub description: String,
        pub parameters: Value,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct RealtimeInputConfig {
        pub automatic_activity_detection: AutomaticActivityDetection,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct AutomaticActivityDetection {
        pub start_of_speech_sensitivity: String,
        pub end_of_speech_sensitivity: String,
        pub prefix_padding_ms: u32,
        pub silence_duration_ms: u32,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentRealtimeInput {
        pub audio: Blob,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Blob {
        pub mime_type: String,
        pub data: String,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct BidiGenerateContentToolResponse {
        pub function_responses: Vec<FunctionResponse>,
    }

    #[derive(Serialize)]
    pub(super) struct FunctionResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub id: Option<String>,
        pub name: String,
        pub response: Value,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerMessage {
        pub setup_complete: Option<Value>,
        pub server_content: Option<LiveServerContent>,
        pub tool_call: Option<LiveToolCall>,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct LiveServerContent {
        pub model_turn: Option<ServerContentTurn>,
        pub turn_complete: Option<bool>,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct ServerContentTurn {
        pub parts: Vec<ServerPart>,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerPart {
        pub inline_data: Option<ServerBlob>,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ServerBlob {
        pub mime_type: Option<String>,
        pub data: String,
    }

    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct LiveToolCall {
        pub function_calls: Vec<FunctionCall>,
    }

    #[derive(Deserialize, Debug)]
    pub(super) struct FunctionCall {
        pub id: Option<String>,
        pub name: String,
        #[serde(default)]
        pub args: Value,
    }
}

type LiveStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects voice sessions to the Gemini Live API.
pub struct GeminiLiveConnector {
    api_key: String,
    model: String,
    voice_name: String,
    endpoint: String,
}

impl GeminiLiveConnector {
    pub fn new(api_key: String, model: String, voice_name: String) -> Self {
        Self {
            api_key,
            model,
            voice_name,
            endpoint: LIVE_ENDPOINT.to_string(),
        }
    }

    fn setup_message(&self, config: &UpstreamConfig) -> gemini_types::ClientMessage {
        let tools = if config.tools.is_empty() {
            Vec::new()
        } else {
            vec![gemini_types::Tool {
                function_declarations: config
                    .tools
                    .iter()
                    .map(|decl| gemini_types::FunctionDeclaration {
                        name: decl.name.clone(),
                        description: decl.description.clone(),
                        parameters: decl.parameters.clone(),
                    })
                    .collect(),
            }]
        };

        gemini_types::ClientMessage::Setup(gemini_types::BidiGenerateContentSetup {
            model: self.model.clone(),
            generation_config: gemini_types::GenerationConfig {
                response_modalities: vec![gemini_types::ResponseModality::Audio],
                speech_config: gemini_types::SpeechConfig {
                    voice_config: gemini_types::VoiceConfig {
                        prebuilt_voice_config: gemini_types::PrebuiltVoiceConfig {
                            voice_name: self.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: gemini_types::Content {
                parts: vec![gemini_types::Part {
                    text: config.system_instruction.clone(),
                }],
            },
            tools,
            // Tuned for consultation-room speech: quick to pick up the
            // doctor, slow to decide they have finished.
            realtime_input_config: gemini_types::RealtimeInputConfig {
                automatic_activity_detection: gemini_types::AutomaticActivityDetection {
                    start_of_speech_sensitivity: "START_SENSITIVITY_LOW".to_string(),
                    end_of_speech_sensitivity: "END_SENSITIVITY_HIGH".to_string(),
                    prefix_padding_ms: 150,
                    silence_duration_ms: 700,
                },
            },
        })
    }
}

#[async_trait]
impl UpstreamConnector for GeminiLiveConnector {
    async fn connect(&self, config: UpstreamConfig) -> Result<Box<dyn UpstreamHandle>> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let (stream, _) = connect_async(url)
            .await
            .context("connecting to Gemini Live websocket")?;
        let (mut tx, mut rx) = stream.split();

        let setup = serde_json::to_string(&self.setup_message(&config))?;
        tx.send(WsMessage::Text(setup.into()))
            .await
            .context("sending Gemini setup message")?;

        // The session is not usable until the server acknowledges setup.
        loop {
            let Some(message) = rx.next().await else {
                bail!("Gemini closed the connection during setup");
            };
            let Some(server) = parse_server_message(message?)? else {
                continue;
            };
            if server.setup_complete.is_some() {
                info!(model = %self.model, "Gemini Live session setup complete");
                break;
            }
            warn!(?server, "Unexpected Gemini message during setup");
        }

        Ok(Box::new(GeminiLiveHandle {
            tx: Mutex::new(tx),
            rx: Mutex::new(RxState {
                stream: rx,
                pending: VecDeque::new(),
            }),
        }))
    }
}

/// The Live API sends JSON as either text or binary frames.
fn parse_server_message(message: WsMessage) -> Result<Option<gemini_types::ServerMessage>> {
    let parsed = match message {
        WsMessage::Text(text) => serde_json::from_str(&text)?,
        WsMessage::Binary(data) => serde_json::from_slice(&data)?,
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}

struct RxState {
    stream: SplitStream<LiveStream>,
    /// One server message can fan out into several events; extras wait
    /// here for the next `next_event` call.
    pending: VecDeque<UpstreamEvent>,
}

struct GeminiLiveHandle {
    tx: Mutex<SplitSink<LiveStream, WsMessage>>,
    rx: Mutex<RxState>,
}

impl GeminiLiveHandle {
    async fn send_client_message(&self, message: &gemini_types::ClientMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let mut tx = self.tx.lock().await;
        tx.send(WsMessage::Text(payload.into())).await?;
        Ok(())
    }
}

fn events_from(server: gemini_types::ServerMessage) -> VecDeque<UpstreamEvent> {
    let mut events = VecDeque::new();

    if let Some(tool_call) = server.tool_call {
        for call in tool_call.function_calls {
            events.push_back(UpstreamEvent::ToolCall(ToolCallRequest {
                id: call.id,
                name: call.name,
                arguments: call.args,
            }));
        }
    }

    if let Some(content) = server.server_content {
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                let Some(blob) = part.inline_data else {
                    continue;
                };
                match BASE64.decode(blob.data.as_bytes()) {
                    Ok(audio) => {
                        let mime = blob
                            .mime_type
                            .unwrap_or_else(|| "audio/pcm".to_string());
                        events.push_back(UpstreamEvent::Audio(AudioFrame::new(audio, mime)));
                    }
                    Err(error) => warn!(%error, "Discarding undecodable audio blob"),
                }
            }
        }
        if content.turn_complete == Some(true) {
            events.push_back(UpstreamEvent::TurnComplete);
        }
    }

    events
}

#[async_trait]
impl UpstreamHandle for GeminiLiveHandle {
    async fn send_frame(&self, frame: AudioFrame) -> Result<()> {
        let message = gemini_types::ClientMessage::RealtimeInput(
            gemini_types::BidiGenerateContentRealtimeInput {
                audio: gemini_types::Blob {
                    mime_type: INPUT_MIME_TYPE.to_string(),
                    data: BASE64.encode(&frame.data),
                },
            },
        );
        self.send_client_message(&message).await
    }

    async fn send_tool_response(&self, response: ToolCallResponse) -> Result<()> {
        let message = gemini_types::ClientMessage::ToolResponse(
            gemini_types::BidiGenerateContentToolResponse {
                function_responses: vec![gemini_types::FunctionResponse {
                    id: response.id,
                    name: response.name,
                    response: serde_json::json!({ "result": response.result }),
                }],
            },
        );
        self.send_client_message(&message).await
    }

    async fn next_event(&self) -> Result<Option<UpstreamEvent>> {
        let mut rx = self.rx.lock().await;
        loop {
            if let Some(event) = rx.pending.pop_front() {
                return Ok(Some(event));
            }
            let Some(message) = rx.stream.next().await else {
                return Ok(None);
            };
            match message {
                Ok(WsMessage::Close(frame)) => {
                    info!(?frame, "Gemini closed the Live session");
                    return Ok(None);
                }
                Ok(other) => match parse_server_message(other) {
                    Ok(Some(server)) => rx.pending = events_from(server),
                    Ok(None) => {}
                    Err(error) => debug!(%error, "Ignoring unparseable Gemini message"),
                },
                Err(error) => return Err(error.into()),
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let mut tx = self.tx.lock().await;
        tx.send(WsMessage::Close(None)).await.ok();
        tx.close().await?;
        Ok(())
    }
}

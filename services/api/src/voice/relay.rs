//! Duplex audio relay between a client websocket and an upstream handle.
//!
//! Four tasks run per attached client: client audio in, upstream send,
//! upstream receive, and client audio out. They share nothing but the
//! session queues and the websocket sink; the first task to finish ends
//! the whole group and the session is released back to `ready`.

use crate::state::AppState;
use crate::voice::dispatch;
use crate::voice::queue::FrameQueue;
use crate::voice::registry::{AttachedSession, LiveSession};
use anyhow::Result;
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use medvoice_core::{AudioFrame, ToolRegistry, UpstreamEvent};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

/// Close code sent when the session id cannot be claimed.
const CLOSE_SESSION_UNAVAILABLE: u16 = 4004;

/// A destination for JSON status and tool notifications to the client.
/// Abstracted from the websocket so the dispatcher can be tested without
/// a socket.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn send_json(&self, payload: Value) -> Result<()>;
}

type SharedSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

struct WsStatusSink {
    sink: SharedSink,
}

#[async_trait]
impl StatusSink for WsStatusSink {
    async fn send_json(&self, payload: Value) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(payload.to_string().into())).await?;
        Ok(())
    }
}

/// Websocket endpoint for an established voice session.
///
/// The session must already be `ready`; the handshake is accepted first
/// because close codes can only be delivered on an open socket.
#[utoipa::path(
    get,
    path = "/voice-session/{session_id}",
    params(("session_id" = String, Path, description = "Voice session identifier")),
    responses((status = 101, description = "Switching protocols to websocket")),
    tag = "voice"
)]
pub async fn voice_session_ws(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: String) {
    let attached = match state.registry.attach(&session_id).await {
        Ok(attached) => attached,
        Err(error) => {
            warn!(%session_id, %error, "Rejecting websocket attach");
            let close = Message::Close(Some(CloseFrame {
                code: CLOSE_SESSION_UNAVAILABLE,
                reason: "Session not ready or not found".into(),
            }));
            if let Err(error) = socket.send(close).await {
                debug!(%session_id, %error, "Client gone before close frame");
            }
            return;
        }
    };

    let span = info_span!("relay", %session_id);
    run_relay(socket, state.tools.clone(), &attached)
        .instrument(span)
        .await;
    state.registry.release(&session_id).await;
}

async fn run_relay(socket: WebSocket, tools: Arc<ToolRegistry>, attached: &AttachedSession) {
    let (sink, stream) = socket.split();
    let shared: SharedSink = Arc::new(Mutex::new(sink));
    let status: Arc<dyn StatusSink> = Arc::new(WsStatusSink {
        sink: shared.clone(),
    });

    let connected = json!({
        "type": "status",
        "status": "connected",
        "session_id": attached.session_id,
    });
    if let Err(error) = status.send_json(connected).await {
        warn!(%error, "Client gone before relay start");
        return;
    }
    info!("Relay started");

    let mut tasks: JoinSet<&'static str> = JoinSet::new();
    tasks.spawn(client_audio_in(stream, attached.live.clone()));
    tasks.spawn(upstream_send(attached.live.clone()));
    tasks.spawn(upstream_receive(
        attached.live.clone(),
        tools,
        status.clone(),
    ));
    tasks.spawn(client_audio_out(attached.live.clone(), shared));

    // First task to finish ends the session for all of them.
    if let Some(Ok(which)) = tasks.join_next().await {
        info!(task = which, "Relay task finished, shutting down group");
    }
    tasks.shutdown().await;
    info!("Relay ended");
}

/// Client → inbound queue. Binary frames are audio; text frames are
/// control messages.
async fn client_audio_in(mut stream: SplitStream<WebSocket>, live: Arc<LiveSession>) -> &'static str {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                live.inbound.push(AudioFrame::pcm(data)).await;
            }
            Ok(Message::Text(text)) => handle_control(&text, &live.outbound),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                debug!(%error, "Client websocket error");
                break;
            }
        }
    }
    "client_audio_in"
}

/// Interprets a control message from the client.
fn handle_control(text: &str, outbound: &FrameQueue) {
    let Ok(control) = serde_json::from_str::<Value>(text) else {
        debug!("Ignoring malformed control message");
        return;
    };
    match control.get("type").and_then(Value::as_str) {
        Some("stop") => {
            // Barge-in: throw away whatever playback is still queued.
            let dropped = outbound.drain();
            info!(dropped, "Client stopped playback, drained outbound queue");
        }
        other => debug!(?other, "Ignoring unknown control message"),
    }
}

/// Inbound queue → upstream.
async fn upstream_send(live: Arc<LiveSession>) -> &'static str {
    loop {
        let frame = live.inbound.pop().await;
        if let Err(error) = live.upstream.send_frame(frame).await {
            warn!(%error, "Failed to send audio upstream");
            break;
        }
    }
    "upstream_send"
}

/// Upstream events → outbound queue, status frames, and tool dispatch.
/// Tool calls are spawned so a slow tool never stalls audio.
async fn upstream_receive(
    live: Arc<LiveSession>,
    tools: Arc<ToolRegistry>,
    status: Arc<dyn StatusSink>,
) -> &'static str {
    // Tool tasks are owned here so teardown cancels any still running.
    let mut tool_tasks: JoinSet<()> = JoinSet::new();
    loop {
        // Reap whatever finished since the last event.
        while tool_tasks.try_join_next().is_some() {}

        match live.upstream.next_event().await {
            Ok(Some(UpstreamEvent::Audio(frame))) => {
                live.outbound.push(frame).await;
            }
            Ok(Some(UpstreamEvent::ToolCall(request))) => {
                let task = dispatch::run_tool_call(
                    tools.clone(),
                    live.clone(),
                    status.clone(),
                    request,
                );
                tool_tasks.spawn(task.in_current_span());
            }
            Ok(Some(UpstreamEvent::TurnComplete)) => {
                let frame = json!({"type": "status", "status": "turn_complete"});
                if let Err(error) = status.send_json(frame).await {
                    debug!(%error, "Client gone while sending turn status");
                    break;
                }
            }
            Ok(None) => {
                info!("Upstream stream ended");
                break;
            }
            Err(error) => {
                warn!(%error, "Upstream receive error");
                break;
            }
        }
    }
    tool_tasks.shutdown().await;
    "upstream_receive"
}

/// Outbound queue → client as binary frames.
async fn client_audio_out(live: Arc<LiveSession>, sink: SharedSink) -> &'static str {
    loop {
        let frame = live.outbound.pop().await;
        let message = Message::Binary(frame.data);
        let mut sink = sink.lock().await;
        if let Err(error) = sink.send(message).await {
            debug!(%error, "Failed to send audio to client");
            break;
        }
    }
    "client_audio_out"
}

//! Shared fakes for voice tests: a scriptable upstream and a recording
//! status sink.

use crate::config::Config;
use crate::state::AppState;
use crate::models::{SessionStatus, SessionStatusResponse};
use crate::voice::registry::{RegistrySettings, SessionRegistry};
use crate::voice::relay::StatusSink;
use anyhow::{bail, Result};
use async_trait::async_trait;
use medvoice_core::{
    AudioFrame, ContextProvider, ToolCallResponse, ToolRegistry, UpstreamConfig,
    UpstreamConnector, UpstreamEvent, UpstreamHandle,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, Notify};

struct MockHandleInner {
    echo: bool,
    events_tx: StdMutex<Option<UnboundedSender<UpstreamEvent>>>,
    events_rx: Mutex<UnboundedReceiver<UpstreamEvent>>,
    sent_frames: StdMutex<Vec<AudioFrame>>,
    tool_responses: StdMutex<Vec<ToolCallResponse>>,
    closed: AtomicBool,
}

/// A scriptable in-process upstream handle. Tests feed it events with
/// `emit` and end the stream with `finish`; in echo mode every frame
/// sent to it comes straight back as an audio event.
#[derive(Clone)]
pub struct MockHandle {
    inner: Arc<MockHandleInner>,
}

impl MockHandle {
    pub fn new() -> Self {
        Self::with_echo(false)
    }

    pub fn echoing() -> Self {
        Self::with_echo(true)
    }

    fn with_echo(echo: bool) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            inner: Arc::new(MockHandleInner {
                echo,
                events_tx: StdMutex::new(Some(tx)),
                events_rx: Mutex::new(rx),
                sent_frames: StdMutex::new(Vec::new()),
                tool_responses: StdMutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn emit(&self, event: UpstreamEvent) {
        if let Some(tx) = self.inner.events_tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Ends the event stream, as if the upstream closed the connection.
    pub fn finish(&self) {
        self.inner.events_tx.lock().unwrap().take();
    }

    pub fn sent_frames(&self) -> Vec<AudioFrame> {
        self.inner.sent_frames.lock().unwrap().clone()
    }

    pub fn tool_responses(&self) -> Vec<ToolCallResponse> {
        self.inner.tool_responses.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamHandle for MockHandle {
    async fn send_frame(&self, frame: AudioFrame) -> Result<()> {
        if self.is_closed() {
            bail!("handle closed");
        }
        self.inner.sent_frames.lock().unwrap().push(frame.clone());
        if self.inner.echo {
            self.emit(UpstreamEvent::Audio(frame));
        }
        Ok(())
    }

    async fn send_tool_response(&self, response: ToolCallResponse) -> Result<()> {
        if self.is_closed() {
            bail!("handle closed");
        }
        self.inner.tool_responses.lock().unwrap().push(response);
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<UpstreamEvent>> {
        let mut rx = self.inner.events_rx.lock().await;
        Ok(rx.recv().await)
    }

    async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.finish();
        Ok(())
    }
}

/// How `MockConnector::connect` should behave.
#[derive(Clone)]
pub enum ConnectBehavior {
    /// Succeed immediately with a plain handle.
    Ready,
    /// Succeed immediately with an echoing handle.
    Echo,
    /// Fail immediately with this message.
    Fail(String),
    /// Never complete; exercises the handshake timeout.
    Hang,
    /// Block until `open_gate` is called, then succeed.
    Gated,
}

pub struct MockConnector {
    behavior: ConnectBehavior,
    gate: Notify,
    last: StdMutex<Option<MockHandle>>,
}

impl MockConnector {
    pub fn new(behavior: ConnectBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            gate: Notify::new(),
            last: StdMutex::new(None),
        })
    }

    pub fn open_gate(&self) {
        self.gate.notify_one();
    }

    /// The handle produced by the most recent successful connect.
    pub fn last_handle(&self) -> Option<MockHandle> {
        self.last.lock().unwrap().clone()
    }

    fn produce(&self) -> Box<dyn UpstreamHandle> {
        let handle = match self.behavior {
            ConnectBehavior::Echo => MockHandle::echoing(),
            _ => MockHandle::new(),
        };
        *self.last.lock().unwrap() = Some(handle.clone());
        Box::new(handle)
    }
}

#[async_trait]
impl UpstreamConnector for MockConnector {
    async fn connect(&self, _config: UpstreamConfig) -> Result<Box<dyn UpstreamHandle>> {
        match &self.behavior {
            ConnectBehavior::Ready | ConnectBehavior::Echo => Ok(self.produce()),
            ConnectBehavior::Fail(message) => bail!("{message}"),
            ConnectBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            ConnectBehavior::Gated => {
                self.gate.notified().await;
                Ok(self.produce())
            }
        }
    }
}

struct StaticContext {
    fail: bool,
}

#[async_trait]
impl ContextProvider for StaticContext {
    async fn fetch_context_summary(&self, subject_id: &str) -> Result<String> {
        if self.fail {
            bail!("board unreachable");
        }
        Ok(format!("Patient: {subject_id}\nProblems: test fixture"))
    }
}

fn settings() -> RegistrySettings {
    RegistrySettings {
        upstream_open_timeout: Duration::from_millis(100),
        context_summary_limit: 1000,
        system_prompt_path: None,
    }
}

fn build_registry(
    behavior: ConnectBehavior,
    context_fails: bool,
) -> (Arc<SessionRegistry>, Arc<MockConnector>) {
    let connector = MockConnector::new(behavior);
    let registry = SessionRegistry::new(
        connector.clone(),
        Arc::new(StaticContext {
            fail: context_fails,
        }),
        Arc::new(ToolRegistry::new()),
        settings(),
    );
    (registry, connector)
}

pub fn test_registry(behavior: ConnectBehavior) -> (Arc<SessionRegistry>, Arc<MockConnector>) {
    build_registry(behavior, false)
}

pub fn test_registry_with_failing_context(
    behavior: ConnectBehavior,
) -> (Arc<SessionRegistry>, Arc<MockConnector>) {
    build_registry(behavior, true)
}

/// An app state wired to a mock upstream, for endpoint tests.
pub fn test_app_state(behavior: ConnectBehavior) -> (AppState, Arc<MockConnector>) {
    let (registry, connector) = test_registry(behavior);
    let state = AppState {
        registry,
        tools: Arc::new(ToolRegistry::new()),
        config: Arc::new(Config::for_tests()),
    };
    (state, connector)
}

/// Polls until the session reaches `want`, panicking after two seconds.
pub async fn wait_for_status(
    registry: &Arc<SessionRegistry>,
    session_id: &str,
    want: SessionStatus,
) -> SessionStatusResponse {
    let deadline = Duration::from_secs(2);
    let poll = async {
        loop {
            if let Some(status) = registry.status(session_id).await {
                if status.status == want {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    match tokio::time::timeout(deadline, poll).await {
        Ok(status) => status,
        Err(_) => panic!("session {session_id} never reached {want}"),
    }
}

/// A `StatusSink` that records every payload it is given.
pub struct RecordingSink {
    messages: StdMutex<Vec<Value>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            messages: StdMutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<Value> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn send_json(&self, payload: Value) -> Result<()> {
        self.messages.lock().unwrap().push(payload);
        Ok(())
    }
}

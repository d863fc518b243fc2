//! Process-wide session table and lifecycle state machine.
//!
//! The registry owns every `VoiceSession`. Structural changes and status
//! transitions all happen under a single map lock; everything else a
//! session owns (queues, upstream handle) is reached through the
//! `Arc<LiveSession>` handed out by `attach` and mutated only by that
//! session's own tasks.

use crate::models::{SessionStatus, SessionStatusResponse};
use crate::voice::establish;
use crate::voice::queue::FrameQueue;
use chrono::{DateTime, Utc};
use medvoice_core::{ContextProvider, ToolRegistry, UpstreamConnector, UpstreamHandle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Capacity of the client→upstream queue. Small on purpose: a full queue
/// blocks the capture side, which is the backpressure we want.
pub const INBOUND_QUEUE_CAPACITY: usize = 10;

/// The slice of configuration the registry and establisher need.
#[derive(Clone, Debug)]
pub struct RegistrySettings {
    pub upstream_open_timeout: Duration,
    pub context_summary_limit: usize,
    pub system_prompt_path: Option<PathBuf>,
}

/// The live half of a session: present exactly while the status is
/// `ready` or `in_use`, created by the establisher, dropped on close.
pub struct LiveSession {
    pub upstream: Box<dyn UpstreamHandle>,
    /// client → upstream, bounded.
    pub inbound: FrameQueue,
    /// upstream → client, unbounded. A slow client can accumulate
    /// backlog here; the stop control message drains it.
    pub outbound: FrameQueue,
}

impl LiveSession {
    pub fn new(upstream: Box<dyn UpstreamHandle>) -> Self {
        Self {
            upstream,
            inbound: FrameQueue::bounded(INBOUND_QUEUE_CAPACITY),
            outbound: FrameQueue::unbounded(),
        }
    }
}

/// One voice session record.
pub(crate) struct VoiceSession {
    pub(crate) subject_id: String,
    pub(crate) status: SessionStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) connected_at: Option<DateTime<Utc>>,
    pub(crate) connection_time_seconds: Option<f64>,
    pub(crate) error_message: Option<String>,
    pub(crate) live: Option<Arc<LiveSession>>,
    pub(crate) establish_task: Option<JoinHandle<()>>,
}

impl VoiceSession {
    fn new(subject_id: &str) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            status: SessionStatus::Pending,
            created_at: Utc::now(),
            connected_at: None,
            connection_time_seconds: None,
            error_message: None,
            live: None,
            establish_task: None,
        }
    }
}

/// Why an `attach` was refused.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,
    #[error("Session not ready (status: {0})")]
    NotReady(SessionStatus),
}

/// What `attach` hands to the relay: identity plus the live resources.
#[derive(Clone)]
pub struct AttachedSession {
    pub session_id: String,
    pub subject_id: String,
    pub live: Arc<LiveSession>,
}

impl std::fmt::Debug for AttachedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedSession")
            .field("session_id", &self.session_id)
            .field("subject_id", &self.subject_id)
            .finish_non_exhaustive()
    }
}

/// The process-wide session table. Constructed once at startup and passed
/// by `Arc` to every component that needs it.
pub struct SessionRegistry {
    pub(crate) sessions: Mutex<HashMap<String, VoiceSession>>,
    pub(crate) connector: Arc<dyn UpstreamConnector>,
    pub(crate) context: Arc<dyn ContextProvider>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) settings: RegistrySettings,
}

impl SessionRegistry {
    pub fn new(
        connector: Arc<dyn UpstreamConnector>,
        context: Arc<dyn ContextProvider>,
        tools: Arc<ToolRegistry>,
        settings: RegistrySettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            connector,
            context,
            tools,
            settings,
        })
    }

    /// Creates a session and starts the upstream handshake in the
    /// background. Returns the new session id immediately.
    pub async fn create(self: &Arc<Self>, subject_id: &str) -> String {
        // Short ids are friendlier in poll URLs and logs.
        let session_id = Uuid::new_v4().simple().to_string()[..8].to_string();

        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), VoiceSession::new(subject_id));

        let task = tokio::spawn(establish::establish(self.clone(), session_id.clone()));
        match self.sessions.lock().await.get_mut(&session_id) {
            Some(session) => session.establish_task = Some(task),
            // Closed before we got back to the map; drop the work too.
            None => task.abort(),
        }

        info!(%session_id, %subject_id, "Created voice session");
        session_id
    }

    /// Non-blocking status snapshot. `None` if the id is unknown.
    pub async fn status(&self, session_id: &str) -> Option<SessionStatusResponse> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(session_id)?;
        Some(SessionStatusResponse {
            session_id: session_id.to_string(),
            subject_id: session.subject_id.clone(),
            status: session.status,
            created_at: session.created_at,
            connected_at: session.connected_at,
            connection_time_seconds: session.connection_time_seconds,
            error_message: session.error_message.clone(),
        })
    }

    /// Claims a ready session for a client, atomically moving it to
    /// `in_use`. Exactly one concurrent caller can win.
    pub async fn attach(&self, session_id: &str) -> Result<AttachedSession, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(session_id).ok_or(SessionError::NotFound)?;
        match (&session.status, &session.live) {
            (SessionStatus::Ready, Some(live)) => {
                let attached = AttachedSession {
                    session_id: session_id.to_string(),
                    subject_id: session.subject_id.clone(),
                    live: live.clone(),
                };
                session.status = SessionStatus::InUse;
                Ok(attached)
            }
            _ => Err(SessionError::NotReady(session.status)),
        }
    }

    /// Returns an in-use session to `ready`. A no-op in any other state.
    pub async fn release(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(session_id) {
            if session.status == SessionStatus::InUse {
                session.status = SessionStatus::Ready;
                info!(%session_id, "Session released back to ready");
            }
        }
    }

    /// Closes a session: removes it from the table, cancels any pending
    /// establishment, and closes the upstream handle. Idempotent.
    pub async fn close(&self, session_id: &str) {
        let removed = self.sessions.lock().await.remove(session_id);
        let Some(mut session) = removed else {
            return;
        };

        if let Some(task) = session.establish_task.take() {
            if !task.is_finished() {
                task.abort();
            }
            // Await so the handle is fully torn down before we return.
            let _ = task.await;
        }

        if let Some(live) = session.live.take() {
            if let Err(error) = live.upstream.close().await {
                warn!(%session_id, %error, "Error closing upstream handle");
            }
        }

        info!(%session_id, "Session closed");
    }

    /// Closes every reclaimable session older than `ttl`. Sessions that
    /// are connecting or in use are left alone. Returns how many were
    /// closed.
    pub async fn sweep(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .filter(|(_, session)| {
                    matches!(
                        session.status,
                        SessionStatus::Ready | SessionStatus::Error | SessionStatus::Closed
                    ) && (now - session.created_at).num_seconds() > ttl.as_secs() as i64
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        for session_id in &expired {
            info!(%session_id, "Sweeping expired session");
            self.close(session_id).await;
        }
        expired.len()
    }

    /// Number of sessions currently in the table.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

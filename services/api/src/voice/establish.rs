//! Background session establishment.
//!
//! Runs as a spawned task per session so the start endpoint can return
//! immediately. Cancellation (via `close`) aborts the task, which drops
//! any in-flight connect future and its transport.

use crate::models::SessionStatus;
use crate::voice::instructions;
use crate::voice::registry::{LiveSession, SessionRegistry};
use chrono::Utc;
use medvoice_core::UpstreamConfig;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Drives a session from `pending` through the upstream handshake to
/// `ready`, or to `error` on failure or timeout.
pub async fn establish(registry: Arc<SessionRegistry>, session_id: String) {
    let span = info_span!("establish", %session_id);
    establish_inner(registry, &session_id).instrument(span).await;
}

async fn establish_inner(registry: Arc<SessionRegistry>, session_id: &str) {
    let started = Utc::now();

    let subject_id = {
        let mut sessions = registry.sessions.lock().await;
        let Some(session) = sessions.get_mut(session_id) else {
            // Closed before we started; nothing to do.
            return;
        };
        session.status = SessionStatus::Connecting;
        session.subject_id.clone()
    };

    // Context fetch is best-effort: the session must still come up when
    // the collaborator is down.
    let summary = match registry.context.fetch_context_summary(&subject_id).await {
        Ok(summary) => instructions::truncate(summary, registry.settings.context_summary_limit),
        Err(error) => {
            warn!(%subject_id, %error, "Failed to fetch context summary, continuing without it");
            String::new()
        }
    };

    let system_instruction = instructions::build(
        registry.settings.system_prompt_path.as_deref(),
        &subject_id,
        &summary,
    );
    let config = UpstreamConfig {
        system_instruction,
        tools: registry.tools.declarations().to_vec(),
    };

    let connect = registry.connector.connect(config);
    let outcome = tokio::time::timeout(registry.settings.upstream_open_timeout, connect).await;
    let elapsed = (Utc::now() - started).num_milliseconds() as f64 / 1000.0;

    let mut sessions = registry.sessions.lock().await;
    match outcome {
        Ok(Ok(upstream)) => {
            let mut orphaned = Some(upstream);
            if let Some(session) = sessions.get_mut(session_id) {
                if session.status == SessionStatus::Connecting {
                    if let Some(upstream) = orphaned.take() {
                        session.live = Some(Arc::new(LiveSession::new(upstream)));
                        session.connected_at = Some(Utc::now());
                        session.connection_time_seconds = Some(elapsed);
                        session.status = SessionStatus::Ready;
                        info!(%session_id, elapsed, "Session ready");
                    }
                }
            }
            drop(sessions);
            // Closed while we were connecting. The fresh handle belongs
            // to nobody; tear it down.
            if let Some(upstream) = orphaned {
                if let Err(error) = upstream.close().await {
                    warn!(%session_id, %error, "Error closing orphaned upstream handle");
                }
            }
        }
        Ok(Err(error)) => {
            warn!(%session_id, %error, "Upstream handshake failed");
            if let Some(session) = sessions.get_mut(session_id) {
                session.error_message = Some(error.to_string());
                session.connection_time_seconds = Some(elapsed);
                session.status = SessionStatus::Error;
            }
        }
        Err(_) => {
            warn!(%session_id, "Upstream handshake timed out");
            if let Some(session) = sessions.get_mut(session_id) {
                session.error_message = Some(format!(
                    "Upstream handshake timed out after {}s",
                    registry.settings.upstream_open_timeout.as_secs()
                ));
                session.connection_time_seconds = Some(elapsed);
                session.status = SessionStatus::Error;
            }
        }
    }
}

//! API Models
//!
//! This module defines the data structures returned by the two-phase voice
//! session front door, annotated for OpenAPI generation with `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// The lifecycle state of a voice session.
///
/// Transitions follow `pending → connecting → ready ⇄ in_use` with
/// `connecting → error` on handshake failure and `closed` as the terminal
/// state for every path.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Connecting,
    Ready,
    InUse,
    Error,
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Ready => "ready",
            SessionStatus::InUse => "in_use",
            SessionStatus::Error => "error",
            SessionStatus::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Returned by `POST /voice/start/{subject_id}` while the upstream
/// handshake runs in the background.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub subject_id: String,
    #[schema(value_type = String, example = "connecting")]
    pub status: SessionStatus,
    pub poll_url: String,
    pub websocket_url: String,
    pub message: String,
}

/// A point-in-time snapshot of one session, served by the status poll.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub subject_id: String,
    #[schema(value_type = String, example = "ready")]
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub connection_time_seconds: Option<f64>,
    pub error_message: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct CloseSessionResponse {
    #[schema(example = "closed")]
    pub status: String,
    pub session_id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::InUse).unwrap(),
            "\"in_use\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Connecting).unwrap(),
            "\"connecting\""
        );

        let status: SessionStatus = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(status, SessionStatus::Ready);
    }

    #[test]
    fn test_session_status_display() {
        assert_eq!(format!("{}", SessionStatus::InUse), "in_use");
        assert_eq!(format!("{}", SessionStatus::Error), "error");
    }

    #[test]
    fn test_invalid_status_deserialization() {
        let result: Result<SessionStatus, _> = serde_json::from_str("\"in-use\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_status_response_round_trip() {
        let response = SessionStatusResponse {
            session_id: "ab12cd34".to_string(),
            subject_id: "p1".to_string(),
            status: SessionStatus::Ready,
            created_at: Utc::now(),
            connected_at: Some(Utc::now()),
            connection_time_seconds: Some(42.5),
            error_message: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"ready\""));
        assert!(json.contains("\"error_message\":null"));

        let parsed: SessionStatusResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session_id, response.session_id);
        assert_eq!(parsed.status, SessionStatus::Ready);
        assert_eq!(parsed.connection_time_seconds, Some(42.5));
    }

    #[test]
    fn test_start_response_serialization() {
        let response = StartSessionResponse {
            session_id: "ab12cd34".to_string(),
            subject_id: "p1".to_string(),
            status: SessionStatus::Connecting,
            poll_url: "/voice/status/ab12cd34".to_string(),
            websocket_url: "/voice-session/ab12cd34".to_string(),
            message: "Connection started.".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"connecting\""));
        assert!(json.contains("/voice-session/ab12cd34"));
    }
}

//! Axum router configuration.
//!
//! Defines the complete HTTP surface: the voice session REST API, the
//! websocket endpoint, and the OpenAPI documentation.

use crate::{
    handlers,
    models::{CloseSessionResponse, ErrorResponse, SessionStatus, SessionStatusResponse,
        StartSessionResponse},
    state::AppState,
    voice::relay,
};

use axum::{
    Router,
    routing::{delete, get, post},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::start_voice_session,
        handlers::get_voice_session_status,
        handlers::close_voice_session,
        relay::voice_session_ws,
    ),
    components(
        schemas(
            StartSessionResponse,
            SessionStatusResponse,
            CloseSessionResponse,
            ErrorResponse,
            SessionStatus
        )
    ),
    tags(
        (name = "voice", description = "Realtime voice session management")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/voice/start/{subject_id}", post(handlers::start_voice_session))
        .route(
            "/voice/status/{session_id}",
            get(handlers::get_voice_session_status),
        )
        .route(
            "/voice/session/{session_id}",
            delete(handlers::close_voice_session),
        )
        .route("/voice-session/{session_id}", get(relay::voice_session_ws))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::testutil::{test_app_state, ConnectBehavior};
    use futures_util::{SinkExt, StreamExt};
    use serde_json::Value;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

    async fn serve(behavior: ConnectBehavior) -> SocketAddr {
        let (state, _) = test_app_state(behavior);
        let router = create_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    async fn poll_until(
        client: &reqwest::Client,
        url: &str,
        want: &str,
    ) -> Value {
        let deadline = Duration::from_secs(2);
        let poll = async {
            loop {
                let response = client.get(url).send().await.expect("status request");
                let body: Value = response.json().await.expect("status body");
                if body["status"] == want {
                    return body;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        match tokio::time::timeout(deadline, poll).await {
            Ok(body) => body,
            Err(_) => panic!("session never reached status {want}"),
        }
    }

    #[tokio::test]
    async fn full_session_lifecycle_over_http_and_websocket() {
        let addr = serve(ConnectBehavior::Echo).await;
        let base = format!("http://{addr}");
        let client = reqwest::Client::new();

        // Phase one: create and poll until ready.
        let started: Value = client
            .post(format!("{base}/voice/start/patient-7"))
            .send()
            .await
            .expect("start request")
            .json()
            .await
            .expect("start body");
        let session_id = started["session_id"].as_str().expect("session id").to_string();
        assert_eq!(session_id.len(), 8);
        assert_eq!(started["subject_id"], "patient-7");
        assert_eq!(started["poll_url"], format!("/voice/status/{session_id}"));

        let status_url = format!("{base}/voice/status/{session_id}");
        let ready = poll_until(&client, &status_url, "ready").await;
        assert!(ready["connection_time_seconds"].is_number());

        // Phase two: attach and relay audio.
        let (mut ws, _) = connect_async(format!("ws://{addr}/voice-session/{session_id}"))
            .await
            .expect("websocket connect");

        let first = ws.next().await.expect("first frame").expect("ws ok");
        let WsMessage::Text(text) = first else {
            panic!("expected status frame, got {first:?}");
        };
        let frame: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(frame["type"], "status");
        assert_eq!(frame["status"], "connected");

        let status = poll_until(&client, &status_url, "in_use").await;
        assert_eq!(status["status"], "in_use");

        // The echo upstream returns every frame, so order is observable
        // end to end.
        for byte in [1u8, 2, 3] {
            ws.send(WsMessage::Binary(vec![byte; 4].into()))
                .await
                .expect("send audio");
        }
        let mut echoed = Vec::new();
        while echoed.len() < 3 {
            match ws.next().await.expect("echo frame").expect("ws ok") {
                WsMessage::Binary(data) => echoed.push(data[0]),
                WsMessage::Text(_) => {}
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(echoed, vec![1, 2, 3]);

        // A stop control message is accepted mid-stream and the relay
        // keeps working afterwards.
        ws.send(WsMessage::Text(r#"{"type": "stop"}"#.into()))
            .await
            .expect("send stop");
        ws.send(WsMessage::Binary(vec![9u8; 4].into()))
            .await
            .expect("send audio after stop");
        loop {
            match ws.next().await.expect("echo frame").expect("ws ok") {
                WsMessage::Binary(data) => {
                    assert_eq!(data[0], 9);
                    break;
                }
                WsMessage::Text(_) => {}
                other => panic!("unexpected frame {other:?}"),
            }
        }

        // Detaching returns the session to ready for a later attach.
        ws.close(None).await.expect("close ws");
        poll_until(&client, &status_url, "ready").await;

        // Phase out: close and verify the id is gone.
        let closed: Value = client
            .delete(format!("{base}/voice/session/{session_id}"))
            .send()
            .await
            .expect("close request")
            .json()
            .await
            .expect("close body");
        assert_eq!(closed["status"], "closed");

        let gone = client.get(&status_url).send().await.expect("status request");
        assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn websocket_attach_to_unknown_session_closes_with_4004() {
        let addr = serve(ConnectBehavior::Ready).await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/voice-session/nope"))
            .await
            .expect("websocket connect");

        let message = ws.next().await.expect("close frame").expect("ws ok");
        let WsMessage::Close(Some(frame)) = message else {
            panic!("expected close frame, got {message:?}");
        };
        assert_eq!(u16::from(frame.code), 4004);
        assert_eq!(frame.reason.as_str(), "Session not ready or not found");
    }

    #[tokio::test]
    async fn websocket_attach_before_ready_closes_with_4004() {
        let addr = serve(ConnectBehavior::Hang).await;
        let base = format!("http://{addr}");
        let client = reqwest::Client::new();

        let started: Value = client
            .post(format!("{base}/voice/start/patient-7"))
            .send()
            .await
            .expect("start request")
            .json()
            .await
            .expect("start body");
        let session_id = started["session_id"].as_str().expect("session id");

        let (mut ws, _) = connect_async(format!("ws://{addr}/voice-session/{session_id}"))
            .await
            .expect("websocket connect");
        let message = ws.next().await.expect("close frame").expect("ws ok");
        let WsMessage::Close(Some(frame)) = message else {
            panic!("expected close frame, got {message:?}");
        };
        assert_eq!(u16::from(frame.code), 4004);
    }

    #[tokio::test]
    async fn second_attach_while_in_use_is_refused() {
        let addr = serve(ConnectBehavior::Echo).await;
        let base = format!("http://{addr}");
        let client = reqwest::Client::new();

        let started: Value = client
            .post(format!("{base}/voice/start/patient-7"))
            .send()
            .await
            .expect("start request")
            .json()
            .await
            .expect("start body");
        let session_id = started["session_id"].as_str().expect("session id").to_string();
        poll_until(&client, &format!("{base}/voice/status/{session_id}"), "ready").await;

        let url = format!("ws://{addr}/voice-session/{session_id}");
        let (mut first, _) = connect_async(&url).await.expect("first connect");
        first.next().await.expect("status frame").expect("ws ok");

        let (mut second, _) = connect_async(&url).await.expect("second connect");
        let message = second.next().await.expect("close frame").expect("ws ok");
        let WsMessage::Close(Some(frame)) = message else {
            panic!("expected close frame, got {message:?}");
        };
        assert_eq!(u16::from(frame.code), 4004);
    }

    #[tokio::test]
    async fn start_returns_pending_or_connecting_immediately() {
        let addr = serve(ConnectBehavior::Hang).await;
        let client = reqwest::Client::new();

        let started: Value = client
            .post(format!("http://{addr}/voice/start/patient-7"))
            .send()
            .await
            .expect("start request")
            .json()
            .await
            .expect("start body");
        let status = started["status"].as_str().expect("status");
        assert!(
            status == "pending" || status == "connecting",
            "start must not wait for the handshake, got {status}"
        );
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let addr = serve(ConnectBehavior::Ready).await;
        let client = reqwest::Client::new();

        let doc: Value = client
            .get(format!("http://{addr}/api-docs/openapi.json"))
            .send()
            .await
            .expect("openapi request")
            .json()
            .await
            .expect("openapi body");
        assert!(doc["paths"]["/voice/start/{subject_id}"]["post"].is_object());
        assert!(doc["paths"]["/voice/session/{session_id}"]["delete"].is_object());
    }
}

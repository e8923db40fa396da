mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::{MockSpeechService, SentInput};
use voice_relay::audio::codec;
use voice_relay::config::Config;
use voice_relay::protocol::TransportMessage;
use voice_relay::relay::{create_router, AppState};
use voice_relay::upstream::{ResponsePart, UpstreamEvent};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the relay on an ephemeral port and return its /ws URL.
async fn spawn_relay(service: Arc<MockSpeechService>) -> String {
    let state = AppState::new(Config::default(), service);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("ws://{}/ws", addr)
}

async fn connect(url: &str) -> WsClient {
    let (ws, _response) = connect_async(url).await.expect("websocket connect failed");
    ws
}

/// Receive the next protocol message, skipping transport-level frames.
async fn recv_message(ws: &mut WsClient) -> TransportMessage {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for server message")
            .expect("connection closed")
            .expect("transport error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("server sent invalid JSON");
        }
    }
}

async fn send_raw(ws: &mut WsClient, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

async fn send_message(ws: &mut WsClient, message: &TransportMessage) {
    send_raw(ws, &serde_json::to_string(message).unwrap()).await;
}

/// Poll until `cond` holds; the server processes frames asynchronously.
async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..250 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_connect_opens_session_and_reports_ready() {
    let service = Arc::new(MockSpeechService::new());
    let url = spawn_relay(service.clone()).await;

    let mut ws = connect(&url).await;
    assert_eq!(
        recv_message(&mut ws).await,
        TransportMessage::status("Session ready")
    );
    assert_eq!(service.session_count(), 1);
}

#[tokio::test]
async fn test_malformed_frames_cost_one_status_not_the_connection() {
    let service = Arc::new(MockSpeechService::new());
    let url = spawn_relay(service.clone()).await;

    let mut ws = connect(&url).await;
    let _ready = recv_message(&mut ws).await;

    // Not JSON at all.
    send_raw(&mut ws, "this is not json").await;
    assert_eq!(
        recv_message(&mut ws).await,
        TransportMessage::status("Bad client message")
    );

    // Valid JSON, unknown envelope.
    send_raw(&mut ws, r#"{"type":"bogus"}"#).await;
    assert_eq!(
        recv_message(&mut ws).await,
        TransportMessage::status("Bad client message")
    );

    // Known envelope, missing payload.
    send_raw(&mut ws, r#"{"type":"text"}"#).await;
    assert_eq!(
        recv_message(&mut ws).await,
        TransportMessage::status("Bad client message")
    );

    // Status is server-to-client only.
    send_raw(&mut ws, r#"{"type":"status","message":"hi"}"#).await;
    assert_eq!(
        recv_message(&mut ws).await,
        TransportMessage::status("Bad client message")
    );

    // The connection survived all of it and still relays input.
    send_message(
        &mut ws,
        &TransportMessage::Text {
            text: "still here".to_string(),
        },
    )
    .await;
    let probe = service.probe(0);
    wait_until("text input to reach upstream", || !probe.sent().is_empty()).await;
    assert_eq!(
        probe.sent(),
        vec![SentInput::Text("still here".to_string())]
    );
}

#[tokio::test]
async fn test_client_audio_reaches_upstream_with_capture_mime() {
    let service = Arc::new(MockSpeechService::new());
    let url = spawn_relay(service.clone()).await;

    let mut ws = connect(&url).await;
    let _ready = recv_message(&mut ws).await;

    let pcm = codec::encode_samples(&[0.5f32, -0.5, 0.25, 0.0]);
    send_message(
        &mut ws,
        &TransportMessage::Audio {
            base64: codec::encode_base64(&pcm),
            mime_type: None,
        },
    )
    .await;

    let probe = service.probe(0);
    wait_until("audio frame to reach upstream", || !probe.sent().is_empty()).await;
    match &probe.sent()[0] {
        SentInput::Audio(bytes, mime) => {
            assert_eq!(bytes, &pcm);
            // Default capture rate from Config.
            assert_eq!(mime, "audio/pcm;rate=16000");
        }
        other => panic!("expected audio input, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reset_replaces_session() {
    let service = Arc::new(MockSpeechService::new());
    let url = spawn_relay(service.clone()).await;

    let mut ws = connect(&url).await;
    assert_eq!(
        recv_message(&mut ws).await,
        TransportMessage::status("Session ready")
    );

    send_message(&mut ws, &TransportMessage::Reset).await;
    assert_eq!(
        recv_message(&mut ws).await,
        TransportMessage::status("Session ready")
    );

    assert_eq!(service.session_count(), 2);
    assert!(service.probe(0).is_closed());
    assert!(!service.probe(1).is_closed());

    // Input after the reset lands in the replacement session.
    send_message(
        &mut ws,
        &TransportMessage::Text {
            text: "after reset".to_string(),
        },
    )
    .await;
    let probe = service.probe(1);
    wait_until("input to reach new session", || !probe.sent().is_empty()).await;
    assert!(service.probe(0).sent().is_empty());
}

#[tokio::test]
async fn test_upstream_parts_relayed_in_order() {
    let service = Arc::new(MockSpeechService::new());
    let url = spawn_relay(service.clone()).await;

    let mut ws = connect(&url).await;
    let _ready = recv_message(&mut ws).await;

    let probe = service.probe(0);
    probe
        .events
        .send(UpstreamEvent::Parts(vec![
            ResponsePart {
                text: Some("first".to_string()),
                audio: None,
            },
            ResponsePart {
                text: Some("second".to_string()),
                audio: None,
            },
        ]))
        .await
        .unwrap();

    assert_eq!(
        recv_message(&mut ws).await,
        TransportMessage::Text {
            text: "first".to_string()
        }
    );
    assert_eq!(
        recv_message(&mut ws).await,
        TransportMessage::Text {
            text: "second".to_string()
        }
    );
}

#[tokio::test]
async fn test_large_turn_relayed_without_stall() {
    let service = Arc::new(MockSpeechService::new());
    let url = spawn_relay(service.clone()).await;

    let mut ws = connect(&url).await;
    let _ready = recv_message(&mut ws).await;

    // One event carrying far more parts than the outbound queue holds;
    // relaying it must not wedge the connection.
    let parts: Vec<ResponsePart> = (0..200)
        .map(|i| ResponsePart {
            text: Some(format!("part {}", i)),
            audio: None,
        })
        .collect();
    service
        .probe(0)
        .events
        .send(UpstreamEvent::Parts(parts))
        .await
        .unwrap();

    for i in 0..200 {
        assert_eq!(
            recv_message(&mut ws).await,
            TransportMessage::Text {
                text: format!("part {}", i)
            }
        );
    }

    // The dispatch loop is still alive and still routing input.
    send_message(
        &mut ws,
        &TransportMessage::Text {
            text: "still responsive".to_string(),
        },
    )
    .await;
    let probe = service.probe(0);
    wait_until("input to reach upstream after large turn", || {
        !probe.sent().is_empty()
    })
    .await;
}

#[tokio::test]
async fn test_failed_open_keeps_connection_alive() {
    let service = Arc::new(MockSpeechService::new());
    service.refuse_next_connect();
    let url = spawn_relay(service.clone()).await;

    let mut ws = connect(&url).await;
    match recv_message(&mut ws).await {
        TransportMessage::Status { message } => {
            assert!(message.starts_with("Failed to open session:"), "{}", message);
        }
        other => panic!("expected status, got {:?}", other),
    }

    // Reset retries the open over the same connection.
    send_message(&mut ws, &TransportMessage::Reset).await;
    assert_eq!(
        recv_message(&mut ws).await,
        TransportMessage::status("Session ready")
    );
    assert_eq!(service.session_count(), 1);
}

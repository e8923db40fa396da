// Production SpeechService over a streaming WebSocket API.
//
// Speaks the live-session wire shape: one `setup` message on connect,
// `realtimeInput` messages for text and audio input, and
// `serverContent` messages whose model-turn parts carry text and
// inline base64 audio. A reader task turns server messages into
// upstream events until the socket closes.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::service::{
    AudioBlob, ResponsePart, SessionOptions, SpeechService, UpstreamEvent, UpstreamHandle,
};
use crate::audio::codec;
use crate::error::RelayError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub struct LiveSpeechService {
    url: String,
}

impl LiveSpeechService {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SpeechService for LiveSpeechService {
    async fn connect(
        &self,
        options: &SessionOptions,
        events: mpsc::Sender<UpstreamEvent>,
    ) -> Result<Box<dyn UpstreamHandle>, RelayError> {
        info!("Connecting to speech service at {}", self.url);

        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let setup = json!({
            "setup": {
                "model": options.model,
                "systemInstruction": {
                    "parts": [{ "text": options.system_instruction }]
                },
                "generationConfig": {
                    "responseModalities": options.response_modalities,
                    "speechConfig": {
                        "voiceConfig": {
                            "prebuiltVoiceConfig": { "voiceName": options.voice }
                        }
                    }
                }
            }
        });
        sink.send(Message::Text(setup.to_string()))
            .await
            .map_err(|e| RelayError::UpstreamConnect(format!("setup send failed: {}", e)))?;

        wait_for_setup_ack(&mut source).await?;
        info!("Speech service session established");

        let reader = tokio::spawn(read_loop(source, events));

        Ok(Box::new(LiveHandle {
            sink,
            reader: Some(reader),
        }))
    }
}

/// Read server messages until the setup acknowledgement arrives.
async fn wait_for_setup_ack(source: &mut WsSource) -> Result<(), RelayError> {
    while let Some(message) = source.next().await {
        let value = match server_json(message) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(e) => return Err(RelayError::UpstreamConnect(e)),
        };

        if value.get("setupComplete").is_some() {
            return Ok(());
        }
        if let Some(error) = value.get("error") {
            return Err(RelayError::UpstreamConnect(error.to_string()));
        }
        debug!("Ignoring pre-setup server message");
    }

    Err(RelayError::UpstreamConnect(
        "connection closed during setup".to_string(),
    ))
}

async fn read_loop(mut source: WsSource, events: mpsc::Sender<UpstreamEvent>) {
    while let Some(message) = source.next().await {
        let value = match server_json(message) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(reason) => {
                let _ = events.send(UpstreamEvent::Error(reason)).await;
                break;
            }
        };

        let parts = parse_model_turn(&value);
        if !parts.is_empty() && events.send(UpstreamEvent::Parts(parts)).await.is_err() {
            // Session replaced; nobody is listening anymore.
            break;
        }
    }

    let _ = events.send(UpstreamEvent::Closed).await;
    debug!("Speech service read loop finished");
}

/// Decode one WebSocket message into a JSON value. `Ok(None)` marks
/// control frames to skip; `Err` ends the session.
fn server_json(
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Result<Option<Value>, String> {
    let text = match message {
        Ok(Message::Text(text)) => text,
        Ok(Message::Binary(bytes)) => String::from_utf8(bytes)
            .map_err(|_| "non-UTF8 binary frame from speech service".to_string())?,
        Ok(Message::Close(_)) => return Err("speech service closed the connection".to_string()),
        Ok(_) => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| format!("malformed server message: {}", e))
}

/// Extract model-turn parts from a `serverContent` message. Parts keep
/// their order; a part may carry text, inline audio, or both.
fn parse_model_turn(value: &Value) -> Vec<ResponsePart> {
    let Some(parts) = value
        .pointer("/serverContent/modelTurn/parts")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    parts
        .iter()
        .filter_map(|part| {
            let text = part.get("text").and_then(Value::as_str).map(str::to_string);
            let audio = part.get("inlineData").and_then(|inline| {
                let mime_type = inline.get("mimeType")?.as_str()?.to_string();
                let encoded = inline.get("data")?.as_str()?;
                match codec::decode_base64(encoded) {
                    Ok(data) => Some(AudioBlob { data, mime_type }),
                    Err(e) => {
                        warn!("Dropping inline audio with bad framing: {}", e);
                        None
                    }
                }
            });

            if text.is_none() && audio.is_none() {
                None
            } else {
                Some(ResponsePart { text, audio })
            }
        })
        .collect()
}

struct LiveHandle {
    sink: WsSink,
    reader: Option<tokio::task::JoinHandle<()>>,
}

impl LiveHandle {
    async fn send_json(&mut self, value: Value) -> Result<(), RelayError> {
        self.sink
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}

#[async_trait]
impl UpstreamHandle for LiveHandle {
    async fn send_text(&mut self, text: &str) -> Result<(), RelayError> {
        self.send_json(json!({ "realtimeInput": { "text": text } }))
            .await
    }

    async fn send_audio(&mut self, pcm: &[u8], mime_type: &str) -> Result<(), RelayError> {
        self.send_json(json!({
            "realtimeInput": {
                "audio": {
                    "data": codec::encode_base64(pcm),
                    "mimeType": mime_type
                }
            }
        }))
        .await
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        let _ = self.sink.send(Message::Close(None)).await;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_turn_parts_in_order() {
        let value = json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "text": "Hello" },
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } }
                    ]
                }
            }
        });

        let parts = parse_model_turn(&value);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].text.as_deref(), Some("Hello"));
        assert!(parts[0].audio.is_none());
        let audio = parts[1].audio.as_ref().unwrap();
        assert_eq!(audio.mime_type, "audio/pcm;rate=24000");
        assert_eq!(audio.data.len(), 3);
    }

    #[test]
    fn test_parse_non_content_message() {
        let value = json!({ "setupComplete": {} });
        assert!(parse_model_turn(&value).is_empty());
    }
}

// Native voice client.
//
// Capture side: microphone frames → PCM16 → base64 → `audio` messages.
// Playback side: `audio` messages → base64 → PCM16 → scheduler → device.
// Stdin lines become `text` messages; `/reset` asks the relay to
// replace its upstream session and interrupts local playback so the
// old turn stops immediately.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

use crate::audio::{codec, AudioFrame, AudioOutput, CapturePipeline};
use crate::protocol::TransportMessage;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub url: String,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub frame_samples: usize,
}

/// Connection status shown to the user. Never left blank: every
/// failure path writes a concrete description before returning.
struct StatusLine {
    current: String,
}

impl StatusLine {
    fn new() -> Self {
        let mut status = Self {
            current: String::new(),
        };
        status.set("connecting");
        status
    }

    fn set(&mut self, status: impl Into<String>) {
        self.current = status.into();
        println!("[{}]", self.current);
    }

    fn get(&self) -> &str {
        &self.current
    }
}

pub async fn run(options: ClientOptions) -> Result<()> {
    let mut status = StatusLine::new();

    let (stream, _) = connect_async(options.url.as_str())
        .await
        .with_context(|| format!("failed to connect to relay at {}", options.url))?;
    let (mut ws_tx, mut ws_rx) = stream.split();
    info!("Connected to relay at {}", options.url);

    // Speaker output; without it the client still works for text.
    let output = match AudioOutput::start() {
        Ok(output) => Some(output),
        Err(e) => {
            warn!("Audio output unavailable: {}", e);
            None
        }
    };

    // Microphone capture; denial degrades to text-only input.
    let (frames_tx, mut frames_rx) = mpsc::channel::<AudioFrame>(32);
    let mut capture = CapturePipeline::new(options.capture_sample_rate, options.frame_samples);
    match capture.start(frames_tx) {
        Ok(()) => status.set("recording"),
        Err(e) => status.set(format!("microphone unavailable: {}", e)),
    }

    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(frame) = frames_rx.recv() => {
                let message = TransportMessage::Audio {
                    base64: codec::encode_base64(&frame.to_pcm_bytes()),
                    mime_type: None,
                };
                if send_message(&mut ws_tx, &message).await.is_err() {
                    status.set("disconnected");
                    break;
                }
            }

            line = stdin_lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }

                        let message = if line == "/reset" {
                            if let Some(output) = &output {
                                if let Ok(mut scheduler) = output.scheduler().lock() {
                                    scheduler.interrupt();
                                }
                            }
                            TransportMessage::Reset
                        } else {
                            TransportMessage::Text { text: line.to_string() }
                        };

                        if send_message(&mut ws_tx, &message).await.is_err() {
                            status.set("disconnected");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Stdin closed; shutting down");
                        break;
                    }
                    Err(e) => {
                        warn!("Stdin error: {}", e);
                        break;
                    }
                }
            }

            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_server_message(&text, output.as_ref(), &options, &mut status);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        status.set("disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        status.set(format!("connection error: {}", e));
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    capture.stop();
    info!("Client finished with status: {}", status.get());
    Ok(())
}

/// Send one message; channel-closing races are reported to the caller
/// but never panic.
async fn send_message<S>(ws_tx: &mut S, message: &TransportMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize message: {}", e);
            return Ok(());
        }
    };
    if ws_tx.send(Message::Text(json)).await.is_err() {
        debug!("Relay connection closed mid-send");
        return Err(());
    }
    Ok(())
}

fn handle_server_message(
    text: &str,
    output: Option<&AudioOutput>,
    options: &ClientOptions,
    status: &mut StatusLine,
) {
    match serde_json::from_str::<TransportMessage>(text) {
        Ok(TransportMessage::Status { message }) => {
            status.set(message);
        }
        Ok(TransportMessage::Text { text }) => {
            println!("{}", text);
        }
        Ok(TransportMessage::Audio { base64, mime_type }) => {
            let Some(output) = output else {
                debug!("Dropping audio message: no output device");
                return;
            };

            let samples = match codec::decode_base64(&base64)
                .and_then(|bytes| codec::decode_samples(&bytes))
            {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("Ignoring malformed audio from relay: {}", e);
                    return;
                }
            };

            let rate = mime_type
                .as_deref()
                .and_then(codec::pcm_mime_rate)
                .unwrap_or(options.playback_sample_rate);

            let now = output.now();
            if let Ok(mut scheduler) = output.scheduler().lock() {
                scheduler.enqueue(samples, rate, now);
            }
        }
        Ok(TransportMessage::Reset) => {
            warn!("Relay sent a reset message; ignoring");
        }
        Err(e) => {
            warn!("Ignoring malformed relay message: {}", e);
        }
    }
}

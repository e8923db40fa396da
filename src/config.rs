use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Outbound microphone rate (client → relay → upstream)
    pub capture_sample_rate: u32,
    /// Fallback rate for inbound audio without an explicit mime rate
    pub playback_sample_rate: u32,
    /// Samples per capture frame; latency vs. per-frame overhead
    pub frame_samples: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// WebSocket endpoint of the streaming speech service
    pub url: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub response_modalities: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-relay".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16000,
            playback_sample_rate: 24000,
            frame_samples: 512,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9000/session".to_string(),
            model: "models/streaming-speech-001".to_string(),
            voice: "Default".to_string(),
            system_instruction: "You are a helpful voice assistant. Keep replies short."
                .to_string(),
            response_modalities: vec!["AUDIO".to_string()],
        }
    }
}

impl Config {
    /// Load from a config file; a missing file falls back to defaults
    /// so the binary runs without one.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

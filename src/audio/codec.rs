// PCM16 codec: float samples ↔ little-endian signed 16-bit bytes,
// plus the base64 framing used to carry frames inside JSON envelopes.
//
// Pure and stateless. Sample rates are never assumed here; they travel
// alongside the data (AudioFrame, mime type parameters).

use base64::Engine;

use crate::error::RelayError;

/// Encode float samples in [-1, 1] to PCM16 LE bytes.
///
/// Full scale maps to the asymmetric i16 range: 1.0 becomes 32767 and
/// -1.0 becomes -32768. NaN is treated as silence.
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&quantize_sample(sample).to_le_bytes());
    }
    bytes
}

/// Quantize one float sample to i16 with a uniform 1/32768 step,
/// rounded to nearest. The saturating cast caps +32768 at 32767, so
/// the worst round-trip error (at positive full scale) stays within
/// one decoded step.
pub fn quantize_sample(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    (s * 32768.0).round() as i16
}

/// Decode PCM16 LE bytes back to float samples scaled by 1/32768.
pub fn decode_samples(bytes: &[u8]) -> Result<Vec<f32>, RelayError> {
    if bytes.len() % 2 != 0 {
        return Err(RelayError::MalformedAudio(format!(
            "PCM16 payload has odd length ({} bytes)",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Base64 text framing for binary PCM payloads.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>, RelayError> {
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| RelayError::MalformedAudio(format!("invalid base64 framing: {}", e)))
}

/// Extract the sample rate from a PCM mime type such as
/// `audio/pcm;rate=24000`. Returns None for anything else.
pub fn pcm_mime_rate(mime_type: &str) -> Option<u32> {
    let (kind, params) = mime_type.split_once(';')?;
    if kind.trim() != "audio/pcm" {
        return None;
    }
    params.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim() == "rate" {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Build the PCM mime type for a given sample rate.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

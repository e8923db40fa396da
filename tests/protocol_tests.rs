use voice_relay::protocol::TransportMessage;

#[test]
fn test_client_audio_wire_shape() {
    let msg = TransportMessage::Audio {
        base64: "AAAA".to_string(),
        mime_type: None,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"type\":\"audio\""));
    assert!(json.contains("\"base64\":\"AAAA\""));
    // Clients omit the mime type entirely rather than sending null.
    assert!(!json.contains("mimeType"));

    let round_tripped: TransportMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(round_tripped, msg);
}

#[test]
fn test_server_audio_carries_mime_type() {
    let msg = TransportMessage::Audio {
        base64: "AAAA".to_string(),
        mime_type: Some("audio/pcm;rate=24000".to_string()),
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"mimeType\":\"audio/pcm;rate=24000\""));
}

#[test]
fn test_reset_is_bare_envelope() {
    let json = serde_json::to_string(&TransportMessage::Reset).unwrap();
    assert_eq!(json, r#"{"type":"reset"}"#);

    let parsed: TransportMessage = serde_json::from_str(r#"{"type":"reset"}"#).unwrap();
    assert_eq!(parsed, TransportMessage::Reset);
}

#[test]
fn test_status_round_trip() {
    let json = r#"{"type":"status","message":"Session ready"}"#;
    let parsed: TransportMessage = serde_json::from_str(json).unwrap();
    assert_eq!(parsed, TransportMessage::status("Session ready"));
}

#[test]
fn test_unknown_tag_rejected_whole() {
    let result = serde_json::from_str::<TransportMessage>(r#"{"type":"bogus","text":"hi"}"#);
    assert!(result.is_err());
}

#[test]
fn test_missing_required_field_rejected() {
    assert!(serde_json::from_str::<TransportMessage>(r#"{"type":"text"}"#).is_err());
    assert!(serde_json::from_str::<TransportMessage>(r#"{"type":"audio"}"#).is_err());
}

#[test]
fn test_missing_tag_rejected() {
    assert!(serde_json::from_str::<TransportMessage>(r#"{"text":"hi"}"#).is_err());
}

#[test]
fn test_validate_rejects_empty_payloads() {
    let empty_text = TransportMessage::Text {
        text: String::new(),
    };
    assert!(empty_text.validate().is_err());

    let empty_audio = TransportMessage::Audio {
        base64: String::new(),
        mime_type: None,
    };
    assert!(empty_audio.validate().is_err());

    assert!(TransportMessage::Reset.validate().is_ok());
    assert!(TransportMessage::status("ok").validate().is_ok());
}

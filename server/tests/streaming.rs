//! End-to-end tests of the audio endpoints against a scripted provider

mod common;

use std::time::Duration;

use axum::{body::to_bytes, http::StatusCode};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;

use common::*;
use server::config::ServerConfig;
use tts_core::{SpeechError, DEFAULT_MODEL_ID, DEFAULT_VOICE_ID};

#[tokio::test]
async fn test_stream_audio_forwards_chunks() {
    let ctx = create_test_context(MockSpeech::with_chunks(&[b"ID3", b"\x00\x01", b"frames"]));

    let response = ctx
        .send(json_request("POST", "/stream-audio", &json!({"text": "Hello there"})))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "audio/mpeg");
    assert_eq!(headers["transfer-encoding"], "chunked");
    assert_eq!(headers["cache-control"], "no-cache");

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ID3\x00\x01frames");

    let relay = ctx.state.metrics.relay.clone();
    assert!(eventually(|| relay.snapshot().completed == 1).await);
    assert_eq!(relay.snapshot().bytes_forwarded, 11);
}

#[tokio::test]
async fn test_stream_audio_applies_defaults() {
    let ctx = create_test_context(MockSpeech::with_chunks(&[b"x"]));

    let response = ctx
        .send(json_request("POST", "/api/stream-audio", &json!({"text": "Hi"})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (voice_id, request) = ctx.speech.last_request().expect("provider called");
    assert_eq!(voice_id, DEFAULT_VOICE_ID);
    assert_eq!(request.model_id, DEFAULT_MODEL_ID);
    assert_eq!(request.voice_settings.stability, 0.5);
    assert_eq!(request.voice_settings.similarity_boost, 0.75);
    assert_eq!(request.voice_settings.style, 0.0);
    assert!(request.voice_settings.use_speaker_boost);
}

#[tokio::test]
async fn test_stream_audio_partial_settings_override() {
    let ctx = create_test_context(MockSpeech::with_chunks(&[b"x"]));

    let response = ctx
        .send(json_request(
            "POST",
            "/stream-audio",
            &json!({
                "text": "Hi",
                "voiceId": "customVoice01",
                "settings": {"stability": 0.2, "use_speaker_boost": false}
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (voice_id, request) = ctx.speech.last_request().unwrap();
    assert_eq!(voice_id, "customVoice01");
    assert_eq!(request.voice_settings.stability, 0.2);
    assert_eq!(request.voice_settings.similarity_boost, 0.75);
    assert!(!request.voice_settings.use_speaker_boost);
}

#[tokio::test]
async fn test_stream_audio_empty_text_never_calls_provider() {
    let ctx = create_test_context(MockSpeech::with_chunks(&[b"x"]));

    for body in [json!({"text": ""}), json!({"text": "   "}), json!({})] {
        let response = ctx.send(json_request("POST", "/stream-audio", &body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = body_json(response).await;
        assert_eq!(error["error"], "Text is required");
        assert_eq!(error["code"], 400);
    }
    assert_eq!(ctx.speech.opened(), 0);
}

#[tokio::test]
async fn test_stream_audio_rejects_out_of_range_settings() {
    let ctx = create_test_context(MockSpeech::with_chunks(&[b"x"]));

    let response = ctx
        .send(json_request(
            "POST",
            "/stream-audio",
            &json!({"text": "Hi", "settings": {"style": 2.0}}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ctx.speech.opened(), 0);
}

#[tokio::test]
async fn test_stream_audio_upstream_open_failure() {
    let ctx = create_test_context(MockSpeech::failing(SpeechError::UpstreamUnavailable(
        "provider returned 401 Unauthorized".to_string(),
    )));

    let response = ctx
        .send(json_request("POST", "/stream-audio", &json!({"text": "Hello"})))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()["content-type"], "application/json");
    let error = body_json(response).await;
    assert_eq!(error["code"], 500);
    assert!(error["error"].as_str().unwrap().contains("401"));

    let relay = ctx.state.metrics.relay.snapshot();
    assert_eq!(relay.upstream_open_failures, 1);
    assert_eq!(relay.started, 0);
}

#[tokio::test]
async fn test_stream_audio_mid_stream_failure_aborts_body() {
    let ctx = create_test_context(MockSpeech::with_script(vec![
        Ok(Bytes::from_static(b"first")),
        Ok(Bytes::from_static(b"second")),
        Err(SpeechError::StreamInterrupted("connection reset".to_string())),
    ]));

    let response = ctx
        .send(json_request("POST", "/stream-audio", &json!({"text": "Hello"})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let mut received = Vec::new();
    let mut failed = false;
    while let Some(item) = body.next().await {
        match item {
            Ok(chunk) => received.extend_from_slice(&chunk),
            Err(_) => {
                failed = true;
                break;
            }
        }
    }
    assert_eq!(received, b"firstsecond");
    assert!(failed, "truncated stream must end with an error");

    let relay = ctx.state.metrics.relay.clone();
    assert!(eventually(|| relay.snapshot().interrupted == 1).await);
}

#[tokio::test]
async fn test_stream_audio_client_disconnect_stops_upstream() {
    let ctx = create_test_context(MockSpeech::with_chunks(&[b"1", b"2", b"3", b"4", b"5"]));

    let response = ctx
        .send(json_request("POST", "/stream-audio", &json!({"text": "Hello"})))
        .await;
    let mut body = response.into_body().into_data_stream();
    assert_eq!(&body.next().await.unwrap().unwrap()[..], b"1");
    assert_eq!(&body.next().await.unwrap().unwrap()[..], b"2");
    drop(body);

    let relay = ctx.state.metrics.relay.clone();
    assert!(eventually(|| relay.snapshot().consumer_disconnected == 1).await);
    assert!(ctx.speech.pulled() < 5, "pulled {} chunks", ctx.speech.pulled());
    assert_eq!(relay.snapshot().completed, 0);
}

#[tokio::test]
async fn test_stream_audio_deadline_aborts_stalled_upstream() {
    let config = ServerConfig {
        stream_timeout_secs: Some(1),
        ..ServerConfig::default()
    };
    let ctx = create_test_context_with(MockSpeech::stalling(&[b"head"]), config);

    let response = ctx
        .send(json_request("POST", "/stream-audio", &json!({"text": "Hello"})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    assert_eq!(&body.next().await.unwrap().unwrap()[..], b"head");
    let last = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("deadline should end the stream");
    assert!(matches!(last, Some(Err(_))));

    let relay = ctx.state.metrics.relay.clone();
    assert!(eventually(|| relay.snapshot().interrupted == 1).await);
}

#[tokio::test]
async fn test_tts_returns_base64_audio() {
    let ctx = create_test_context(MockSpeech::with_chunks(&[b"ID3", b"-mpeg"]));

    let response = ctx
        .send(json_request("POST", "/tts", &json!({"text": "Hello", "voice_id": "abc"})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["content_type"], "audio/mpeg");
    assert_eq!(body["byte_length"], 8);
    let audio = general_purpose::STANDARD
        .decode(body["audio_base64"].as_str().unwrap())
        .unwrap();
    assert_eq!(audio, b"ID3-mpeg");
    assert_eq!(ctx.speech.last_request().unwrap().0, "abc");
}

#[tokio::test]
async fn test_tts_mid_stream_failure_is_server_error() {
    let ctx = create_test_context(MockSpeech::with_script(vec![
        Ok(Bytes::from_static(b"partial")),
        Err(SpeechError::StreamInterrupted("connection reset".to_string())),
    ]));

    let response = ctx
        .send(json_request("POST", "/tts", &json!({"text": "Hello"})))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("connection reset"));
}

#[tokio::test]
async fn test_tts_text_too_long() {
    let ctx = create_test_context(MockSpeech::with_chunks(&[b"x"]));
    let text = "a".repeat(5001);

    let response = ctx
        .send(json_request("POST", "/tts", &json!({"text": text})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ctx.speech.opened(), 0);
}

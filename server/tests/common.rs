//! Common utilities for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use tower::ServiceExt;

use server::config::ServerConfig;
use server::{router, AppState};
use tts_core::{
    ByteStream, ConvertRequest, CreateVoiceRequest, CreatedVoice, ProviderVoice, SpeechError,
    SpeechProvider, VoiceDesignProvider, VoiceDesignRequest, VoiceDesignResult, VoicePreview,
};
use uuid::Uuid;
use voice_store::{MemoryVoiceStore, NewVoice, StoreError, Voice, VoiceStore, VoiceUpdate};

/// Speech provider that replays a fixed list of chunks.
pub struct MockSpeech {
    chunks: Vec<Result<Bytes, SpeechError>>,
    open_error: Option<SpeechError>,
    stall: bool,
    pub opened: AtomicUsize,
    pub pulled: Arc<AtomicUsize>,
    pub last_request: Mutex<Option<(String, ConvertRequest)>>,
}

impl MockSpeech {
    pub fn with_chunks(parts: &[&'static [u8]]) -> Self {
        Self::with_script(parts.iter().map(|p| Ok(Bytes::from_static(p))).collect())
    }

    pub fn with_script(chunks: Vec<Result<Bytes, SpeechError>>) -> Self {
        Self {
            chunks,
            open_error: None,
            stall: false,
            opened: AtomicUsize::new(0),
            pulled: Arc::new(AtomicUsize::new(0)),
            last_request: Mutex::new(None),
        }
    }

    /// Sends `parts`, then never ends.
    pub fn stalling(parts: &[&'static [u8]]) -> Self {
        let mut mock = Self::with_chunks(parts);
        mock.stall = true;
        mock
    }

    pub fn failing(error: SpeechError) -> Self {
        let mut mock = Self::with_script(Vec::new());
        mock.open_error = Some(error);
        mock
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<(String, ConvertRequest)> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechProvider for MockSpeech {
    async fn convert(&self, voice_id: &str, request: &ConvertRequest) -> Result<ByteStream, SpeechError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((voice_id.to_string(), request.clone()));
        if let Some(e) = &self.open_error {
            return Err(e.clone());
        }
        let items = self.chunks.clone();
        let pulled = self.pulled.clone();
        let stall = self.stall;
        let stream = async_stream::stream! {
            for item in items {
                pulled.fetch_add(1, Ordering::SeqCst);
                yield item;
            }
            if stall {
                std::future::pending::<()>().await;
            }
        };
        Ok(stream.boxed())
    }
}

/// Voice design provider returning canned previews and voices.
#[derive(Default)]
pub struct MockDesigner {
    pub preview_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl MockDesigner {
    pub fn preview_calls(&self) -> usize {
        self.preview_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceDesignProvider for MockDesigner {
    async fn create_previews(&self, request: &VoiceDesignRequest) -> Result<VoiceDesignResult, SpeechError> {
        self.preview_calls.fetch_add(1, Ordering::SeqCst);
        let previews = (1..=3)
            .map(|i| VoicePreview {
                generated_voice_id: format!("gen-{i}"),
                audio_base64: "SUQz".to_string(),
                media_type: "audio/mpeg".to_string(),
                duration_secs: 5.0 + i as f64,
            })
            .collect();
        Ok(VoiceDesignResult {
            previews,
            text: request.text.clone(),
        })
    }

    async fn create_voice(&self, request: &CreateVoiceRequest) -> Result<CreatedVoice, SpeechError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if request.generated_voice_id == "expired" {
            return Err(SpeechError::UpstreamUnavailable(
                "provider returned 404 Not Found".to_string(),
            ));
        }
        Ok(CreatedVoice {
            voice_id: format!("perm-{}", request.generated_voice_id),
            name: request.voice_name.clone(),
        })
    }

    async fn list_voices(&self) -> Result<Vec<ProviderVoice>, SpeechError> {
        Ok(vec![
            ProviderVoice {
                voice_id: "EXAVITQu4vr4xnSDxMaL".to_string(),
                name: "Bella".to_string(),
                description: None,
                category: Some("premade".to_string()),
                labels: HashMap::from([("accent".to_string(), "american".to_string())]),
            },
            ProviderVoice {
                voice_id: "perm-gen-1".to_string(),
                name: "Old Sailor".to_string(),
                description: Some("Gravelly".to_string()),
                category: Some("generated".to_string()),
                labels: HashMap::new(),
            },
        ])
    }
}

/// Store whose every call fails as if the database were unreachable.
pub struct UnavailableStore;

#[async_trait]
impl VoiceStore for UnavailableStore {
    async fn create(&self, _voice: NewVoice) -> Result<Voice, StoreError> {
        Err(StoreError::Request("connection refused".to_string()))
    }

    async fn list_for_user(&self, _user_id: &str) -> Result<Vec<Voice>, StoreError> {
        Err(StoreError::Request("connection refused".to_string()))
    }

    async fn update(&self, _user_id: &str, _id: Uuid, _update: VoiceUpdate) -> Result<Voice, StoreError> {
        Err(StoreError::Request("connection refused".to_string()))
    }

    async fn delete(&self, _user_id: &str, _id: Uuid) -> Result<(), StoreError> {
        Err(StoreError::Request("connection refused".to_string()))
    }
}

pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub speech: Arc<MockSpeech>,
    pub designer: Arc<MockDesigner>,
}

impl TestContext {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

pub fn create_test_context(speech: MockSpeech) -> TestContext {
    create_test_context_with(speech, ServerConfig::default())
}

pub fn create_test_context_with(speech: MockSpeech, config: ServerConfig) -> TestContext {
    create_test_context_with_store(speech, config, Arc::new(MemoryVoiceStore::new()))
}

pub fn create_test_context_with_store(
    speech: MockSpeech,
    config: ServerConfig,
    store: Arc<dyn VoiceStore>,
) -> TestContext {
    let speech = Arc::new(speech);
    let designer = Arc::new(MockDesigner::default());
    let state = AppState::new(config, speech.clone(), designer.clone(), store);
    TestContext {
        app: router(state.clone()),
        state,
        speech,
        designer,
    }
}

/// Create a test app instance
pub async fn create_test_app() -> Router {
    create_test_context(MockSpeech::with_chunks(&[b"ID3", b"audio"])).app
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Poll `condition` for up to a second.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

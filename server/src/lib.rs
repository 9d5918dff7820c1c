pub mod config;
pub mod error;
pub mod metrics;
pub mod validation;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{FromRequest, Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tts_core::{
    content_type_for, encode_audio_base64, CreateVoiceRequest, ProviderVoice, SpeechError,
    SpeechProvider, StreamRelay, SynthesisRequest, VoiceDesignProvider, VoiceDesignRequest,
    VoiceDesignResult, VoiceSettings, DEFAULT_OUTPUT_FORMAT, DEFAULT_VOICE_ID,
};
use voice_store::{NewVoice, Voice, VoiceStore, VoiceUpdate};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{AppMetrics, DetailedMetricsResponse, SystemMetrics};
use crate::validation::{
    parse_record_id, validate_settings, validate_speech_text, validate_voice_id,
    validate_voice_name,
};

static START_TIME: OnceLock<Instant> = OnceLock::new();

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<StreamRelay>,
    pub designer: Arc<dyn VoiceDesignProvider>,
    pub store: Arc<dyn VoiceStore>,
    pub metrics: AppMetrics,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
}

impl AppState {
    /// Wire the provider and store into shared state. The relay reports to
    /// the metrics created here.
    pub fn new(
        config: ServerConfig,
        speech: Arc<dyn SpeechProvider>,
        designer: Arc<dyn VoiceDesignProvider>,
        store: Arc<dyn VoiceStore>,
    ) -> Self {
        let _ = START_TIME.get_or_init(Instant::now);
        let metrics = AppMetrics::new();
        let mut relay = StreamRelay::new(speech)
            .with_config(config.relay_config())
            .with_observer(Arc::new(metrics.relay.clone()));
        if let Some(model_id) = &config.elevenlabs_model_id {
            relay = relay.with_model(model_id.clone());
        }
        Self {
            relay: Arc::new(relay),
            designer,
            store,
            metrics,
            request_count: Arc::new(AtomicU64::new(0)),
            config,
        }
    }
}

/// JSON body extractor whose rejections use the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "voiceId", alias = "voice_id")]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub settings: Option<VoiceSettings>,
}

impl SpeechRequest {
    pub fn into_synthesis(self) -> Result<SynthesisRequest, ApiError> {
        validate_speech_text(&self.text)?;
        let voice_id = self.voice_id.unwrap_or_else(|| DEFAULT_VOICE_ID.to_string());
        validate_voice_id(&voice_id)?;
        let settings = self.settings.unwrap_or_default();
        validate_settings(&settings)?;
        Ok(SynthesisRequest::new(self.text)
            .with_voice(voice_id)
            .with_settings(settings))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TtsResponse {
    pub audio_base64: String,
    pub content_type: String,
    pub byte_length: usize,
}

#[derive(Debug, Deserialize)]
pub struct SaveVoiceRequest {
    pub generated_voice_id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub settings: Option<VoiceSettings>,
}

/// Routes of the service, mounted at the root and under `/api`.
pub fn router(state: AppState) -> Router {
    let public_api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/stream-audio", post(stream_audio))
        .route("/tts", post(tts_endpoint))
        .route("/voice-design/previews", post(design_previews))
        .route("/voices", post(save_voice).get(list_voices))
        .route("/voices/{id}", patch(update_voice).delete(delete_voice))
        .route("/provider-voices", get(list_provider_voices));

    // Metrics endpoint - consider adding authentication in production
    let metrics_api = Router::new().route("/metrics", get(metrics_endpoint));

    let api = Router::new().merge(public_api).merge(metrics_api);

    Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .layer(axum::middleware::from_fn(add_request_id))
        .with_state(state)
}

/// Request ID middleware for tracing
pub async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    // A hyphenated uuid is always a valid header value.
    let value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &value {
        request.headers_mut().insert("x-request-id", value.clone());
    }
    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub async fn health_check() -> &'static str {
    "ok"
}

/// Stream synthesized audio to the client as it arrives from the provider.
pub async fn stream_audio(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SpeechRequest>,
) -> Result<Response, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();

    let result = async {
        let request = req.into_synthesis()?;
        info!(
            "Stream request: voice={}, text length={}",
            request.voice_id,
            request.text.len()
        );
        let handle = state.relay.relay(request).await.map_err(|e| {
            if matches!(e, SpeechError::UpstreamUnavailable(_)) {
                state.metrics.relay.record_open_failure();
            }
            e
        })?;
        state.metrics.relay.record_started();

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type_for(DEFAULT_OUTPUT_FORMAT))
            .header(header::TRANSFER_ENCODING, "chunked")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(handle))
            .map_err(|e| ApiError::InternalError(format!("Failed to build stream response: {e}")))
    }
    .await;

    state.metrics.stream_audio.track(start, result)
}

/// Synthesize the whole clip and return it as Base64 JSON.
pub async fn tts_endpoint(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SpeechRequest>,
) -> Result<Json<TtsResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();

    let result = async {
        let request = req.into_synthesis()?;
        let audio = state.relay.synthesize_complete(request).await?;
        Ok::<_, ApiError>(Json(TtsResponse {
            audio_base64: encode_audio_base64(&audio),
            content_type: content_type_for(DEFAULT_OUTPUT_FORMAT).to_string(),
            byte_length: audio.len(),
        }))
    }
    .await;

    state.metrics.tts.track(start, result)
}

/// Generate candidate voices from a description.
pub async fn design_previews(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VoiceDesignRequest>,
) -> Result<Json<VoiceDesignResult>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();

    let result = async {
        req.validate()?;
        let design = state.designer.create_previews(&req).await?;
        info!("Generated {} voice previews", design.previews.len());
        Ok::<_, ApiError>(Json(design))
    }
    .await;

    state.metrics.voice_design.track(start, result)
}

/// Keep a generated preview as a permanent voice and add it to the library.
pub async fn save_voice(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SaveVoiceRequest>,
) -> Result<(StatusCode, Json<Voice>), ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();

    let result = async {
        validate_voice_name(&req.name)?;
        let settings = req.settings.unwrap_or_default();
        validate_settings(&settings)?;

        let created = state
            .designer
            .create_voice(&CreateVoiceRequest {
                generated_voice_id: req.generated_voice_id,
                voice_name: req.name.trim().to_string(),
                voice_description: req.description.clone(),
                labels: None,
            })
            .await?;

        let provider_voice_id = created.voice_id.clone();
        let voice = state
            .store
            .create(NewVoice {
                user_id: state.config.default_user_id.clone(),
                voice_id: created.voice_id,
                name: created.name,
                description: Some(req.description),
                preview_url: req.preview_url,
                settings,
            })
            .await
            .map_err(|e| {
                warn!("Provider voice {provider_voice_id} was created but not saved: {e}");
                e
            })?;
        info!("Saved voice {} ({})", voice.id, voice.voice_id);
        Ok::<_, ApiError>((StatusCode::CREATED, Json(voice)))
    }
    .await;

    state.metrics.voices.track(start, result)
}

pub async fn list_voices(State(state): State<AppState>) -> Result<Json<Vec<Voice>>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();
    let result = state
        .store
        .list_for_user(&state.config.default_user_id)
        .await
        .map(Json)
        .map_err(ApiError::from);
    state.metrics.voices.track(start, result)
}

pub async fn update_voice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<VoiceUpdate>,
) -> Result<Json<Voice>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();

    let result = async {
        let id = parse_record_id(&id)?;
        if update.is_empty() {
            return Err(ApiError::InvalidInput("No fields to update".to_string()));
        }
        if let Some(name) = &update.name {
            validate_voice_name(name)?;
        }
        if let Some(settings) = &update.settings {
            validate_settings(settings)?;
        }
        let voice = state
            .store
            .update(&state.config.default_user_id, id, update)
            .await?;
        Ok::<_, ApiError>(Json(voice))
    }
    .await;

    state.metrics.voices.track(start, result)
}

pub async fn delete_voice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();

    let result = async {
        let id = parse_record_id(&id)?;
        state
            .store
            .delete(&state.config.default_user_id, id)
            .await?;
        Ok::<_, ApiError>(StatusCode::NO_CONTENT)
    }
    .await;

    state.metrics.voices.track(start, result)
}

pub async fn list_provider_voices(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProviderVoice>>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let start = Instant::now();

    let result = state.designer.list_voices().await.map(Json).map_err(|e| {
        warn!("Failed to list provider voices: {e}");
        ApiError::from(e)
    });

    state.metrics.provider_voices.track(start, result)
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    Json(DetailedMetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: system.global_cpu_info().cpu_usage(),
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.request_count.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            system_load: system_load(),
        },
        endpoints: state.metrics.endpoints(),
        relay: state.metrics.relay.snapshot(),
    })
}

// Unix-like systems only
fn system_load() -> Option<f64> {
    #[cfg(unix)]
    {
        std::fs::read_to_string("/proc/loadavg")
            .ok()
            .and_then(|loadavg| loadavg.split_whitespace().next()?.parse::<f64>().ok())
    }
    #[cfg(not(unix))]
    None
}

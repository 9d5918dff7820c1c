//! ElevenLabs REST client.
//!
//! Built once at startup and shared behind an `Arc`; the inner
//! `reqwest::Client` keeps its own connection pool.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Response, Url};
use tracing::{debug, warn};

use crate::design::{
    CreateVoiceRequest, CreatedVoice, ProviderVoice, VoiceDesignRequest, VoiceDesignResult,
    WireCreatedVoice, WirePreviewsResponse, WireVoiceList, DEFAULT_OUTPUT_FORMAT,
};
use crate::encode::content_type_for;
use crate::error::SpeechError;
use crate::provider::{ByteStream, SpeechProvider, VoiceDesignProvider};
use crate::settings::{ConvertRequest, DEFAULT_MODEL_ID};

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const API_KEY_HEADER: &str = "xi-api-key";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Error bodies are echoed into logs and API errors, keep them short.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_id: String,
    // Fixed to the format the HTTP layer advertises for relayed audio.
    output_format: String,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    config: ElevenLabsConfig,
    http: reqwest::Client,
}

impl ElevenLabsClient {
    pub fn new(config: ElevenLabsConfig) -> Result<Self, SpeechError> {
        if config.api_key.trim().is_empty() {
            return Err(SpeechError::InvalidArgument(
                "Missing ElevenLabs API key".to_string(),
            ));
        }
        Url::parse(&config.base_url).map_err(|e| {
            SpeechError::InvalidArgument(format!("Invalid ElevenLabs base URL {}: {e}", config.base_url))
        })?;
        // No overall timeout: it would cut long audio streams short.
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SpeechError::InvalidArgument(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    pub fn output_format(&self) -> &str {
        &self.config.output_format
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SpeechError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| SpeechError::InvalidArgument(format!("Invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SpeechError::InvalidArgument("Base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header(API_KEY_HEADER, &self.config.api_key)
    }
}

/// Turn a non-success response into an `UpstreamUnavailable` error.
async fn ensure_success(response: Response) -> Result<Response, SpeechError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    warn!("ElevenLabs returned {status}: {body}");
    Err(SpeechError::UpstreamUnavailable(format!(
        "provider returned {status}: {body}"
    )))
}

#[async_trait]
impl SpeechProvider for ElevenLabsClient {
    async fn convert(&self, voice_id: &str, request: &ConvertRequest) -> Result<ByteStream, SpeechError> {
        let mut url = self.endpoint(&["v1", "text-to-speech", voice_id])?;
        url.query_pairs_mut()
            .append_pair("output_format", &self.config.output_format);
        debug!("Opening ElevenLabs stream for voice {voice_id} ({} chars)", request.text.len());

        let response = self
            .post(url)
            .header(header::ACCEPT, content_type_for(&self.config.output_format))
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SpeechError::StreamInterrupted(e.to_string())));
        Ok(stream.boxed())
    }
}

#[async_trait]
impl VoiceDesignProvider for ElevenLabsClient {
    async fn create_previews(&self, request: &VoiceDesignRequest) -> Result<VoiceDesignResult, SpeechError> {
        request.validate()?;
        let mut url = self.endpoint(&["v1", "text-to-voice", "create-previews"])?;
        url.query_pairs_mut()
            .append_pair("output_format", &request.output_format);

        let body = serde_json::json!({
            "voice_description": request.voice_description,
            "text": request.text,
        });
        let response = ensure_success(self.post(url).json(&body).send().await?).await?;
        let wire: WirePreviewsResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(e.to_string()))?;
        let result = wire.into_result(&request.text)?;
        debug!("ElevenLabs generated {} voice previews", result.previews.len());
        Ok(result)
    }

    async fn create_voice(&self, request: &CreateVoiceRequest) -> Result<CreatedVoice, SpeechError> {
        request.validate()?;
        let url = self.endpoint(&["v1", "text-to-voice", "create-voice-from-preview"])?;
        let response = ensure_success(self.post(url).json(request).send().await?).await?;
        let wire: WireCreatedVoice = response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(e.to_string()))?;
        wire.into_created(&request.voice_name)
    }

    async fn list_voices(&self) -> Result<Vec<ProviderVoice>, SpeechError> {
        let url = self.endpoint(&["v1", "voices"])?;
        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;
        let wire: WireVoiceList = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(e.to_string()))?;
        Ok(wire.into_voices())
    }
}

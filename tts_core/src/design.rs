//! Voice design and catalogue types.
//!
//! The provider's JSON is parsed into private wire structs first and then
//! checked before it becomes one of the public types below, so nothing past
//! this module has to deal with missing or loosely typed fields.

use std::collections::HashMap;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::SpeechError;

pub const DEFAULT_OUTPUT_FORMAT: &str = "mp3_44100_128";
const SUPPORTED_OUTPUT_FORMATS: &[&str] = &[
    "mp3_22050_32",
    "mp3_44100_64",
    "mp3_44100_96",
    "mp3_44100_128",
    "mp3_44100_192",
];

pub const MIN_DESCRIPTION_LENGTH: usize = 20;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
pub const MIN_PREVIEW_TEXT_LENGTH: usize = 100;
pub const MAX_PREVIEW_TEXT_LENGTH: usize = 1000;

const UNNAMED_VOICE: &str = "Unnamed Voice";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceDesignRequest {
    pub voice_description: String,
    pub text: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_output_format() -> String {
    DEFAULT_OUTPUT_FORMAT.to_string()
}

impl VoiceDesignRequest {
    pub fn new(voice_description: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            voice_description: voice_description.into(),
            text: text.into(),
            output_format: default_output_format(),
        }
    }

    pub fn validate(&self) -> Result<(), SpeechError> {
        check_length(
            "Voice description",
            &self.voice_description,
            MIN_DESCRIPTION_LENGTH,
            MAX_DESCRIPTION_LENGTH,
        )?;
        check_length("Preview text", &self.text, MIN_PREVIEW_TEXT_LENGTH, MAX_PREVIEW_TEXT_LENGTH)?;
        if !SUPPORTED_OUTPUT_FORMATS.contains(&self.output_format.as_str()) {
            return Err(SpeechError::InvalidArgument(format!(
                "Unsupported output format: {}",
                self.output_format
            )));
        }
        Ok(())
    }
}

fn check_length(label: &str, value: &str, min: usize, max: usize) -> Result<(), SpeechError> {
    let len = value.trim().chars().count();
    if len < min {
        return Err(SpeechError::InvalidArgument(format!(
            "{label} too short (min {min} characters)"
        )));
    }
    if len > max {
        return Err(SpeechError::InvalidArgument(format!(
            "{label} too long (max {max} characters)"
        )));
    }
    Ok(())
}

/// A candidate voice generated from a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePreview {
    /// Pass this to [`CreateVoiceRequest`] to keep the voice.
    pub generated_voice_id: String,
    pub audio_base64: String,
    pub media_type: String,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceDesignResult {
    pub previews: Vec<VoicePreview>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateVoiceRequest {
    pub generated_voice_id: String,
    pub voice_name: String,
    pub voice_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

impl CreateVoiceRequest {
    pub fn validate(&self) -> Result<(), SpeechError> {
        if self.generated_voice_id.trim().is_empty() {
            return Err(SpeechError::InvalidArgument(
                "Generated voice id is required".to_string(),
            ));
        }
        if self.voice_name.trim().is_empty() {
            return Err(SpeechError::InvalidArgument("Voice name is required".to_string()));
        }
        check_length(
            "Voice description",
            &self.voice_description,
            MIN_DESCRIPTION_LENGTH,
            MAX_DESCRIPTION_LENGTH,
        )
    }
}

/// A permanent voice created at the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedVoice {
    pub voice_id: String,
    pub name: String,
}

/// A voice from the provider's catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderVoice {
    pub voice_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

// Wire shapes as returned by the provider.

#[derive(Debug, Deserialize)]
pub(crate) struct WirePreviewsResponse {
    #[serde(default)]
    previews: Vec<WirePreview>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePreview {
    #[serde(default)]
    generated_voice_id: Option<String>,
    #[serde(default, rename = "audio_base_64", alias = "audio_base64")]
    audio_base64: Option<String>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    duration_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCreatedVoice {
    #[serde(default)]
    voice_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireVoiceList {
    #[serde(default)]
    voices: Vec<WireVoice>,
}

#[derive(Debug, Deserialize)]
struct WireVoice {
    #[serde(default)]
    voice_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

fn required(field: &str, value: Option<String>) -> Result<String, SpeechError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SpeechError::InvalidResponse(format!("missing '{field}'"))),
    }
}

impl WirePreviewsResponse {
    pub(crate) fn into_result(self, requested_text: &str) -> Result<VoiceDesignResult, SpeechError> {
        if self.previews.is_empty() {
            return Err(SpeechError::InvalidResponse(
                "provider returned no previews".to_string(),
            ));
        }
        let previews = self
            .previews
            .into_iter()
            .map(WirePreview::into_preview)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(VoiceDesignResult {
            previews,
            text: self
                .text
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| requested_text.to_string()),
        })
    }
}

impl WirePreview {
    fn into_preview(self) -> Result<VoicePreview, SpeechError> {
        let generated_voice_id = required("generated_voice_id", self.generated_voice_id)?;
        let audio_base64 = required("audio_base_64", self.audio_base64)?;
        general_purpose::STANDARD
            .decode(audio_base64.as_bytes())
            .map_err(|e| {
                SpeechError::InvalidResponse(format!(
                    "preview {generated_voice_id} has undecodable audio: {e}"
                ))
            })?;
        let duration_secs = self.duration_secs.unwrap_or(0.0);
        if !duration_secs.is_finite() || duration_secs < 0.0 {
            return Err(SpeechError::InvalidResponse(format!(
                "preview {generated_voice_id} has invalid duration {duration_secs}"
            )));
        }
        Ok(VoicePreview {
            generated_voice_id,
            audio_base64,
            media_type: self
                .media_type
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "audio/mpeg".to_string()),
            duration_secs,
        })
    }
}

impl WireCreatedVoice {
    pub(crate) fn into_created(self, requested_name: &str) -> Result<CreatedVoice, SpeechError> {
        Ok(CreatedVoice {
            voice_id: required("voice_id", self.voice_id)?,
            name: self
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| requested_name.to_string()),
        })
    }
}

impl WireVoiceList {
    /// Entries without an id cannot be synthesized with, so they are dropped.
    pub(crate) fn into_voices(self) -> Vec<ProviderVoice> {
        self.voices
            .into_iter()
            .filter_map(|v| {
                let voice_id = v.voice_id.filter(|id| !id.is_empty())?;
                Some(ProviderVoice {
                    voice_id,
                    name: v
                        .name
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| UNNAMED_VOICE.to_string()),
                    description: v.description,
                    category: v.category,
                    labels: v.labels.unwrap_or_default(),
                })
            })
            .collect()
    }
}

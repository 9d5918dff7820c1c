use serde::{Deserialize, Serialize};

use crate::error::SpeechError;

/// Voice used when a request does not name one ("Bella").
pub const DEFAULT_VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL";
/// Provider model used for synthesis unless configured otherwise.
pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";

pub const DEFAULT_STABILITY: f32 = 0.5;
pub const DEFAULT_SIMILARITY_BOOST: f32 = 0.75;
pub const DEFAULT_STYLE: f32 = 0.0;
pub const DEFAULT_USE_SPEAKER_BOOST: bool = true;

/// Caller-facing voice settings. Every field is optional; absent fields fall
/// back to the provider defaults when resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_boost: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_speaker_boost: Option<bool>,
}

/// Fully populated settings in the shape the provider expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedVoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for ResolvedVoiceSettings {
    fn default() -> Self {
        Self {
            stability: DEFAULT_STABILITY,
            similarity_boost: DEFAULT_SIMILARITY_BOOST,
            style: DEFAULT_STYLE,
            use_speaker_boost: DEFAULT_USE_SPEAKER_BOOST,
        }
    }
}

impl VoiceSettings {
    /// Fill absent fields with defaults. Provided fields are kept as-is.
    pub fn resolve(&self) -> ResolvedVoiceSettings {
        ResolvedVoiceSettings {
            stability: self.stability.unwrap_or(DEFAULT_STABILITY),
            similarity_boost: self.similarity_boost.unwrap_or(DEFAULT_SIMILARITY_BOOST),
            style: self.style.unwrap_or(DEFAULT_STYLE),
            use_speaker_boost: self.use_speaker_boost.unwrap_or(DEFAULT_USE_SPEAKER_BOOST),
        }
    }

    /// All numeric settings must lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), SpeechError> {
        let fields = [
            ("stability", self.stability),
            ("similarity_boost", self.similarity_boost),
            ("style", self.style),
        ];
        for (name, value) in fields {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(SpeechError::InvalidArgument(format!(
                        "{name} must be between 0 and 1 (got {v})"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One synthesis call: text, the voice to speak it with, and its settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub settings: VoiceSettings,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            settings: VoiceSettings::default(),
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn with_settings(mut self, settings: VoiceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn validate(&self) -> Result<(), SpeechError> {
        if self.text.trim().is_empty() {
            return Err(SpeechError::InvalidArgument("Text is required".to_string()));
        }
        if self.voice_id.trim().is_empty() {
            return Err(SpeechError::InvalidArgument("Voice id cannot be empty".to_string()));
        }
        self.settings.validate()
    }
}

/// Body of the provider's text-to-speech call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertRequest {
    pub text: String,
    pub model_id: String,
    pub voice_settings: ResolvedVoiceSettings,
}

impl ConvertRequest {
    pub fn from_synthesis(request: &SynthesisRequest, model_id: &str) -> Self {
        Self {
            text: request.text.clone(),
            model_id: model_id.to_string(),
            voice_settings: request.settings.resolve(),
        }
    }
}

use tts_core::VoiceSettings;
use uuid::Uuid;

use crate::error::ApiError;

/// Maximum text length for speech requests
pub const MAX_TEXT_LENGTH: usize = 5000;
/// Maximum length of a saved voice name
pub const MAX_VOICE_NAME_LENGTH: usize = 100;
const MAX_VOICE_ID_LENGTH: usize = 64;

/// Validate the text of a speech request
pub fn validate_speech_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text is required".to_string()));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Validate a provider voice id (e.g. `EXAVITQu4vr4xnSDxMaL`)
pub fn validate_voice_id(voice_id: &str) -> Result<(), ApiError> {
    if voice_id.is_empty() || voice_id.len() > MAX_VOICE_ID_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Invalid voice id length (1-{} characters)",
            MAX_VOICE_ID_LENGTH
        )));
    }
    if !voice_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ApiError::InvalidInput(format!(
            "Invalid voice id format: {}",
            voice_id
        )));
    }
    Ok(())
}

pub fn validate_voice_name(name: &str) -> Result<(), ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidInput("Voice name is required".to_string()));
    }
    if name.chars().count() > MAX_VOICE_NAME_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Voice name too long (max {} characters)",
            MAX_VOICE_NAME_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_settings(settings: &VoiceSettings) -> Result<(), ApiError> {
    settings
        .validate()
        .map_err(|e| ApiError::InvalidInput(e.to_string()))
}

/// Parse the id of a saved voice record from a path segment
pub fn parse_record_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::InvalidInput(format!("Invalid voice record id: {}", id)))
}

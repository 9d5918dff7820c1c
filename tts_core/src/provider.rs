use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::design::{CreateVoiceRequest, CreatedVoice, ProviderVoice, VoiceDesignRequest, VoiceDesignResult};
use crate::error::SpeechError;
use crate::settings::ConvertRequest;

/// Audio bytes as the provider delivers them, in order.
pub type ByteStream = BoxStream<'static, Result<Bytes, SpeechError>>;

/// Text-to-speech capability used by the relay.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Open a byte stream of encoded audio for `request` spoken by `voice_id`.
    async fn convert(&self, voice_id: &str, request: &ConvertRequest) -> Result<ByteStream, SpeechError>;
}

/// Voice design and catalogue capability.
#[async_trait]
pub trait VoiceDesignProvider: Send + Sync {
    async fn create_previews(&self, request: &VoiceDesignRequest) -> Result<VoiceDesignResult, SpeechError>;

    async fn create_voice(&self, request: &CreateVoiceRequest) -> Result<CreatedVoice, SpeechError>;

    async fn list_voices(&self) -> Result<Vec<ProviderVoice>, SpeechError>;
}

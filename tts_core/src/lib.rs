//! Speech provider boundary for the voice studio backend.
//!
//! Holds the synthesis request model, the provider capabilities, the
//! ElevenLabs client and the streaming relay that forwards provider audio to
//! one HTTP consumer.

mod design;
mod elevenlabs;
mod encode;
mod error;
mod provider;
mod relay;
mod settings;

pub use design::{
    CreateVoiceRequest, CreatedVoice, ProviderVoice, VoiceDesignRequest, VoiceDesignResult,
    VoicePreview, DEFAULT_OUTPUT_FORMAT, MAX_DESCRIPTION_LENGTH, MAX_PREVIEW_TEXT_LENGTH,
    MIN_DESCRIPTION_LENGTH, MIN_PREVIEW_TEXT_LENGTH,
};
pub use elevenlabs::{ElevenLabsClient, ElevenLabsConfig, DEFAULT_BASE_URL};
pub use encode::{content_type_for, encode_audio_base64};
pub use error::SpeechError;
pub use provider::{ByteStream, SpeechProvider, VoiceDesignProvider};
pub use relay::{
    forward_chunks, ChannelSink, ChunkSink, NoopObserver, RelayConfig, RelayEnd, RelayObserver,
    RelayReport, RelayState, SinkClosed, StreamHandle, StreamRelay, DEFAULT_CHANNEL_CAPACITY,
};
pub use settings::{
    ConvertRequest, ResolvedVoiceSettings, SynthesisRequest, VoiceSettings, DEFAULT_MODEL_ID,
    DEFAULT_VOICE_ID,
};

pub use tokio_util::sync::CancellationToken;

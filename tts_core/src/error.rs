use thiserror::Error;

/// Failures raised by the speech provider boundary and the relay.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SpeechError {
    /// Missing or malformed input, caught before any network call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The provider call failed before any audio was streamed.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The stream broke after bytes had started flowing.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The provider answered with a payload we could not accept.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl SpeechError {
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, SpeechError::InvalidArgument(_))
    }
}

impl From<reqwest::Error> for SpeechError {
    fn from(e: reqwest::Error) -> Self {
        SpeechError::UpstreamUnavailable(e.to_string())
    }
}
